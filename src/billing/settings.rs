//! Billing settings of a company: profile, items, history and preview.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use std::borrow::Cow;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use super::error::{BillingError, BillingResult};
use super::pipeline::BillingService;
use super::quantity::{ResolvedLine, Totals, resolve_lines};
use super::types::{
    BillingHistory, BillingItem, BillingProfile, BillingType, CountBase, CountType, EntityCounts,
    ItemUpdate, NewBillingItem, ProfileUpdate,
};
use crate::validation::{
    validate_billing_type, validate_count_base, validate_count_type, validate_non_negative,
};

/// Default and maximum page size of the history listing.
pub const DEFAULT_HISTORY_LIMIT: u64 = 24;
pub const MAX_HISTORY_LIMIT: u64 = 200;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingSettings {
    pub profile: BillingProfile,
    pub items: Vec<BillingItem>,
}

/// Resolved items and totals for the current counts. Nothing is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingPreview {
    pub counts: EntityCounts,
    pub lines: Vec<ResolvedLine>,
    pub totals: Totals,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[validate(custom(function = "validate_billing_type"))]
    pub billing_type: Option<String>,
    #[validate(range(min = 1, max = 31, message = "must be between 1 and 31"))]
    pub billing_day: Option<i64>,
    pub auto_billing_enabled: Option<bool>,
}

impl UpdateProfileRequest {
    pub fn into_update(self) -> ProfileUpdate {
        ProfileUpdate {
            billing_type: self.billing_type.as_deref().and_then(BillingType::parse),
            billing_day: self.billing_day.and_then(|day| u8::try_from(day).ok()),
            auto_billing_enabled: self.auto_billing_enabled,
        }
    }
}

/// Count fields shared by create and update requests.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CountFields {
    #[validate(custom(function = "validate_count_type"))]
    pub count_type: Option<String>,
    #[validate(custom(function = "validate_non_negative"))]
    pub manual_quantity: Option<Decimal>,
    #[validate(custom(function = "validate_count_base"))]
    pub count_base: Option<String>,
    #[validate(range(min = 0, max = 1_000_000, message = "must be between 0 and 1000000"))]
    pub subtract_count: Option<i64>,
}

fn field_error(field: &'static str, code: &'static str, message: &'static str) -> ValidationErrors {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Borrowed(message));
    let mut errors = ValidationErrors::new();
    errors.add(field, error);
    errors
}

impl CountFields {
    /// Build the count type. Only the fields relevant to it are read.
    fn to_count_type(&self) -> Result<Option<CountType>, ValidationErrors> {
        let Some(kind) = self.count_type.as_deref() else {
            return Ok(None);
        };

        let count_type = match kind {
            "manual" => CountType::Manual {
                quantity: self.manual_quantity.unwrap_or(Decimal::ZERO),
            },
            "active_projects" => CountType::ActiveProjects,
            "active_users" => CountType::ActiveUsers,
            "calculated" => {
                let base = self
                    .count_base
                    .as_deref()
                    .and_then(CountBase::parse)
                    .ok_or_else(|| {
                        field_error("count_base", "required", "is required for calculated items")
                    })?;
                CountType::Calculated {
                    base,
                    subtract: self.subtract_count.unwrap_or(0).clamp(0, i64::from(u32::MAX)) as u32,
                }
            }
            _ => {
                return Err(field_error(
                    "count_type",
                    "count_type",
                    "must be one of manual, active_projects, active_users, calculated",
                ));
            }
        };

        Ok(Some(count_type))
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateItemRequest {
    #[validate(length(max = 64, message = "must be at most 64 characters"))]
    pub external_item_id: Option<String>,
    #[validate(length(min = 1, max = 64, message = "must be 1 to 64 characters"))]
    pub code: String,
    #[validate(length(min = 1, max = 255, message = "must be 1 to 255 characters"))]
    pub description: String,
    #[validate(custom(function = "validate_non_negative"))]
    pub unit_price: Decimal,
    #[serde(flatten)]
    #[validate(nested)]
    pub count: CountFields,
}

impl CreateItemRequest {
    pub fn into_new_item(self) -> Result<NewBillingItem, ValidationErrors> {
        let count_type = self
            .count
            .to_count_type()?
            .ok_or_else(|| field_error("count_type", "required", "is required"))?;

        Ok(NewBillingItem {
            external_item_id: self
                .external_item_id
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty()),
            code: self.code.trim().to_string(),
            description: self.description.trim().to_string(),
            unit_price: self.unit_price,
            count_type,
        })
    }
}

/// Distinguishes an absent field from an explicit `null`.
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateItemRequest {
    /// `null` unlinks the AdmCloud item
    #[serde(default, deserialize_with = "present")]
    pub external_item_id: Option<Option<String>>,
    #[validate(length(min = 1, max = 64, message = "must be 1 to 64 characters"))]
    pub code: Option<String>,
    #[validate(length(min = 1, max = 255, message = "must be 1 to 255 characters"))]
    pub description: Option<String>,
    #[validate(custom(function = "validate_non_negative"))]
    pub unit_price: Option<Decimal>,
    #[validate(range(min = 0, message = "must not be negative"))]
    pub position: Option<i32>,
    #[serde(flatten)]
    #[validate(nested)]
    pub count: CountFields,
}

impl UpdateItemRequest {
    pub fn into_update(self) -> Result<ItemUpdate, ValidationErrors> {
        let count_type = self.count.to_count_type()?;

        Ok(ItemUpdate {
            external_item_id: self.external_item_id.map(|id| {
                id.map(|id| id.trim().to_string())
                    .filter(|id| !id.is_empty())
            }),
            code: self.code.map(|c| c.trim().to_string()),
            description: self.description.map(|d| d.trim().to_string()),
            unit_price: self.unit_price,
            count_type,
            position: self.position,
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct HistoryQuery {
    #[validate(range(min = 1, max = 200, message = "must be between 1 and 200"))]
    pub limit: Option<u64>,
}

impl BillingService {
    /// Profile (created on first access) and items of a company.
    pub async fn billing_settings(&self, company_id: &str) -> BillingResult<BillingSettings> {
        self.company(company_id).await?;
        let profile = self.store().get_or_create_profile(company_id).await?;
        let items = self.store().list_items(company_id).await?;
        Ok(BillingSettings { profile, items })
    }

    pub async fn update_billing_profile(
        &self,
        company_id: &str,
        update: ProfileUpdate,
    ) -> BillingResult<BillingProfile> {
        self.company(company_id).await?;
        let profile = self.store().update_profile(company_id, &update).await?;
        tracing::info!(
            company_id = %company_id,
            billing_day = profile.billing_day,
            billing_type = profile.billing_type.as_str(),
            "Billing profile updated"
        );
        Ok(profile)
    }

    pub async fn add_billing_item(
        &self,
        company_id: &str,
        item: NewBillingItem,
    ) -> BillingResult<BillingItem> {
        self.company(company_id).await?;
        let item = self.store().add_item(company_id, &item).await?;
        tracing::info!(company_id = %company_id, item_id = %item.id, code = %item.code, "Billing item added");
        Ok(item)
    }

    pub async fn update_billing_item(
        &self,
        company_id: &str,
        item_id: Uuid,
        update: ItemUpdate,
    ) -> BillingResult<BillingItem> {
        self.company(company_id).await?;
        self.store()
            .update_item(company_id, item_id, update)
            .await?
            .ok_or_else(|| BillingError::ItemNotFound {
                item_id: item_id.to_string(),
            })
    }

    pub async fn remove_billing_item(&self, company_id: &str, item_id: Uuid) -> BillingResult<()> {
        self.company(company_id).await?;
        if !self.store().remove_item(company_id, item_id).await? {
            return Err(BillingError::ItemNotFound {
                item_id: item_id.to_string(),
            });
        }
        tracing::info!(company_id = %company_id, item_id = %item_id, "Billing item removed");
        Ok(())
    }

    pub async fn billing_history(
        &self,
        company_id: &str,
        limit: Option<u64>,
    ) -> BillingResult<Vec<BillingHistory>> {
        self.company(company_id).await?;
        let limit = limit.unwrap_or(DEFAULT_HISTORY_LIMIT).clamp(1, MAX_HISTORY_LIMIT);
        Ok(self.store().list_history(company_id, limit).await?)
    }

    pub async fn billing_preview(&self, company_id: &str) -> BillingResult<BillingPreview> {
        self.company(company_id).await?;
        let items = self.store().list_items(company_id).await?;
        let counts = self.directory().entity_counts(company_id).await?;
        let lines = resolve_lines(&items, &counts);
        let totals = Totals::from_lines(&lines);
        Ok(BillingPreview {
            counts,
            lines,
            totals,
        })
    }
}
