//! SeaORM-backed billing storage.
//!
//! Tables are created by [`Migrator`](crate::database::Migrator).
//!
//! ```rust,ignore
//! use crm_billing::billing::SeaOrmBillingStore;
//!
//! let store = SeaOrmBillingStore::new(db.clone());
//! let profile = store.get_or_create_profile("cmp_123").await?;
//! ```

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Unchanged, ColumnTrait, DatabaseConnection, EntityTrait,
    PaginatorTrait, QueryFilter, QueryOrder, QuerySelect, Set, SqlErr, sea_query::OnConflict,
};
use uuid::Uuid;

use super::storage::BillingStore;
use super::types::{
    BillingHistory, BillingItem, BillingProfile, BillingTrigger, BillingType, CountBase, CountType,
    HistoryStatus, ItemUpdate, LedgerInsert, NewBillingItem, ProfileUpdate,
};
use crate::error::{AppError, Result};

pub(crate) mod entity {
    pub mod billing_profile {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "billing_profiles")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub company_id: String,
            pub billing_type: String,
            pub billing_day: i32,
            pub auto_billing_enabled: bool,
            pub created_at: DateTimeWithTimeZone,
            pub updated_at: DateTimeWithTimeZone,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod billing_item {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "billing_items")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: Uuid,
            pub company_id: String,
            pub external_item_id: Option<String>,
            pub code: String,
            pub description: String,
            pub unit_price: Decimal,
            pub count_type: String,
            pub manual_quantity: Option<Decimal>,
            pub count_base: Option<String>,
            pub subtract_count: Option<i32>,
            pub position: i32,
            pub created_at: DateTimeWithTimeZone,
            pub updated_at: DateTimeWithTimeZone,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod billing_history {
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
        #[sea_orm(table_name = "billing_history")]
        pub struct Model {
            #[sea_orm(primary_key, auto_increment = false)]
            pub id: Uuid,
            pub company_id: String,
            pub billing_month: i32,
            pub billing_year: i32,
            pub admcloud_doc_id: Option<String>,
            pub admcloud_doc_number: Option<String>,
            pub proforma_number: String,
            pub status: String,
            pub trigger: String,
            pub generated_at: DateTimeWithTimeZone,
            pub sent_at: Option<DateTimeWithTimeZone>,
            pub pdf_url: Option<String>,
            pub subtotal: Decimal,
            pub tax_amount: Decimal,
            pub total: Decimal,
            pub currency: String,
            /// JSON array of addresses
            pub recipients: String,
            /// JSON array of addresses
            pub cc: String,
            pub error_message: Option<String>,
            /// JSON array of resolved lines
            pub items_snapshot: String,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }
}

use entity::{billing_history, billing_item, billing_profile};

fn db_err(e: sea_orm::DbErr) -> AppError {
    AppError::Database(e.to_string())
}

fn corrupt(table: &str, detail: impl std::fmt::Display) -> AppError {
    AppError::internal(format!("Corrupt {} row: {}", table, detail))
}

// =============================================================================
// Row mapping
// =============================================================================

fn model_to_profile(model: billing_profile::Model) -> Result<BillingProfile> {
    let billing_type = BillingType::parse(&model.billing_type)
        .ok_or_else(|| corrupt("billing_profiles", format!("billing_type '{}'", model.billing_type)))?;
    let billing_day = u8::try_from(model.billing_day)
        .map_err(|_| corrupt("billing_profiles", format!("billing_day {}", model.billing_day)))?;

    Ok(BillingProfile {
        company_id: model.company_id,
        billing_type,
        billing_day,
        auto_billing_enabled: model.auto_billing_enabled,
    })
}

/// Only the columns of the active count type are populated.
struct CountColumns {
    count_type: String,
    manual_quantity: Option<Decimal>,
    count_base: Option<String>,
    subtract_count: Option<i32>,
}

fn count_columns(count_type: &CountType) -> CountColumns {
    let (manual_quantity, count_base, subtract_count) = match count_type {
        CountType::Manual { quantity } => (Some(*quantity), None, None),
        CountType::ActiveProjects | CountType::ActiveUsers => (None, None, None),
        CountType::Calculated { base, subtract } => (
            None,
            Some(base.as_str().to_string()),
            Some(i32::try_from(*subtract).unwrap_or(i32::MAX)),
        ),
    };

    CountColumns {
        count_type: count_type.kind().to_string(),
        manual_quantity,
        count_base,
        subtract_count,
    }
}

fn model_to_count_type(model: &billing_item::Model) -> Result<CountType> {
    match model.count_type.as_str() {
        "manual" => Ok(CountType::Manual {
            quantity: model.manual_quantity.unwrap_or(Decimal::ZERO),
        }),
        "active_projects" => Ok(CountType::ActiveProjects),
        "active_users" => Ok(CountType::ActiveUsers),
        "calculated" => {
            let base = model
                .count_base
                .as_deref()
                .and_then(CountBase::parse)
                .ok_or_else(|| corrupt("billing_items", format!("count_base of item {}", model.id)))?;
            Ok(CountType::Calculated {
                base,
                subtract: model.subtract_count.unwrap_or(0).max(0) as u32,
            })
        }
        other => Err(corrupt("billing_items", format!("count_type '{}'", other))),
    }
}

fn model_to_item(model: billing_item::Model) -> Result<BillingItem> {
    let count_type = model_to_count_type(&model)?;

    Ok(BillingItem {
        id: model.id,
        company_id: model.company_id,
        external_item_id: model.external_item_id,
        code: model.code,
        description: model.description,
        unit_price: model.unit_price,
        count_type,
        position: model.position,
    })
}

fn history_to_active_model(row: &BillingHistory) -> Result<billing_history::ActiveModel> {
    Ok(billing_history::ActiveModel {
        id: Set(row.id),
        company_id: Set(row.company_id.clone()),
        billing_month: Set(row.billing_month as i32),
        billing_year: Set(row.billing_year),
        admcloud_doc_id: Set(row.admcloud_doc_id.clone()),
        admcloud_doc_number: Set(row.admcloud_doc_number.clone()),
        proforma_number: Set(row.proforma_number.clone()),
        status: Set(row.status.as_str().to_string()),
        trigger: Set(row.trigger.as_str().to_string()),
        generated_at: Set(row.generated_at.fixed_offset()),
        sent_at: Set(row.sent_at.map(|at| at.fixed_offset())),
        pdf_url: Set(row.pdf_url.clone()),
        subtotal: Set(row.subtotal),
        tax_amount: Set(row.tax_amount),
        total: Set(row.total),
        currency: Set(row.currency.clone()),
        recipients: Set(serde_json::to_string(&row.recipients)?),
        cc: Set(serde_json::to_string(&row.cc)?),
        error_message: Set(row.error_message.clone()),
        items_snapshot: Set(serde_json::to_string(&row.items_snapshot)?),
    })
}

fn model_to_history(model: billing_history::Model) -> Result<BillingHistory> {
    let status = HistoryStatus::parse(&model.status)
        .ok_or_else(|| corrupt("billing_history", format!("status '{}'", model.status)))?;
    let trigger = BillingTrigger::parse(&model.trigger)
        .ok_or_else(|| corrupt("billing_history", format!("trigger '{}'", model.trigger)))?;

    Ok(BillingHistory {
        id: model.id,
        company_id: model.company_id,
        billing_month: model.billing_month.max(0) as u32,
        billing_year: model.billing_year,
        admcloud_doc_id: model.admcloud_doc_id,
        admcloud_doc_number: model.admcloud_doc_number,
        proforma_number: model.proforma_number,
        status,
        trigger,
        generated_at: model.generated_at.with_timezone(&Utc),
        sent_at: model.sent_at.map(|at| at.with_timezone(&Utc)),
        pdf_url: model.pdf_url,
        subtotal: model.subtotal,
        tax_amount: model.tax_amount,
        total: model.total,
        currency: model.currency,
        recipients: serde_json::from_str(&model.recipients)?,
        cc: serde_json::from_str(&model.cc)?,
        error_message: model.error_message,
        items_snapshot: serde_json::from_str(&model.items_snapshot)?,
    })
}

// =============================================================================
// Store
// =============================================================================

/// SeaORM implementation of [`BillingStore`].
#[derive(Clone, Debug)]
pub struct SeaOrmBillingStore {
    db: DatabaseConnection,
}

impl SeaOrmBillingStore {
    #[must_use]
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    #[must_use]
    pub fn connection(&self) -> &DatabaseConnection {
        &self.db
    }

    async fn find_item(&self, company_id: &str, item_id: Uuid) -> Result<Option<billing_item::Model>> {
        billing_item::Entity::find_by_id(item_id)
            .filter(billing_item::Column::CompanyId.eq(company_id))
            .one(&self.db)
            .await
            .map_err(db_err)
    }
}

#[async_trait]
impl BillingStore for SeaOrmBillingStore {
    async fn get_or_create_profile(&self, company_id: &str) -> Result<BillingProfile> {
        if let Some(model) = billing_profile::Entity::find_by_id(company_id.to_string())
            .one(&self.db)
            .await
            .map_err(db_err)?
        {
            return model_to_profile(model);
        }

        let defaults = BillingProfile::new(company_id);
        let now = Utc::now().fixed_offset();
        let model = billing_profile::ActiveModel {
            company_id: Set(defaults.company_id.clone()),
            billing_type: Set(defaults.billing_type.as_str().to_string()),
            billing_day: Set(i32::from(defaults.billing_day)),
            auto_billing_enabled: Set(defaults.auto_billing_enabled),
            created_at: Set(now),
            updated_at: Set(now),
        };

        // A concurrent request may create the same profile
        billing_profile::Entity::insert(model)
            .on_conflict(
                OnConflict::column(billing_profile::Column::CompanyId)
                    .do_nothing()
                    .to_owned(),
            )
            .exec_without_returning(&self.db)
            .await
            .map_err(db_err)?;

        tracing::debug!(company_id = %company_id, "Created default billing profile");

        let model = billing_profile::Entity::find_by_id(company_id.to_string())
            .one(&self.db)
            .await
            .map_err(db_err)?
            .ok_or_else(|| AppError::internal("billing profile vanished after insert"))?;
        model_to_profile(model)
    }

    async fn update_profile(&self, company_id: &str, update: &ProfileUpdate) -> Result<BillingProfile> {
        let mut profile = self.get_or_create_profile(company_id).await?;
        if let Some(billing_type) = update.billing_type {
            profile.billing_type = billing_type;
        }
        if let Some(day) = update.billing_day {
            profile.billing_day = day;
        }
        if let Some(enabled) = update.auto_billing_enabled {
            profile.auto_billing_enabled = enabled;
        }

        let model = billing_profile::ActiveModel {
            company_id: Unchanged(company_id.to_string()),
            billing_type: Set(profile.billing_type.as_str().to_string()),
            billing_day: Set(i32::from(profile.billing_day)),
            auto_billing_enabled: Set(profile.auto_billing_enabled),
            updated_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        };
        model.update(&self.db).await.map_err(db_err)?;

        Ok(profile)
    }

    async fn list_items(&self, company_id: &str) -> Result<Vec<BillingItem>> {
        billing_item::Entity::find()
            .filter(billing_item::Column::CompanyId.eq(company_id))
            .order_by_asc(billing_item::Column::Position)
            .order_by_asc(billing_item::Column::CreatedAt)
            .all(&self.db)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(model_to_item)
            .collect()
    }

    async fn add_item(&self, company_id: &str, item: &NewBillingItem) -> Result<BillingItem> {
        self.get_or_create_profile(company_id).await?;

        let last_position: Option<i32> = billing_item::Entity::find()
            .select_only()
            .column(billing_item::Column::Position)
            .filter(billing_item::Column::CompanyId.eq(company_id))
            .order_by_desc(billing_item::Column::Position)
            .into_tuple()
            .one(&self.db)
            .await
            .map_err(db_err)?;

        let columns = count_columns(&item.count_type);
        let now = Utc::now().fixed_offset();
        let model = billing_item::ActiveModel {
            id: Set(Uuid::new_v4()),
            company_id: Set(company_id.to_string()),
            external_item_id: Set(item.external_item_id.clone()),
            code: Set(item.code.clone()),
            description: Set(item.description.clone()),
            unit_price: Set(item.unit_price),
            count_type: Set(columns.count_type),
            manual_quantity: Set(columns.manual_quantity),
            count_base: Set(columns.count_base),
            subtract_count: Set(columns.subtract_count),
            position: Set(last_position.map_or(0, |p| p + 1)),
            created_at: Set(now),
            updated_at: Set(now),
        };

        let model = model.insert(&self.db).await.map_err(db_err)?;
        model_to_item(model)
    }

    async fn update_item(
        &self,
        company_id: &str,
        item_id: Uuid,
        update: ItemUpdate,
    ) -> Result<Option<BillingItem>> {
        let Some(model) = self.find_item(company_id, item_id).await? else {
            return Ok(None);
        };

        let mut item = model_to_item(model)?;
        update.apply(&mut item);

        let columns = count_columns(&item.count_type);
        let active = billing_item::ActiveModel {
            id: Unchanged(item.id),
            external_item_id: Set(item.external_item_id.clone()),
            code: Set(item.code.clone()),
            description: Set(item.description.clone()),
            unit_price: Set(item.unit_price),
            count_type: Set(columns.count_type),
            manual_quantity: Set(columns.manual_quantity),
            count_base: Set(columns.count_base),
            subtract_count: Set(columns.subtract_count),
            position: Set(item.position),
            updated_at: Set(Utc::now().fixed_offset()),
            ..Default::default()
        };
        active.update(&self.db).await.map_err(db_err)?;

        Ok(Some(item))
    }

    async fn remove_item(&self, company_id: &str, item_id: Uuid) -> Result<bool> {
        let result = billing_item::Entity::delete_many()
            .filter(billing_item::Column::Id.eq(item_id))
            .filter(billing_item::Column::CompanyId.eq(company_id))
            .exec(&self.db)
            .await
            .map_err(db_err)?;

        Ok(result.rows_affected > 0)
    }

    async fn insert_history(&self, row: &BillingHistory) -> Result<LedgerInsert> {
        let model = history_to_active_model(row)?;

        match billing_history::Entity::insert(model)
            .exec_without_returning(&self.db)
            .await
        {
            Ok(_) => Ok(LedgerInsert::Inserted),
            Err(e) if matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_))) => {
                tracing::warn!(
                    company_id = %row.company_id,
                    month = row.billing_month,
                    year = row.billing_year,
                    "Sent ledger row already exists for period"
                );
                Ok(LedgerInsert::Conflict)
            }
            Err(e) => Err(db_err(e)),
        }
    }

    async fn has_sent_history(&self, company_id: &str, month: u32, year: i32) -> Result<bool> {
        let count = billing_history::Entity::find()
            .filter(billing_history::Column::CompanyId.eq(company_id))
            .filter(billing_history::Column::BillingMonth.eq(month as i32))
            .filter(billing_history::Column::BillingYear.eq(year))
            .filter(billing_history::Column::Status.eq(HistoryStatus::Sent.as_str()))
            .count(&self.db)
            .await
            .map_err(db_err)?;

        Ok(count > 0)
    }

    async fn list_history(&self, company_id: &str, limit: u64) -> Result<Vec<BillingHistory>> {
        billing_history::Entity::find()
            .filter(billing_history::Column::CompanyId.eq(company_id))
            .order_by_desc(billing_history::Column::GeneratedAt)
            .limit(limit)
            .all(&self.db)
            .await
            .map_err(db_err)?
            .into_iter()
            .map(model_to_history)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn item_model(count_type: &str) -> billing_item::Model {
        let now = Utc::now().fixed_offset();
        billing_item::Model {
            id: Uuid::new_v4(),
            company_id: "c1".into(),
            external_item_id: None,
            code: "X".into(),
            description: "X".into(),
            unit_price: dec!(10),
            count_type: count_type.into(),
            manual_quantity: None,
            count_base: None,
            subtract_count: None,
            position: 0,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_count_columns_only_populate_relevant_fields() {
        let manual = count_columns(&CountType::Manual { quantity: dec!(3) });
        assert_eq!(manual.count_type, "manual");
        assert_eq!(manual.manual_quantity, Some(dec!(3)));
        assert!(manual.count_base.is_none() && manual.subtract_count.is_none());

        let calculated = count_columns(&CountType::Calculated {
            base: CountBase::Projects,
            subtract: 2,
        });
        assert!(calculated.manual_quantity.is_none());
        assert_eq!(calculated.count_base.as_deref(), Some("projects"));
        assert_eq!(calculated.subtract_count, Some(2));

        let users = count_columns(&CountType::ActiveUsers);
        assert!(users.manual_quantity.is_none() && users.count_base.is_none());
    }

    #[test]
    fn test_manual_without_quantity_reads_as_zero() {
        let item = model_to_item(item_model("manual")).unwrap();
        assert_eq!(item.count_type, CountType::Manual { quantity: Decimal::ZERO });
    }

    #[test]
    fn test_unknown_count_type_is_rejected() {
        assert!(model_to_item(item_model("per_seat")).is_err());
        // calculated needs a base
        assert!(model_to_item(item_model("calculated")).is_err());
    }
}
