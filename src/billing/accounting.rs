//! External accounting bridge.
//!
//! A workspace is in one of four states: accounting disabled or enabled,
//! and the company linked to an AdmCloud customer or not. Only enabled and
//! linked companies cause network calls. Failures never abort billing; the
//! caller falls back to a locally generated document number.
//!
//! Credentials are an immutable value handed to an
//! [`AccountingClientFactory`] for every call; nothing is cached between
//! companies or workspaces.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::{BillingError, BillingResult};
use super::quantity::ResolvedLine;
use super::types::{AdmCloudCredentials, AdmCloudSettings, Company};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CustomerAddress {
    #[serde(rename = "ID")]
    pub id: String,
    pub address1: Option<String>,
    pub address2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub zip_code: Option<String>,
    pub is_default_billing: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct CustomerContact {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
    pub receive_quotes: bool,
}

/// AdmCloud customer record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct AccountingCustomer {
    #[serde(rename = "ID")]
    pub id: String,
    pub name: Option<String>,
    pub addresses: Vec<CustomerAddress>,
    pub contacts: Vec<CustomerContact>,
}

impl AccountingCustomer {
    /// Default billing address, else the first one.
    pub fn billing_address(&self) -> Option<&CustomerAddress> {
        self.addresses
            .iter()
            .find(|a| a.is_default_billing)
            .or_else(|| self.addresses.first())
    }

    /// Contact flagged to receive quotes, else the first one.
    pub fn quote_contact(&self) -> Option<&CustomerContact> {
        self.contacts
            .iter()
            .find(|c| c.receive_quotes)
            .or_else(|| self.contacts.first())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct QuoteLine {
    #[serde(rename = "ItemID")]
    pub item_id: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub row_order: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct QuoteRequest {
    #[serde(rename = "RelationshipID")]
    pub relationship_id: String,
    pub doc_date: NaiveDate,
    #[serde(rename = "CurrencyID")]
    pub currency: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(rename = "PaymentTermID", skip_serializing_if = "Option::is_none")]
    pub payment_term_id: Option<String>,
    #[serde(rename = "SalesStageID", skip_serializing_if = "Option::is_none")]
    pub sales_stage_id: Option<String>,
    #[serde(rename = "ContactID", skip_serializing_if = "Option::is_none")]
    pub contact_id: Option<String>,
    #[serde(rename = "BillToAddressID", skip_serializing_if = "Option::is_none")]
    pub bill_to_address_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bill_to_address1: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bill_to_address2: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bill_to_city: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bill_to_country: Option<String>,
    pub items: Vec<QuoteLine>,
}

/// Identifiers of a quote created in AdmCloud.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CreatedQuote {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "DocID")]
    pub doc_number: String,
}

/// Operations used against the accounting system.
#[async_trait]
pub trait AccountingClient: Send + Sync {
    async fn get_customer(&self, relationship_id: &str) -> BillingResult<AccountingCustomer>;

    async fn create_quote(&self, quote: &QuoteRequest) -> BillingResult<CreatedQuote>;
}

/// Builds a client bound to one workspace's credentials.
pub trait AccountingClientFactory: Send + Sync {
    fn connect(&self, credentials: &AdmCloudCredentials) -> BillingResult<Box<dyn AccountingClient>>;
}

/// Result of the accounting step for one company.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccountingOutcome {
    pub doc_id: Option<String>,
    pub doc_number: Option<String>,
    pub error: Option<String>,
}

impl AccountingOutcome {
    pub fn created(&self) -> bool {
        self.doc_id.is_some()
    }

    fn failed(err: BillingError) -> Self {
        Self {
            doc_id: None,
            doc_number: None,
            error: Some(err.to_string()),
        }
    }
}

/// Build the quote payload: customer defaults, workspace defaults, and one
/// row per line in input order.
pub fn build_quote(
    settings: &AdmCloudSettings,
    relationship_id: &str,
    customer: &AccountingCustomer,
    lines: &[ResolvedLine],
    notes: Option<&str>,
    today: NaiveDate,
    currency: &str,
) -> QuoteRequest {
    let address = customer.billing_address();
    let contact = customer.quote_contact();

    QuoteRequest {
        relationship_id: relationship_id.to_string(),
        doc_date: today,
        currency: currency.to_string(),
        notes: notes.map(str::to_string),
        payment_term_id: settings.default_payment_term_id.clone(),
        sales_stage_id: settings.default_sales_stage_id.clone(),
        contact_id: contact.map(|c| c.id.clone()),
        bill_to_address_id: address.map(|a| a.id.clone()),
        bill_to_address1: address.and_then(|a| a.address1.clone()),
        bill_to_address2: address.and_then(|a| a.address2.clone()),
        bill_to_city: address.and_then(|a| a.city.clone()),
        bill_to_country: address.and_then(|a| a.country.clone()),
        items: lines
            .iter()
            .enumerate()
            .map(|(idx, line)| QuoteLine {
                item_id: line
                    .external_item_id
                    .clone()
                    .unwrap_or_else(|| line.code.clone()),
                quantity: line.quantity,
                price: line.unit_price,
                row_order: idx as u32 + 1,
            })
            .collect(),
    }
}

/// Create the AdmCloud quote for a company, never failing the caller.
pub async fn create_quote_for(
    factory: &dyn AccountingClientFactory,
    settings: &AdmCloudSettings,
    company: &Company,
    lines: &[ResolvedLine],
    notes: Option<&str>,
    today: NaiveDate,
    currency: &str,
) -> AccountingOutcome {
    if !settings.enabled {
        return AccountingOutcome::default();
    }

    let Some(relationship_id) = company
        .admcloud_relationship_id
        .as_deref()
        .filter(|id| !id.trim().is_empty())
    else {
        return AccountingOutcome::failed(BillingError::AccountingNotLinked);
    };

    let Some(credentials) = settings.credentials.as_ref() else {
        return AccountingOutcome::failed(BillingError::AccountingCredentialsMissing);
    };

    let result = async {
        let client = factory.connect(credentials)?;
        let customer = client.get_customer(relationship_id).await?;
        let quote = build_quote(settings, relationship_id, &customer, lines, notes, today, currency);
        client.create_quote(&quote).await
    }
    .await;

    match result {
        Ok(created) => {
            tracing::info!(
                company_id = %company.id,
                admcloud_doc_id = %created.id,
                admcloud_doc_number = %created.doc_number,
                "AdmCloud quote created"
            );
            AccountingOutcome {
                doc_id: Some(created.id),
                doc_number: Some(created.doc_number),
                error: None,
            }
        }
        Err(err) => {
            tracing::warn!(
                company_id = %company.id,
                error = %err,
                "AdmCloud quote creation failed, using fallback number"
            );
            AccountingOutcome::failed(err)
        }
    }
}
