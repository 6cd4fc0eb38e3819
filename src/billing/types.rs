//! Billing domain records.
//!
//! Profiles and items are configured per company; history rows form the
//! append-only ledger. Company and workspace records come from the CRM and
//! are read-only here.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Company status that qualifies for scheduled billing.
pub const ACTIVE_CLIENT_STATUS: &str = "active_client";

/// Currency of every generated document.
pub const BILLING_CURRENCY: &str = "USD";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingType {
    #[default]
    Standard,
    Custom,
}

impl BillingType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Custom => "custom",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "standard" => Some(Self::Standard),
            "custom" => Some(Self::Custom),
            _ => None,
        }
    }
}

/// Per-company billing settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingProfile {
    pub company_id: String,
    pub billing_type: BillingType,
    /// Day of month, 1..=31
    pub billing_day: u8,
    pub auto_billing_enabled: bool,
}

impl BillingProfile {
    /// Defaults used when a profile is first touched.
    pub fn new(company_id: impl Into<String>) -> Self {
        Self {
            company_id: company_id.into(),
            billing_type: BillingType::Standard,
            billing_day: 1,
            auto_billing_enabled: false,
        }
    }
}

/// Partial profile update; absent fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub billing_type: Option<BillingType>,
    pub billing_day: Option<u8>,
    pub auto_billing_enabled: Option<bool>,
}

/// Entity count a calculated item is derived from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CountBase {
    Users,
    Projects,
}

impl CountBase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Projects => "projects",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "users" => Some(Self::Users),
            "projects" => Some(Self::Projects),
            _ => None,
        }
    }
}

/// How an item's billed quantity is derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CountType {
    /// Fixed quantity entered by an operator
    Manual { quantity: Decimal },
    ActiveProjects,
    ActiveUsers,
    /// `max(0, base - subtract)`
    Calculated { base: CountBase, subtract: u32 },
}

impl CountType {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Manual { .. } => "manual",
            Self::ActiveProjects => "active_projects",
            Self::ActiveUsers => "active_users",
            Self::Calculated { .. } => "calculated",
        }
    }
}

/// A billable line configured for a company.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingItem {
    pub id: Uuid,
    pub company_id: String,
    /// AdmCloud catalog item id
    pub external_item_id: Option<String>,
    pub code: String,
    pub description: String,
    pub unit_price: Decimal,
    pub count_type: CountType,
    pub position: i32,
}

/// Input for a new item; the store assigns id and position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBillingItem {
    pub external_item_id: Option<String>,
    pub code: String,
    pub description: String,
    pub unit_price: Decimal,
    pub count_type: CountType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemUpdate {
    pub external_item_id: Option<Option<String>>,
    pub code: Option<String>,
    pub description: Option<String>,
    pub unit_price: Option<Decimal>,
    pub count_type: Option<CountType>,
    pub position: Option<i32>,
}

impl ItemUpdate {
    pub fn apply(self, item: &mut BillingItem) {
        if let Some(external) = self.external_item_id {
            item.external_item_id = external;
        }
        if let Some(code) = self.code {
            item.code = code;
        }
        if let Some(description) = self.description {
            item.description = description;
        }
        if let Some(price) = self.unit_price {
            item.unit_price = price;
        }
        if let Some(count_type) = self.count_type {
            item.count_type = count_type;
        }
        if let Some(position) = self.position {
            item.position = position;
        }
    }
}

/// Live entity counts feeding the quantity resolver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityCounts {
    pub active_projects: u32,
    pub active_users: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryStatus {
    Pending,
    Sent,
    Failed,
    Cancelled,
}

impl HistoryStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "sent" => Some(Self::Sent),
            "failed" => Some(Self::Failed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// What started a generation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingTrigger {
    Scheduled,
    Manual,
}

impl BillingTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Manual => "manual",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "scheduled" => Some(Self::Scheduled),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

/// One ledger row per (company, run).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BillingHistory {
    pub id: Uuid,
    pub company_id: String,
    pub billing_month: u32,
    pub billing_year: i32,
    pub admcloud_doc_id: Option<String>,
    pub admcloud_doc_number: Option<String>,
    pub proforma_number: String,
    pub status: HistoryStatus,
    pub trigger: BillingTrigger,
    pub generated_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub pdf_url: Option<String>,
    pub subtotal: Decimal,
    pub tax_amount: Decimal,
    pub total: Decimal,
    pub currency: String,
    pub recipients: Vec<String>,
    pub cc: Vec<String>,
    pub error_message: Option<String>,
    /// Resolved lines at generation time, as JSON
    pub items_snapshot: serde_json::Value,
}

/// Outcome of a ledger insert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerInsert {
    Inserted,
    /// A `sent` row already exists for the same period
    Conflict,
}

/// CRM company, as far as billing needs it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Company {
    pub id: String,
    pub workspace_id: String,
    pub name: String,
    pub legal_name: Option<String>,
    /// RNC
    pub tax_id: Option<String>,
    pub fiscal_address: Option<String>,
    pub status: String,
    /// AdmCloud customer relationship id
    pub admcloud_relationship_id: Option<String>,
}

impl Company {
    pub fn display_legal_name(&self) -> &str {
        self.legal_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.name)
    }
}

/// Contact flagged `receives_invoices`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub name: String,
    pub email: String,
}

/// Workspace AdmCloud credentials. Immutable once loaded.
#[derive(Clone)]
pub struct AdmCloudCredentials {
    pub app_id: String,
    pub company: String,
    pub username: String,
    pub password: SecretString,
}

impl std::fmt::Debug for AdmCloudCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmCloudCredentials")
            .field("app_id", &self.app_id)
            .field("company", &self.company)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

/// Accounting integration settings of a workspace.
#[derive(Debug, Clone)]
pub struct AdmCloudSettings {
    pub enabled: bool,
    pub credentials: Option<AdmCloudCredentials>,
    pub default_payment_term_id: Option<String>,
    pub default_sales_stage_id: Option<String>,
}

impl AdmCloudSettings {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            credentials: None,
            default_payment_term_id: None,
            default_sales_stage_id: None,
        }
    }
}

/// One currency account held at a bank.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankAccount {
    pub currency: String,
    pub account_number: String,
    pub account_type: String,
}

/// A bank and the accounts the workspace holds there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bank {
    pub name: String,
    #[serde(default)]
    pub accounts: Vec<BankAccount>,
}

/// Bank transfer instructions of a workspace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankTransferInfo {
    pub beneficiary: String,
    pub tax_id: Option<String>,
    #[serde(default)]
    pub banks: Vec<Bank>,
}

impl BankTransferInfo {
    /// Table rows of the transfer panel: the bank name on the first row of
    /// each bank only. A bank without accounts still gets a row.
    pub fn rows(&self) -> Vec<(&str, Option<&BankAccount>)> {
        let mut rows = Vec::new();
        for bank in &self.banks {
            if bank.accounts.is_empty() {
                rows.push((bank.name.as_str(), None));
                continue;
            }
            for (i, account) in bank.accounts.iter().enumerate() {
                let name = if i == 0 { bank.name.as_str() } else { "" };
                rows.push((name, Some(account)));
            }
        }
        rows
    }
}

/// CRM workspace (tenant), as far as billing needs it.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub id: String,
    pub name: String,
    pub legal_name: Option<String>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub logo_url: Option<String>,
    pub tax_id: Option<String>,
    pub billing_enabled: bool,
    pub billing_sender_email: Option<String>,
    pub billing_email_subject: Option<String>,
    pub billing_email_body: Option<String>,
    pub billing_cc: Vec<String>,
    pub admcloud: AdmCloudSettings,
    pub bank_transfer: Option<BankTransferInfo>,
    pub proforma_notes: Option<String>,
}

impl Workspace {
    pub fn display_legal_name(&self) -> &str {
        self.legal_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.name)
    }

    /// Sender address, if billing email is configured.
    pub fn sender(&self) -> Option<&str> {
        self.billing_sender_email
            .as_deref()
            .map(str::trim)
            .filter(|email| !email.is_empty())
    }
}
