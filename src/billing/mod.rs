//! Recurring subscription billing.
//!
//! Each day the batch finds companies whose billing day has come, resolves
//! their item quantities from live CRM counts, registers a quote in AdmCloud
//! when the workspace uses it, renders a proforma PDF, uploads it and emails
//! it to the company's invoice contacts. Every run leaves one ledger row.
//!
//! # Example
//!
//! ```rust,ignore
//! use crm_billing::billing::{BillingService, SeaOrmBillingStore, SeaOrmCrmDirectory};
//!
//! let billing = BillingService::new(
//!     Arc::new(SeaOrmBillingStore::new(db.clone())),
//!     Arc::new(SeaOrmCrmDirectory::new(db)),
//!     Arc::new(AdmCloudFactory::new(AdmCloudClientConfig::from_env())?),
//!     mailer,
//!     blobs,
//! );
//!
//! let summary = billing.run_daily(Utc::now()).await?;
//! ```

pub mod accounting;
pub mod admcloud;
pub mod batch;
pub mod delivery;
pub mod directory;
pub mod document;
pub mod error;
pub mod format;
pub mod pdf;
pub mod pipeline;
pub mod quantity;
pub mod sea_orm_directory;
pub mod sea_orm_store;
pub mod settings;
pub mod storage;
pub mod template;
pub mod types;

pub use accounting::{
    AccountingClient, AccountingClientFactory, AccountingCustomer, AccountingOutcome,
    CreatedQuote, QuoteRequest,
};
pub use admcloud::{AdmCloudClient, AdmCloudClientConfig, AdmCloudFactory};
pub use batch::{BatchSummary, CompanyReport, ReportStatus};
pub use directory::CrmDirectory;
pub use document::{ProformaDocument, add_business_days, fallback_number};
pub use error::{BillingError, BillingResult};
pub use pipeline::{BillingPeriod, BillingService, ManualProforma, RunOutcome};
pub use quantity::{ResolvedLine, Totals, resolve_lines, resolve_quantity};
pub use sea_orm_directory::SeaOrmCrmDirectory;
pub use sea_orm_store::SeaOrmBillingStore;
pub use settings::{
    BillingPreview, BillingSettings, CreateItemRequest, HistoryQuery, UpdateItemRequest,
    UpdateProfileRequest,
};
pub use storage::BillingStore;
pub use types::{
    BillingHistory, BillingItem, BillingProfile, BillingTrigger, BillingType, Company, CountBase,
    CountType, EntityCounts, HistoryStatus, LedgerInsert, Recipient, Workspace,
};
