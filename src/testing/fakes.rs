//! In-memory collaborators for the billing pipeline.
//!
//! Each fake wraps its state in an `Arc`, so a clone handed to the service
//! and the clone kept by the test observe the same data.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::billing::accounting::{
    AccountingClient, AccountingClientFactory, AccountingCustomer, CreatedQuote, QuoteRequest,
};
use crate::billing::error::{BillingError, BillingResult};
use crate::billing::types::{
    ACTIVE_CLIENT_STATUS, AdmCloudCredentials, BillingHistory, BillingItem, BillingProfile,
    Company, EntityCounts, HistoryStatus, ItemUpdate, LedgerInsert, NewBillingItem, ProfileUpdate,
    Recipient, Workspace,
};
use crate::billing::{BillingStore, CrmDirectory};
use crate::error::{AppError, Result};
use crate::traits::blob::BlobStore;
use crate::traits::mailer::{Email, Mailer};

// ============================================================================
// Billing store
// ============================================================================

/// In-memory [`BillingStore`] with the same sent-row uniqueness as the
/// database.
#[derive(Default, Clone)]
pub struct InMemoryBillingStore {
    inner: Arc<StoreInner>,
}

#[derive(Default)]
struct StoreInner {
    profiles: RwLock<HashMap<String, BillingProfile>>,
    items: RwLock<Vec<BillingItem>>,
    history: RwLock<Vec<BillingHistory>>,
    history_checks_down: AtomicBool,
    failing_sent_inserts: AtomicUsize,
}

impl InMemoryBillingStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a company's billing day, creating its profile.
    pub fn set_billing_day(&self, company_id: &str, day: u8) {
        let mut profiles = self.inner.profiles.write().unwrap();
        profiles
            .entry(company_id.to_string())
            .or_insert_with(|| BillingProfile::new(company_id))
            .billing_day = day;
    }

    fn billing_day(&self, company_id: &str) -> Option<u8> {
        self.inner
            .profiles
            .read()
            .unwrap()
            .get(company_id)
            .map(|p| p.billing_day)
    }

    /// Every ledger row, in insertion order.
    pub fn history_rows(&self) -> Vec<BillingHistory> {
        self.inner.history.read().unwrap().clone()
    }

    /// Ledger rows of one company, in insertion order.
    pub fn history_for(&self, company_id: &str) -> Vec<BillingHistory> {
        self.history_rows()
            .into_iter()
            .filter(|row| row.company_id == company_id)
            .collect()
    }

    /// Make `has_sent_history` fail until further notice.
    pub fn break_history_checks(&self) {
        self.inner.history_checks_down.store(true, Ordering::SeqCst);
    }

    /// Make the next `times` inserts of `sent` rows fail with a database error.
    pub fn fail_sent_inserts(&self, times: usize) {
        self.inner.failing_sent_inserts.store(times, Ordering::SeqCst);
    }

    /// Insert a row without the uniqueness check, to stage a concurrent run.
    pub fn force_history(&self, row: BillingHistory) {
        self.inner.history.write().unwrap().push(row);
    }
}

#[async_trait]
impl BillingStore for InMemoryBillingStore {
    async fn get_or_create_profile(&self, company_id: &str) -> Result<BillingProfile> {
        let mut profiles = self.inner.profiles.write().unwrap();
        Ok(profiles
            .entry(company_id.to_string())
            .or_insert_with(|| BillingProfile::new(company_id))
            .clone())
    }

    async fn update_profile(&self, company_id: &str, update: &ProfileUpdate) -> Result<BillingProfile> {
        let mut profiles = self.inner.profiles.write().unwrap();
        let profile = profiles
            .entry(company_id.to_string())
            .or_insert_with(|| BillingProfile::new(company_id));
        if let Some(billing_type) = update.billing_type {
            profile.billing_type = billing_type;
        }
        if let Some(day) = update.billing_day {
            profile.billing_day = day;
        }
        if let Some(enabled) = update.auto_billing_enabled {
            profile.auto_billing_enabled = enabled;
        }
        Ok(profile.clone())
    }

    async fn list_items(&self, company_id: &str) -> Result<Vec<BillingItem>> {
        let mut items: Vec<BillingItem> = self
            .inner
            .items
            .read()
            .unwrap()
            .iter()
            .filter(|item| item.company_id == company_id)
            .cloned()
            .collect();
        // Stable sort keeps insertion order for equal positions
        items.sort_by_key(|item| item.position);
        Ok(items)
    }

    async fn add_item(&self, company_id: &str, item: &NewBillingItem) -> Result<BillingItem> {
        self.get_or_create_profile(company_id).await?;

        let mut items = self.inner.items.write().unwrap();
        let position = items
            .iter()
            .filter(|existing| existing.company_id == company_id)
            .map(|existing| existing.position)
            .max()
            .map_or(0, |p| p + 1);

        let stored = BillingItem {
            id: Uuid::new_v4(),
            company_id: company_id.to_string(),
            external_item_id: item.external_item_id.clone(),
            code: item.code.clone(),
            description: item.description.clone(),
            unit_price: item.unit_price,
            count_type: item.count_type,
            position,
        };
        items.push(stored.clone());
        Ok(stored)
    }

    async fn update_item(
        &self,
        company_id: &str,
        item_id: Uuid,
        update: ItemUpdate,
    ) -> Result<Option<BillingItem>> {
        let mut items = self.inner.items.write().unwrap();
        let Some(item) = items
            .iter_mut()
            .find(|item| item.id == item_id && item.company_id == company_id)
        else {
            return Ok(None);
        };
        update.apply(item);
        Ok(Some(item.clone()))
    }

    async fn remove_item(&self, company_id: &str, item_id: Uuid) -> Result<bool> {
        let mut items = self.inner.items.write().unwrap();
        let before = items.len();
        items.retain(|item| !(item.id == item_id && item.company_id == company_id));
        Ok(items.len() < before)
    }

    async fn insert_history(&self, row: &BillingHistory) -> Result<LedgerInsert> {
        if row.status == HistoryStatus::Sent
            && self
                .inner
                .failing_sent_inserts
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
        {
            return Err(AppError::Database("billing_history insert timed out".to_string()));
        }

        let mut history = self.inner.history.write().unwrap();
        if row.status == HistoryStatus::Sent
            && history.iter().any(|existing| {
                existing.status == HistoryStatus::Sent
                    && existing.company_id == row.company_id
                    && existing.billing_month == row.billing_month
                    && existing.billing_year == row.billing_year
            })
        {
            return Ok(LedgerInsert::Conflict);
        }
        history.push(row.clone());
        Ok(LedgerInsert::Inserted)
    }

    async fn has_sent_history(&self, company_id: &str, month: u32, year: i32) -> Result<bool> {
        if self.inner.history_checks_down.load(Ordering::SeqCst) {
            return Err(AppError::Database("billing_history unavailable".to_string()));
        }
        Ok(self.inner.history.read().unwrap().iter().any(|row| {
            row.status == HistoryStatus::Sent
                && row.company_id == company_id
                && row.billing_month == month
                && row.billing_year == year
        }))
    }

    async fn list_history(&self, company_id: &str, limit: u64) -> Result<Vec<BillingHistory>> {
        let mut rows = self.history_for(company_id);
        rows.sort_by(|a, b| b.generated_at.cmp(&a.generated_at));
        rows.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(rows)
    }
}

// ============================================================================
// CRM directory
// ============================================================================

/// In-memory [`CrmDirectory`]. Billing days are read from the paired
/// store, as the SQL directory reads them from `billing_profiles`.
#[derive(Clone)]
pub struct InMemoryCrmDirectory {
    store: InMemoryBillingStore,
    inner: Arc<DirectoryInner>,
}

#[derive(Default)]
struct DirectoryInner {
    workspaces: RwLock<Vec<Workspace>>,
    companies: RwLock<Vec<Company>>,
    recipients: RwLock<HashMap<String, Vec<Recipient>>>,
    counts: RwLock<HashMap<String, EntityCounts>>,
    broken_workspaces: RwLock<HashSet<String>>,
    broken_companies: RwLock<HashSet<String>>,
}

impl InMemoryCrmDirectory {
    #[must_use]
    pub fn new(store: &InMemoryBillingStore) -> Self {
        Self {
            store: store.clone(),
            inner: Arc::default(),
        }
    }

    pub fn add_workspace(&self, workspace: Workspace) {
        self.inner.workspaces.write().unwrap().push(workspace);
    }

    pub fn add_company(&self, company: Company) {
        self.inner.companies.write().unwrap().push(company);
    }

    pub fn add_recipient(&self, company_id: &str, name: &str, email: &str) {
        self.inner
            .recipients
            .write()
            .unwrap()
            .entry(company_id.to_string())
            .or_default()
            .push(Recipient {
                name: name.to_string(),
                email: email.to_string(),
            });
    }

    pub fn set_counts(&self, company_id: &str, active_projects: u32, active_users: u32) {
        self.inner.counts.write().unwrap().insert(
            company_id.to_string(),
            EntityCounts {
                active_projects,
                active_users,
            },
        );
    }

    /// Make `due_companies` fail for one workspace.
    pub fn break_workspace(&self, workspace_id: &str) {
        self.inner
            .broken_workspaces
            .write()
            .unwrap()
            .insert(workspace_id.to_string());
    }

    /// Make `entity_counts` fail for one company.
    pub fn break_company(&self, company_id: &str) {
        self.inner
            .broken_companies
            .write()
            .unwrap()
            .insert(company_id.to_string());
    }
}

#[async_trait]
impl CrmDirectory for InMemoryCrmDirectory {
    async fn billing_workspaces(&self) -> Result<Vec<Workspace>> {
        let mut workspaces: Vec<Workspace> = self
            .inner
            .workspaces
            .read()
            .unwrap()
            .iter()
            .filter(|ws| ws.billing_enabled && ws.sender().is_some())
            .cloned()
            .collect();
        workspaces.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(workspaces)
    }

    async fn due_companies(&self, workspace_id: &str, day: u32) -> Result<Vec<Company>> {
        if self.inner.broken_workspaces.read().unwrap().contains(workspace_id) {
            return Err(AppError::Database(format!(
                "companies of workspace {} unavailable",
                workspace_id
            )));
        }

        let mut companies: Vec<Company> = self
            .inner
            .companies
            .read()
            .unwrap()
            .iter()
            .filter(|c| c.workspace_id == workspace_id && c.status == ACTIVE_CLIENT_STATUS)
            .filter(|c| self.store.billing_day(&c.id).map(u32::from) == Some(day))
            .cloned()
            .collect();
        companies.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(companies)
    }

    async fn company(&self, company_id: &str) -> Result<Option<Company>> {
        Ok(self
            .inner
            .companies
            .read()
            .unwrap()
            .iter()
            .find(|c| c.id == company_id)
            .cloned())
    }

    async fn workspace(&self, workspace_id: &str) -> Result<Option<Workspace>> {
        Ok(self
            .inner
            .workspaces
            .read()
            .unwrap()
            .iter()
            .find(|ws| ws.id == workspace_id)
            .cloned())
    }

    async fn invoice_recipients(&self, company_id: &str) -> Result<Vec<Recipient>> {
        Ok(self
            .inner
            .recipients
            .read()
            .unwrap()
            .get(company_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn entity_counts(&self, company_id: &str) -> Result<EntityCounts> {
        if self.inner.broken_companies.read().unwrap().contains(company_id) {
            return Err(AppError::Database(format!(
                "counts of company {} unavailable",
                company_id
            )));
        }
        Ok(self
            .inner
            .counts
            .read()
            .unwrap()
            .get(company_id)
            .copied()
            .unwrap_or_default())
    }
}

// ============================================================================
// Mailer
// ============================================================================

/// Mailer that records delivered emails and fails on demand.
#[derive(Default, Clone)]
pub struct RecordingMailer {
    sent: Arc<RwLock<Vec<Email>>>,
    fail_for: HashSet<String>,
    fail_all: bool,
}

impl RecordingMailer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every send.
    #[must_use]
    pub fn failing() -> Self {
        Self {
            fail_all: true,
            ..Self::default()
        }
    }

    /// Reject sends addressed to `email`.
    #[must_use]
    pub fn fail_for(mut self, email: &str) -> Self {
        self.fail_for.insert(email.to_string());
        self
    }

    /// Emails accepted so far.
    pub fn sent(&self) -> Vec<Email> {
        self.sent.read().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: &Email) -> Result<()> {
        email.validate()?;
        if self.fail_all || email.to.iter().any(|to| self.fail_for.contains(to)) {
            return Err(AppError::service_unavailable(format!(
                "550 mailbox unavailable: {}",
                email.to.join(", ")
            )));
        }
        self.sent.write().unwrap().push(email.clone());
        Ok(())
    }

    fn is_healthy(&self) -> bool {
        !self.fail_all
    }
}

// ============================================================================
// Blob store
// ============================================================================

/// Blob store whose uploads always fail.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingBlobStore;

#[async_trait]
impl BlobStore for FailingBlobStore {
    async fn put(&self, key: &str, _data: Vec<u8>, _content_type: &str) -> Result<String> {
        Err(AppError::service_unavailable(format!(
            "bucket unreachable while writing {}",
            key
        )))
    }
}

// ============================================================================
// Accounting
// ============================================================================

/// Accounting fake numbering quotes `COT-000001`, `COT-000002`, ...
#[derive(Default, Clone)]
pub struct MockAccounting {
    inner: Arc<AccountingInner>,
}

#[derive(Default)]
struct AccountingInner {
    failure: Option<String>,
    calls: AtomicUsize,
    counter: AtomicU64,
    quotes: RwLock<Vec<QuoteRequest>>,
    connected_as: RwLock<Vec<String>>,
}

impl MockAccounting {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every API call fails with `message`.
    #[must_use]
    pub fn failing(message: &str) -> Self {
        Self {
            inner: Arc::new(AccountingInner {
                failure: Some(message.to_string()),
                ..AccountingInner::default()
            }),
        }
    }

    /// Number of API calls made.
    pub fn calls(&self) -> usize {
        self.inner.calls.load(Ordering::SeqCst)
    }

    /// Quotes created so far.
    pub fn quotes(&self) -> Vec<QuoteRequest> {
        self.inner.quotes.read().unwrap().clone()
    }

    /// AdmCloud company of every client built.
    pub fn connected_as(&self) -> Vec<String> {
        self.inner.connected_as.read().unwrap().clone()
    }
}

impl AccountingClientFactory for MockAccounting {
    fn connect(&self, credentials: &AdmCloudCredentials) -> BillingResult<Box<dyn AccountingClient>> {
        self.inner
            .connected_as
            .write()
            .unwrap()
            .push(credentials.company.clone());
        Ok(Box::new(MockAccountingClient {
            inner: self.inner.clone(),
        }))
    }
}

struct MockAccountingClient {
    inner: Arc<AccountingInner>,
}

impl MockAccountingClient {
    fn call(&self, operation: &str) -> BillingResult<()> {
        self.inner.calls.fetch_add(1, Ordering::SeqCst);
        match &self.inner.failure {
            Some(message) => Err(BillingError::AccountingApi {
                operation: operation.to_string(),
                message: message.clone(),
                http_status: None,
            }),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl AccountingClient for MockAccountingClient {
    async fn get_customer(&self, relationship_id: &str) -> BillingResult<AccountingCustomer> {
        self.call("get_customer")?;
        Ok(AccountingCustomer {
            id: relationship_id.to_string(),
            ..AccountingCustomer::default()
        })
    }

    async fn create_quote(&self, quote: &QuoteRequest) -> BillingResult<CreatedQuote> {
        self.call("create_quote")?;
        let n = self.inner.counter.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.quotes.write().unwrap().push(quote.clone());
        Ok(CreatedQuote {
            id: format!("adm-doc-{}", n),
            doc_number: format!("COT-{:06}", n),
        })
    }
}
