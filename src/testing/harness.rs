//! A billing service wired to in-memory collaborators.

use axum::Router;
use secrecy::SecretString;
use std::sync::Arc;

use super::fakes::{
    FailingBlobStore, InMemoryBillingStore, InMemoryCrmDirectory, MockAccounting, RecordingMailer,
};
use super::fixtures::TEST_SESSION_SECRET;
use crate::app::AppContext;
use crate::auth::{CronAuth, SessionVerifier};
use crate::billing::types::{Company, NewBillingItem, Workspace};
use crate::billing::{BillingItem, BillingService, BillingStore};
use crate::config::{ServerConfig, SessionConfig};
use crate::routes::billing_app;
use crate::storage::MemoryBlobStore;
use crate::traits::blob::BlobStore;

/// Fakes plus the service built on them.
///
/// ```rust,ignore
/// let harness = BillingHarness::new();
/// harness.seed_workspace(fixtures::workspace("w1"));
/// harness.seed_company(fixtures::company("c1", "w1", "Acme"), 1);
/// let summary = harness.service().run_daily(now).await?;
/// ```
#[derive(Clone)]
pub struct BillingHarness {
    pub store: InMemoryBillingStore,
    pub directory: InMemoryCrmDirectory,
    pub accounting: MockAccounting,
    pub mailer: RecordingMailer,
    pub blobs: MemoryBlobStore,
    failing_uploads: bool,
}

impl Default for BillingHarness {
    fn default() -> Self {
        Self::new()
    }
}

impl BillingHarness {
    pub fn new() -> Self {
        let store = InMemoryBillingStore::new();
        let directory = InMemoryCrmDirectory::new(&store);
        Self {
            store,
            directory,
            accounting: MockAccounting::new(),
            mailer: RecordingMailer::new(),
            blobs: MemoryBlobStore::with_base_url("https://files.test"),
            failing_uploads: false,
        }
    }

    #[must_use]
    pub fn with_mailer(mut self, mailer: RecordingMailer) -> Self {
        self.mailer = mailer;
        self
    }

    #[must_use]
    pub fn with_accounting(mut self, accounting: MockAccounting) -> Self {
        self.accounting = accounting;
        self
    }

    #[must_use]
    pub fn with_failing_uploads(mut self) -> Self {
        self.failing_uploads = true;
        self
    }

    pub fn service(&self) -> BillingService {
        let blobs: Arc<dyn BlobStore> = if self.failing_uploads {
            Arc::new(FailingBlobStore)
        } else {
            Arc::new(self.blobs.clone())
        };

        BillingService::new(
            Arc::new(self.store.clone()),
            Arc::new(self.directory.clone()),
            Arc::new(self.accounting.clone()),
            Arc::new(self.mailer.clone()),
            blobs,
        )
    }

    pub fn session_verifier(&self) -> SessionVerifier {
        SessionVerifier::new(&SessionConfig {
            jwt_secret: SecretString::from(TEST_SESSION_SECRET.to_string()),
            issuer: None,
            audience: None,
        })
    }

    pub fn context(&self, cron_auth: CronAuth) -> AppContext {
        AppContext {
            billing: Arc::new(self.service()),
            cron_auth: Arc::new(cron_auth),
            sessions: Arc::new(self.session_verifier()),
            health: Arc::default(),
            dev_mode: false,
        }
    }

    /// Full router with middleware, for `oneshot` requests.
    pub fn router(&self, cron_auth: CronAuth) -> Router {
        billing_app(ServerConfig::default(), self.context(cron_auth)).into_router()
    }

    pub fn seed_workspace(&self, workspace: Workspace) {
        self.directory.add_workspace(workspace);
    }

    /// Add a company billed on `billing_day`.
    pub fn seed_company(&self, company: Company, billing_day: u8) {
        self.store.set_billing_day(&company.id, billing_day);
        self.directory.add_company(company);
    }

    pub async fn seed_item(&self, company_id: &str, item: NewBillingItem) -> BillingItem {
        self.store
            .add_item(company_id, &item)
            .await
            .unwrap_or_else(|e| panic!("seeding item for {}: {}", company_id, e))
    }
}
