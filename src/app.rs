use std::sync::Arc;

use crate::auth::{CronAuth, SessionVerifier};
use crate::billing::BillingService;
use crate::error::{AppError, Result};
use crate::health::HealthChecker;

/// Shared state handed to every handler.
///
/// Collaborators sit behind `Arc`s so cloning per request is cheap.
#[derive(Clone, Debug)]
pub struct AppContext {
    pub billing: Arc<BillingService>,
    pub cron_auth: Arc<CronAuth>,
    pub sessions: Arc<SessionVerifier>,
    pub health: Arc<HealthChecker>,
    /// Expose internal error details in responses
    pub dev_mode: bool,
}

impl AppContext {
    /// Builder pattern for constructing AppContext
    pub fn builder() -> AppContextBuilder {
        AppContextBuilder::new()
    }
}

/// Builder for AppContext with fluent API
#[must_use = "builder does nothing until you call build()"]
#[derive(Default)]
pub struct AppContextBuilder {
    billing: Option<Arc<BillingService>>,
    cron_auth: Option<CronAuth>,
    sessions: Option<SessionVerifier>,
    health: Option<HealthChecker>,
    dev_mode: bool,
}

impl AppContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_billing(mut self, billing: BillingService) -> Self {
        self.billing = Some(Arc::new(billing));
        self
    }

    pub fn with_cron_auth(mut self, auth: CronAuth) -> Self {
        self.cron_auth = Some(auth);
        self
    }

    pub fn with_sessions(mut self, verifier: SessionVerifier) -> Self {
        self.sessions = Some(verifier);
        self
    }

    /// Replace the default health checker (application check only)
    pub fn with_health(mut self, health: HealthChecker) -> Self {
        self.health = Some(health);
        self
    }

    pub fn with_dev_mode(mut self, enabled: bool) -> Self {
        self.dev_mode = enabled;
        self
    }

    /// Billing, cron auth and sessions are required.
    pub fn build(self) -> Result<AppContext> {
        let billing = self
            .billing
            .ok_or_else(|| AppError::internal("Billing service not configured"))?;
        let cron_auth = self
            .cron_auth
            .ok_or_else(|| AppError::internal("Cron auth not configured"))?;
        let sessions = self
            .sessions
            .ok_or_else(|| AppError::internal("Session verifier not configured"))?;

        Ok(AppContext {
            billing,
            cron_auth: Arc::new(cron_auth),
            sessions: Arc::new(sessions),
            health: Arc::new(self.health.unwrap_or_default()),
            dev_mode: self.dev_mode,
        })
    }
}
