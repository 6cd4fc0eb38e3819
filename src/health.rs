use async_trait::async_trait;
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use sea_orm::DatabaseConnection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::app::AppContext;
use crate::traits::mailer::Mailer;

/// Health check status
#[non_exhaustive]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Health check result for a single component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ComponentHealth {
    fn new(name: &str, status: HealthStatus, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: Some(message.into()),
        }
    }
}

/// Overall health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: HealthStatus,
    pub checks: Vec<ComponentHealth>,
}

impl IntoResponse for HealthResponse {
    fn into_response(self) -> Response {
        let status_code = match self.status {
            HealthStatus::Healthy => StatusCode::OK,
            HealthStatus::Degraded => StatusCode::OK,
            HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
        };

        (status_code, Json(self)).into_response()
    }
}

#[async_trait]
pub trait HealthCheck: Send + Sync {
    fn name(&self) -> &str;

    async fn check(&self) -> ComponentHealth;
}

/// Always healthy while the process serves requests
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicHealthCheck;

#[async_trait]
impl HealthCheck for BasicHealthCheck {
    fn name(&self) -> &str {
        "application"
    }

    async fn check(&self) -> ComponentHealth {
        ComponentHealth::new(self.name(), HealthStatus::Healthy, "Application is running")
    }
}

/// Pings the database pool.
#[derive(Debug, Clone)]
pub struct DatabaseHealthCheck {
    db: DatabaseConnection,
}

impl DatabaseHealthCheck {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

#[async_trait]
impl HealthCheck for DatabaseHealthCheck {
    fn name(&self) -> &str {
        "database"
    }

    async fn check(&self) -> ComponentHealth {
        match self.db.ping().await {
            Ok(()) => ComponentHealth::new(self.name(), HealthStatus::Healthy, "Connected"),
            Err(e) => {
                tracing::warn!(error = %e, "Database health check failed");
                ComponentHealth::new(self.name(), HealthStatus::Unhealthy, "Database unreachable")
            }
        }
    }
}

/// Reports the mailer as degraded when unhealthy: billing still runs,
/// deliveries are recorded as failed.
pub struct MailerHealthCheck {
    mailer: Arc<dyn Mailer>,
}

impl MailerHealthCheck {
    pub fn new(mailer: Arc<dyn Mailer>) -> Self {
        Self { mailer }
    }
}

#[async_trait]
impl HealthCheck for MailerHealthCheck {
    fn name(&self) -> &str {
        "mailer"
    }

    async fn check(&self) -> ComponentHealth {
        if self.mailer.is_healthy() {
            ComponentHealth::new(self.name(), HealthStatus::Healthy, "Ready")
        } else {
            ComponentHealth::new(self.name(), HealthStatus::Degraded, "Mail transport unavailable")
        }
    }
}

/// Health check manager that runs all registered checks
pub struct HealthChecker {
    checks: Vec<Arc<dyn HealthCheck>>,
}

impl HealthChecker {
    pub fn new() -> Self {
        Self {
            checks: vec![Arc::new(BasicHealthCheck)],
        }
    }

    pub fn with_check(mut self, check: Arc<dyn HealthCheck>) -> Self {
        self.checks.push(check);
        self
    }

    pub async fn check_health(&self) -> HealthResponse {
        let mut checks = Vec::new();
        let mut overall_status = HealthStatus::Healthy;

        for check in &self.checks {
            let result = check.check().await;

            match result.status {
                HealthStatus::Unhealthy => overall_status = HealthStatus::Unhealthy,
                HealthStatus::Degraded if overall_status == HealthStatus::Healthy => {
                    overall_status = HealthStatus::Degraded
                }
                _ => {}
            }

            checks.push(result);
        }

        HealthResponse {
            status: overall_status,
            checks,
        }
    }
}

impl Default for HealthChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HealthChecker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.checks.iter().map(|c| c.name()).collect();
        f.debug_struct("HealthChecker").field("checks", &names).finish()
    }
}

/// `GET /health`
pub async fn health_handler(State(ctx): State<AppContext>) -> HealthResponse {
    ctx.health.check_health().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::traits::mailer::Email;

    struct DownMailer;

    #[async_trait]
    impl Mailer for DownMailer {
        async fn send(&self, _email: &Email) -> Result<()> {
            Ok(())
        }

        fn is_healthy(&self) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_default_is_healthy() {
        let response = HealthChecker::new().check_health().await;
        assert_eq!(response.status, HealthStatus::Healthy);
        assert_eq!(response.checks.len(), 1);
    }

    #[tokio::test]
    async fn test_mailer_down_degrades() {
        let checker = HealthChecker::new()
            .with_check(Arc::new(MailerHealthCheck::new(Arc::new(DownMailer))));
        let response = checker.check_health().await;
        assert_eq!(response.status, HealthStatus::Degraded);
        assert_eq!(response.checks[1].name, "mailer");
        assert_eq!(response.into_response().status(), StatusCode::OK);
    }
}
