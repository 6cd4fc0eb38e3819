//! Recurring subscription billing for a multi-tenant CRM.
//!
//! Once a day a scheduler calls the batch route. For every workspace with
//! billing enabled, each active client company whose billing day is today
//! gets a proforma: quantities are resolved from live CRM counts, a quote
//! is registered in AdmCloud when the workspace is connected, a PDF is
//! rendered and stored, the invoice contacts are emailed and the run is
//! recorded in the billing ledger. Operators can generate the same
//! document on demand and manage billing settings per company.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use crm_billing::{ConfigBuilder, init_tracing_with_config};
//!
//! # fn main() -> crm_billing::Result<()> {
//! let config = ConfigBuilder::new().from_env().build()?;
//! init_tracing_with_config(&config);
//! # Ok(())
//! # }
//! ```

mod app;
pub mod auth;
pub mod billing;
mod config;
mod core;
pub mod database;
pub mod email;
mod error;
pub mod health;
pub mod http;
mod middleware;
pub mod routes;
pub mod storage;
pub mod testing;
pub mod traits;
pub mod utils;
pub mod validation;

// Re-exports for public API
pub use app::{AppContext, AppContextBuilder};
pub use billing::{BatchSummary, BillingError, BillingService};
pub use config::{Config, ConfigBuilder, LoggingConfig, ServerConfig, SessionConfig};
pub use crate::core::App;
pub use error::{AppError, ErrorContext, ErrorWithContext, Result};
pub use health::{ComponentHealth, HealthCheck, HealthChecker, HealthStatus};
pub use http::{CreatedResponse, NoContentResponse, PathParams, RouteModule};
pub use routes::billing_app;
pub use validation::{ValidatedJson, ValidatedQuery, validator};

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing/logging with sensible defaults
///
/// # Environment Variables
///
/// - `RUST_LOG`: Set log level (e.g., "info", "crm_billing=debug")
/// - `CRM_BILLING_LOG_JSON`: Set to "true" for JSON formatted logs
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json_logs = utils::get_env_flag("LOG_JSON").unwrap_or(false);
    install_subscriber(env_filter, json_logs);
}

/// Initialize tracing from loaded configuration. `RUST_LOG` still wins
/// when set, so a single module can be turned up in production.
pub fn init_tracing_with_config(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    install_subscriber(env_filter, config.logging.json);
}

fn install_subscriber(env_filter: EnvFilter, json: bool) {
    let registry = tracing_subscriber::registry().with(env_filter);
    // try_init: tests and embedders may already have a subscriber
    let result = if json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    if let Err(e) = result {
        eprintln!("tracing already initialized: {}", e);
    }
}
