//! Test support: in-memory backends, fixtures, a wired harness and
//! request scenarios.
//!
//! # Example
//!
//! ```rust,ignore
//! use crm_billing::testing::{self, BillingHarness, fixtures};
//!
//! #[tokio::test]
//! async fn test_health() {
//!     let harness = BillingHarness::new();
//!     testing::get(harness.router(fixtures::cron_auth()), "/health")
//!         .execute()
//!         .await
//!         .assert_ok()
//!         .assert_json_path("status", serde_json::json!("healthy"))
//!         .await;
//! }
//! ```

mod database;
mod fakes;
pub mod fixtures;
mod harness;
mod scenario;

pub use database::TestDb;
pub use fakes::{
    FailingBlobStore, InMemoryBillingStore, InMemoryCrmDirectory, MockAccounting, RecordingMailer,
};
pub use fixtures::fake;
pub use harness::BillingHarness;
pub use scenario::{Scenario, ScenarioAssert, delete, get, post, put};
