//! Read-only view of the CRM records billing depends on.

use super::types::{Company, EntityCounts, Recipient, Workspace};
use crate::error::Result;
use async_trait::async_trait;

/// Lookups into CRM-owned tables. Billing never writes through this trait.
#[async_trait]
pub trait CrmDirectory: Send + Sync {
    /// Workspaces with billing enabled and a sender address.
    async fn billing_workspaces(&self) -> Result<Vec<Workspace>>;

    /// Active-client companies of a workspace whose billing day is `day`.
    async fn due_companies(&self, workspace_id: &str, day: u32) -> Result<Vec<Company>>;

    async fn company(&self, company_id: &str) -> Result<Option<Company>>;

    async fn workspace(&self, workspace_id: &str) -> Result<Option<Workspace>>;

    /// Contacts flagged to receive invoices, oldest first.
    async fn invoice_recipients(&self, company_id: &str) -> Result<Vec<Recipient>>;

    async fn entity_counts(&self, company_id: &str) -> Result<EntityCounts>;
}
