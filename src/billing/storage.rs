//! Storage trait for billing configuration and the ledger.
//!
//! Implemented by [`SeaOrmBillingStore`](super::SeaOrmBillingStore) and by
//! the in-memory store in [`crate::testing`].

use super::types::{
    BillingHistory, BillingItem, BillingProfile, ItemUpdate, LedgerInsert, NewBillingItem,
    ProfileUpdate,
};
use crate::error::Result;
use async_trait::async_trait;
use uuid::Uuid;

/// Persistence of profiles, items and history rows.
#[async_trait]
pub trait BillingStore: Send + Sync {
    // Profiles

    /// Get the company's profile, creating it with defaults on first access.
    async fn get_or_create_profile(&self, company_id: &str) -> Result<BillingProfile>;

    /// Apply a partial update and return the stored profile.
    async fn update_profile(&self, company_id: &str, update: &ProfileUpdate) -> Result<BillingProfile>;

    // Items

    /// Items of a company, ordered by position.
    async fn list_items(&self, company_id: &str) -> Result<Vec<BillingItem>>;

    /// Append an item after the last position. Creates the profile if needed.
    async fn add_item(&self, company_id: &str, item: &NewBillingItem) -> Result<BillingItem>;

    /// Update an item of the company. `None` when it does not exist.
    async fn update_item(
        &self,
        company_id: &str,
        item_id: Uuid,
        update: ItemUpdate,
    ) -> Result<Option<BillingItem>>;

    /// Remove an item of the company. Returns whether it existed.
    async fn remove_item(&self, company_id: &str, item_id: Uuid) -> Result<bool>;

    // Ledger

    /// Append a history row.
    ///
    /// A second `sent` row for the same (company, month, year) is refused
    /// with [`LedgerInsert::Conflict`] rather than an error.
    async fn insert_history(&self, row: &BillingHistory) -> Result<LedgerInsert>;

    /// Whether a `sent` row exists for the period.
    async fn has_sent_history(&self, company_id: &str, month: u32, year: i32) -> Result<bool>;

    /// Most recent rows first.
    async fn list_history(&self, company_id: &str, limit: u64) -> Result<Vec<BillingHistory>>;
}
