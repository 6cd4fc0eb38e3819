//! Billable quantity resolution and totals.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::types::{BillingItem, CountBase, CountType, EntityCounts};

/// Resolve an item's billed quantity from live counts.
///
/// Never negative: manual quantities below zero and calculated
/// differences both clamp at zero.
pub fn resolve_quantity(count_type: &CountType, counts: &EntityCounts) -> Decimal {
    let quantity = match count_type {
        CountType::Manual { quantity } => *quantity,
        CountType::ActiveProjects => Decimal::from(counts.active_projects),
        CountType::ActiveUsers => Decimal::from(counts.active_users),
        CountType::Calculated { base, subtract } => {
            let base = match base {
                CountBase::Users => counts.active_users,
                CountBase::Projects => counts.active_projects,
            };
            Decimal::from(base.saturating_sub(*subtract))
        }
    };
    quantity.max(Decimal::ZERO)
}

/// A configured item with its quantity resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedLine {
    pub item_id: Uuid,
    pub external_item_id: Option<String>,
    pub code: String,
    pub description: String,
    pub count_type: String,
    pub quantity: Decimal,
    pub unit_price: Decimal,
    pub line_total: Decimal,
}

/// Document totals. Tax is not computed and stays zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub subtotal: Decimal,
    pub discount: Decimal,
    pub tax: Decimal,
    pub total: Decimal,
}

impl Totals {
    pub fn from_lines(lines: &[ResolvedLine]) -> Self {
        let subtotal: Decimal = lines.iter().map(|line| line.line_total).sum();
        let discount = Decimal::ZERO;
        let tax = Decimal::ZERO;
        Self {
            subtotal,
            discount,
            tax,
            total: subtotal - discount + tax,
        }
    }
}

/// Resolve every item, preserving input order.
pub fn resolve_lines(items: &[BillingItem], counts: &EntityCounts) -> Vec<ResolvedLine> {
    items
        .iter()
        .map(|item| {
            let quantity = resolve_quantity(&item.count_type, counts);
            ResolvedLine {
                item_id: item.id,
                external_item_id: item.external_item_id.clone(),
                code: item.code.clone(),
                description: item.description.clone(),
                count_type: item.count_type.kind().to_string(),
                quantity,
                unit_price: item.unit_price,
                line_total: quantity * item.unit_price,
            }
        })
        .collect()
}
