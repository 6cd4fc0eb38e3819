//! Billing tables migration.
//!
//! - billing_profiles: one row per company (type, billing day, auto flag)
//! - billing_items: subscription line items, ordered by position
//! - billing_history: append-only ledger of generation attempts
//!
//! The ledger carries a partial unique index so that only one `sent` row
//! can exist per (company, month, year).

use sea_orm_migration::{prelude::*, schema::*};

#[derive(DeriveMigrationName)]
pub struct Migration;

pub const SENT_PERIOD_INDEX: &str = "ux_billing_history_sent_period";

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(BillingProfiles::Table)
                    .if_not_exists()
                    .col(string(BillingProfiles::CompanyId).primary_key())
                    .col(string(BillingProfiles::BillingType).default("standard"))
                    .col(integer(BillingProfiles::BillingDay).default(1))
                    .col(boolean(BillingProfiles::AutoBillingEnabled).default(false))
                    .col(
                        timestamp_with_time_zone(BillingProfiles::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(BillingProfiles::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_billing_profiles_billing_day")
                    .table(BillingProfiles::Table)
                    .col(BillingProfiles::BillingDay)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(BillingItems::Table)
                    .if_not_exists()
                    .col(uuid(BillingItems::Id).primary_key())
                    .col(string(BillingItems::CompanyId))
                    .col(string_null(BillingItems::ExternalItemId))
                    .col(string(BillingItems::Code))
                    .col(string(BillingItems::Description))
                    .col(decimal_len(BillingItems::UnitPrice, 16, 4))
                    .col(string(BillingItems::CountType))
                    .col(decimal_len_null(BillingItems::ManualQuantity, 16, 4))
                    .col(string_null(BillingItems::CountBase))
                    .col(integer_null(BillingItems::SubtractCount))
                    .col(integer(BillingItems::Position).default(0))
                    .col(
                        timestamp_with_time_zone(BillingItems::CreatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .col(
                        timestamp_with_time_zone(BillingItems::UpdatedAt)
                            .default(Expr::current_timestamp()),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_billing_items_profile")
                            .from(BillingItems::Table, BillingItems::CompanyId)
                            .to(BillingProfiles::Table, BillingProfiles::CompanyId)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_billing_items_company_position")
                    .table(BillingItems::Table)
                    .col(BillingItems::CompanyId)
                    .col(BillingItems::Position)
                    .to_owned(),
            )
            .await?;

        manager
            .create_table(
                Table::create()
                    .table(BillingHistory::Table)
                    .if_not_exists()
                    .col(uuid(BillingHistory::Id).primary_key())
                    .col(string(BillingHistory::CompanyId))
                    .col(integer(BillingHistory::BillingMonth))
                    .col(integer(BillingHistory::BillingYear))
                    .col(string_null(BillingHistory::AdmcloudDocId))
                    .col(string_null(BillingHistory::AdmcloudDocNumber))
                    .col(string(BillingHistory::ProformaNumber))
                    .col(string(BillingHistory::Status))
                    .col(string(BillingHistory::Trigger).default("scheduled"))
                    .col(timestamp_with_time_zone(BillingHistory::GeneratedAt))
                    .col(timestamp_with_time_zone_null(BillingHistory::SentAt))
                    .col(text_null(BillingHistory::PdfUrl))
                    .col(decimal_len(BillingHistory::Subtotal, 16, 4))
                    .col(decimal_len(BillingHistory::TaxAmount, 16, 4))
                    .col(decimal_len(BillingHistory::Total, 16, 4))
                    .col(string(BillingHistory::Currency))
                    .col(text(BillingHistory::Recipients))
                    .col(text(BillingHistory::Cc))
                    .col(text_null(BillingHistory::ErrorMessage))
                    .col(text(BillingHistory::ItemsSnapshot))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_billing_history_period")
                    .table(BillingHistory::Table)
                    .col(BillingHistory::CompanyId)
                    .col(BillingHistory::BillingYear)
                    .col(BillingHistory::BillingMonth)
                    .to_owned(),
            )
            .await?;

        // Partial unique index; the query builder has no portable WHERE
        // clause for index creation, and both Postgres and SQLite accept this.
        manager
            .get_connection()
            .execute_unprepared(&format!(
                "CREATE UNIQUE INDEX IF NOT EXISTS {SENT_PERIOD_INDEX} \
                 ON billing_history (company_id, billing_month, billing_year) \
                 WHERE status = 'sent'"
            ))
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(BillingHistory::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(BillingItems::Table).to_owned())
            .await?;

        manager
            .drop_table(Table::drop().table(BillingProfiles::Table).to_owned())
            .await?;

        Ok(())
    }
}

#[derive(DeriveIden)]
enum BillingProfiles {
    Table,
    CompanyId,
    BillingType,
    BillingDay,
    AutoBillingEnabled,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum BillingItems {
    Table,
    Id,
    CompanyId,
    ExternalItemId,
    Code,
    Description,
    UnitPrice,
    CountType,
    ManualQuantity,
    CountBase,
    SubtractCount,
    Position,
    CreatedAt,
    UpdatedAt,
}

#[derive(DeriveIden)]
enum BillingHistory {
    Table,
    Id,
    CompanyId,
    BillingMonth,
    BillingYear,
    AdmcloudDocId,
    AdmcloudDocNumber,
    ProformaNumber,
    Status,
    Trigger,
    GeneratedAt,
    SentAt,
    PdfUrl,
    Subtotal,
    TaxAmount,
    Total,
    Currency,
    Recipients,
    Cc,
    ErrorMessage,
    ItemsSnapshot,
}
