//! Daily batch over every workspace with billing enabled.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error::BillingResult;
use super::pipeline::{BillingPeriod, BillingService, RunOutcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Sent,
    Failed,
    Skipped,
}

/// One line of the batch details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyReport {
    pub company_id: String,
    pub company_name: String,
    pub status: ReportStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Summary returned to the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub success: bool,
    /// `YYYY-MM-DD`
    pub date: String,
    pub day: u32,
    pub processed: usize,
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
    pub details: Vec<CompanyReport>,
}

impl BatchSummary {
    fn new(period: &BillingPeriod) -> Self {
        Self {
            success: true,
            date: period.today.format("%Y-%m-%d").to_string(),
            day: period.day,
            processed: 0,
            sent: 0,
            failed: 0,
            skipped: 0,
            details: Vec::new(),
        }
    }

    fn push(&mut self, company_id: &str, company_name: &str, outcome: RunOutcome) {
        self.processed += 1;
        let (status, error) = match outcome {
            RunOutcome::Sent { .. } => {
                self.sent += 1;
                (ReportStatus::Sent, None)
            }
            RunOutcome::Failed { error } => {
                self.failed += 1;
                (ReportStatus::Failed, Some(error))
            }
            RunOutcome::Skipped { reason } => {
                self.skipped += 1;
                (ReportStatus::Skipped, Some(reason))
            }
        };
        self.details.push(CompanyReport {
            company_id: company_id.to_string(),
            company_name: company_name.to_string(),
            status,
            error,
        });
    }
}

impl BillingService {
    /// Bill every company due on `now`'s day of month.
    ///
    /// Companies are processed one at a time; a failure in one never stops
    /// the others. Only a failure to list workspaces fails the whole run.
    pub async fn run_daily(&self, now: DateTime<Utc>) -> BillingResult<BatchSummary> {
        let period = BillingPeriod::from_date(now.date_naive());
        let mut summary = BatchSummary::new(&period);

        let workspaces = self.directory().billing_workspaces().await?;
        tracing::info!(
            date = %summary.date,
            workspaces = workspaces.len(),
            "Starting subscription billing run"
        );

        for workspace in &workspaces {
            let companies = match self.directory().due_companies(&workspace.id, period.day).await {
                Ok(companies) => companies,
                Err(err) => {
                    tracing::error!(
                        workspace_id = %workspace.id,
                        error = %err,
                        "Could not list due companies"
                    );
                    continue;
                }
            };

            for company in &companies {
                let already_sent = self
                    .store()
                    .has_sent_history(&company.id, period.month, period.year)
                    .await;

                let outcome = match already_sent {
                    Ok(true) => {
                        tracing::debug!(company_id = %company.id, "Already billed this period");
                        RunOutcome::Skipped {
                            reason: "already billed this period".to_string(),
                        }
                    }
                    Ok(false) => self.bill_scheduled(workspace, company, now).await,
                    Err(err) => {
                        tracing::error!(
                            company_id = %company.id,
                            error = %err,
                            "Could not check the ledger for this period"
                        );
                        self.record_failed_run(workspace, company, now, err.into())
                            .await
                    }
                };

                summary.push(&company.id, &company.name, outcome);
            }
        }

        tracing::info!(
            date = %summary.date,
            processed = summary.processed,
            sent = summary.sent,
            failed = summary.failed,
            skipped = summary.skipped,
            "Subscription billing run finished"
        );

        Ok(summary)
    }
}
