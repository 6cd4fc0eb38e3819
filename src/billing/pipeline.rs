//! Per-company proforma generation.
//!
//! Scheduled runs go quantities → AdmCloud quote → PDF → upload → email →
//! ledger row. Manual runs stop after the upload and record a `pending` row.
//! Every run that gets past the company lookup leaves exactly one row,
//! unless the store stays down through the ledger write retries.

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

use super::accounting::{AccountingClientFactory, AccountingOutcome, create_quote_for};
use super::delivery::{
    OutgoingEmail, blob_key, delivery_result, send_to_recipients, upload_pdf,
};
use super::directory::CrmDirectory;
use super::document::{DocumentInput, ProformaDocument, assemble, fallback_number};
use super::error::{BillingError, BillingResult};
use super::format::month_name;
use super::pdf::render_proforma;
use super::quantity::{ResolvedLine, resolve_lines};
use super::storage::BillingStore;
use super::template::{TemplateVars, render_email};
use super::types::{
    BILLING_CURRENCY, BillingHistory, BillingItem, BillingTrigger, Company, HistoryStatus,
    LedgerInsert, Recipient, Workspace,
};
use crate::traits::blob::BlobStore;
use crate::traits::mailer::{Attachment, Mailer};

const LEDGER_WRITE_ATTEMPTS: u32 = 3;
const LEDGER_RETRY_DELAY: Duration = Duration::from_millis(50);

/// Calendar coordinates of a run, in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BillingPeriod {
    pub today: NaiveDate,
    pub day: u32,
    pub month: u32,
    pub year: i32,
}

impl BillingPeriod {
    pub fn from_date(today: NaiveDate) -> Self {
        Self {
            today,
            day: today.day(),
            month: today.month(),
            year: today.year(),
        }
    }
}

/// Result of one company in a scheduled run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Sent { proforma_number: String },
    Failed { error: String },
    Skipped { reason: String },
}

/// Response of a manual generation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ManualProforma {
    pub success: bool,
    #[serde(rename = "proformaNumber")]
    pub proforma_number: String,
    #[serde(rename = "admCloudDocId")]
    pub admcloud_doc_id: Option<String>,
    #[serde(rename = "admCloudCreated")]
    pub admcloud_created: bool,
    #[serde(rename = "admCloudError")]
    pub admcloud_error: Option<String>,
    #[serde(rename = "pdfUrl")]
    pub pdf_url: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub total: Decimal,
    #[serde(rename = "itemsCount")]
    pub items_count: usize,
}

/// Everything computed for a company before anything leaves the process.
struct Draft {
    company_id: String,
    period: BillingPeriod,
    trigger: BillingTrigger,
    document: ProformaDocument,
    accounting: AccountingOutcome,
    recipients: Vec<Recipient>,
    cc: Vec<String>,
    generated_at: DateTime<Utc>,
}

impl Draft {
    /// A document with no lines and no accounting call, for rows that fail
    /// before generation starts.
    fn empty(
        workspace: &Workspace,
        company: &Company,
        trigger: BillingTrigger,
        now: DateTime<Utc>,
    ) -> Self {
        let period = BillingPeriod::from_date(now.date_naive());
        let document = assemble(DocumentInput {
            workspace,
            company,
            recipients: &[],
            lines: Vec::new(),
            number: fallback_number(&company.id, period.year, period.month, trigger),
            issue_date: period.today,
        });

        Self {
            company_id: company.id.clone(),
            period,
            trigger,
            document,
            accounting: AccountingOutcome::default(),
            recipients: Vec::new(),
            cc: Vec::new(),
            generated_at: now,
        }
    }

    fn lines(&self) -> &[ResolvedLine] {
        &self.document.lines
    }

    fn row(
        &self,
        status: HistoryStatus,
        pdf_url: Option<String>,
        error: Option<String>,
        sent_at: Option<DateTime<Utc>>,
    ) -> BillingHistory {
        let totals = self.document.totals;

        BillingHistory {
            id: uuid::Uuid::new_v4(),
            company_id: self.company_id.clone(),
            billing_month: self.period.month,
            billing_year: self.period.year,
            admcloud_doc_id: self.accounting.doc_id.clone(),
            admcloud_doc_number: self.accounting.doc_number.clone(),
            proforma_number: self.document.number.clone(),
            status,
            trigger: self.trigger,
            generated_at: self.generated_at,
            sent_at,
            pdf_url,
            subtotal: totals.subtotal,
            tax_amount: totals.tax,
            total: totals.total,
            currency: self.document.currency.clone(),
            recipients: self.recipients.iter().map(|r| r.email.clone()).collect(),
            cc: self.cc.clone(),
            // The accounting error is kept when nothing else went wrong
            error_message: error.or_else(|| self.accounting.error.clone()),
            items_snapshot: serde_json::to_value(self.lines()).unwrap_or_default(),
        }
    }
}

/// Runs the billing pipeline against its collaborators.
#[derive(Clone)]
pub struct BillingService {
    store: Arc<dyn BillingStore>,
    directory: Arc<dyn CrmDirectory>,
    accounting: Arc<dyn AccountingClientFactory>,
    mailer: Arc<dyn Mailer>,
    blobs: Arc<dyn BlobStore>,
}

impl BillingService {
    pub fn new(
        store: Arc<dyn BillingStore>,
        directory: Arc<dyn CrmDirectory>,
        accounting: Arc<dyn AccountingClientFactory>,
        mailer: Arc<dyn Mailer>,
        blobs: Arc<dyn BlobStore>,
    ) -> Self {
        Self {
            store,
            directory,
            accounting,
            mailer,
            blobs,
        }
    }

    pub fn store(&self) -> &dyn BillingStore {
        self.store.as_ref()
    }

    pub fn directory(&self) -> &dyn CrmDirectory {
        self.directory.as_ref()
    }

    /// Look up a company or fail with `CompanyNotFound`.
    pub async fn company(&self, company_id: &str) -> BillingResult<Company> {
        self.directory
            .company(company_id)
            .await?
            .ok_or_else(|| BillingError::CompanyNotFound {
                company_id: company_id.to_string(),
            })
    }

    async fn draft(
        &self,
        workspace: &Workspace,
        company: &Company,
        items: &[BillingItem],
        trigger: BillingTrigger,
        now: DateTime<Utc>,
    ) -> BillingResult<Draft> {
        let period = BillingPeriod::from_date(now.date_naive());
        let counts = self.directory.entity_counts(&company.id).await?;
        let recipients = self.directory.invoice_recipients(&company.id).await?;
        let lines = resolve_lines(items, &counts);

        let notes = format!(
            "Subscription {} {}",
            month_name(period.month),
            period.year
        );
        let accounting = create_quote_for(
            self.accounting.as_ref(),
            &workspace.admcloud,
            company,
            &lines,
            Some(&notes),
            period.today,
            BILLING_CURRENCY,
        )
        .await;

        let number = accounting
            .doc_number
            .clone()
            .unwrap_or_else(|| fallback_number(&company.id, period.year, period.month, trigger));

        let document = assemble(DocumentInput {
            workspace,
            company,
            recipients: &recipients,
            lines,
            number,
            issue_date: period.today,
        });

        let cc = match trigger {
            BillingTrigger::Scheduled => workspace.billing_cc.clone(),
            BillingTrigger::Manual => Vec::new(),
        };

        Ok(Draft {
            company_id: company.id.clone(),
            period,
            trigger,
            document,
            accounting,
            recipients,
            cc,
            generated_at: now,
        })
    }

    /// Render and upload; `manual_at` keeps manual reruns from overwriting.
    async fn publish(
        &self,
        workspace: &Workspace,
        draft: &Draft,
        manual_at: Option<i64>,
    ) -> BillingResult<(Vec<u8>, String)> {
        let pdf = render_proforma(&draft.document)?;
        let key = blob_key(
            &workspace.id,
            &draft.company_id,
            draft.period.year,
            draft.period.month,
            &draft.document.number,
            manual_at,
        );
        let url = upload_pdf(self.blobs.as_ref(), &key, pdf.clone()).await?;
        Ok((pdf, url))
    }

    /// Write a row, turning a refused `sent` row into `LedgerConflict`.
    async fn record(&self, row: &BillingHistory) -> BillingResult<()> {
        match self.store.insert_history(row).await? {
            LedgerInsert::Inserted => {
                tracing::info!(
                    company_id = %row.company_id,
                    proforma_number = %row.proforma_number,
                    status = row.status.as_str(),
                    "Ledger row recorded"
                );
                Ok(())
            }
            LedgerInsert::Conflict => Err(BillingError::LedgerConflict {
                company_id: row.company_id.clone(),
                month: row.billing_month,
                year: row.billing_year,
            }),
        }
    }

    /// [`record`](Self::record) with a few retries on store errors.
    /// Conflicts are final.
    async fn record_durably(&self, row: &BillingHistory) -> BillingResult<()> {
        let mut attempt = 1;
        loop {
            match self.record(row).await {
                Err(err @ BillingError::Internal { .. }) if attempt < LEDGER_WRITE_ATTEMPTS => {
                    tracing::warn!(
                        company_id = %row.company_id,
                        status = row.status.as_str(),
                        attempt,
                        error = %err,
                        "Retrying ledger write"
                    );
                    tokio::time::sleep(LEDGER_RETRY_DELAY * attempt).await;
                    attempt += 1;
                }
                result => return result,
            }
        }
    }

    /// Scheduled generation for one due company.
    ///
    /// Never fails: every error becomes a `Failed` or `Skipped` outcome.
    pub async fn bill_scheduled(
        &self,
        workspace: &Workspace,
        company: &Company,
        now: DateTime<Utc>,
    ) -> RunOutcome {
        match self.try_bill_scheduled(workspace, company, now).await {
            Ok(outcome) => outcome,
            Err(err @ BillingError::LedgerConflict { .. }) => RunOutcome::Skipped {
                reason: err.to_string(),
            },
            Err(err) => {
                tracing::error!(
                    company_id = %company.id,
                    workspace_id = %workspace.id,
                    error = %err,
                    "Scheduled billing failed"
                );
                RunOutcome::Failed {
                    error: err.to_string(),
                }
            }
        }
    }

    async fn try_bill_scheduled(
        &self,
        workspace: &Workspace,
        company: &Company,
        now: DateTime<Utc>,
    ) -> BillingResult<RunOutcome> {
        let trigger = BillingTrigger::Scheduled;

        let Some(sender) = workspace.sender() else {
            return self
                .fail_early(workspace, company, trigger, now, BillingError::SenderNotConfigured {
                    workspace_id: workspace.id.clone(),
                })
                .await;
        };

        let items = match self.store.list_items(&company.id).await {
            Ok(items) if items.is_empty() => {
                return self
                    .fail_early(workspace, company, trigger, now, BillingError::NoItemsConfigured)
                    .await;
            }
            Ok(items) => items,
            Err(err) => return self.fail_early(workspace, company, trigger, now, err.into()).await,
        };

        let draft = match self.draft(workspace, company, &items, trigger, now).await {
            Ok(draft) => draft,
            Err(err) => return self.fail_early(workspace, company, trigger, now, err).await,
        };
        let number = draft.document.number.clone();

        let published = self.publish(workspace, &draft, None).await;

        // Missing recipients is what an operator can fix, so it leads the message
        if draft.recipients.is_empty() {
            return match published {
                Ok((_, url)) => {
                    self.fail_with(&draft, Some(url), BillingError::NoRecipients)
                        .await
                }
                Err(upload_err) => {
                    let message = format!("{}; {}", BillingError::NoRecipients, upload_err);
                    self.fail_recorded(&draft, None, message).await
                }
            };
        }

        let (pdf, url) = match published {
            Ok(published) => published,
            Err(err) => return self.fail_with(&draft, None, err).await,
        };

        let vars = TemplateVars::for_document(
            &draft.document,
            company.display_legal_name(),
            draft.period.month,
            draft.period.year,
        );
        let (subject, html) = render_email(
            workspace.billing_email_subject.as_deref(),
            workspace.billing_email_body.as_deref(),
            &vars,
        );
        let message = OutgoingEmail {
            from: sender,
            cc: &draft.cc,
            subject,
            html,
            attachment: Attachment::pdf(format!("{}.pdf", number), pdf),
        };

        let report = send_to_recipients(self.mailer.as_ref(), &draft.recipients, &message).await;
        if let Err(err) = delivery_result(&report) {
            return self.fail_with(&draft, Some(url), err).await;
        }

        let row = draft.row(HistoryStatus::Sent, Some(url), None, Some(Utc::now()));
        if let Err(err) = self.record_durably(&row).await {
            if !matches!(err, BillingError::LedgerConflict { .. }) {
                tracing::error!(
                    company_id = %company.id,
                    proforma_number = %number,
                    delivered = report.delivered.len(),
                    error = %err,
                    "Proforma was emailed but the sent row could not be recorded; \
                     the next run will send it again"
                );
            }
            return Err(err);
        }

        tracing::info!(
            company_id = %company.id,
            workspace_id = %workspace.id,
            proforma_number = %number,
            delivered = report.delivered.len(),
            failed = report.failed.len(),
            "Proforma sent"
        );

        Ok(RunOutcome::Sent {
            proforma_number: number,
        })
    }

    async fn fail_early(
        &self,
        workspace: &Workspace,
        company: &Company,
        trigger: BillingTrigger,
        now: DateTime<Utc>,
        err: BillingError,
    ) -> BillingResult<RunOutcome> {
        let draft = Draft::empty(workspace, company, trigger, now);
        self.fail_with(&draft, None, err).await
    }

    async fn fail_with(
        &self,
        draft: &Draft,
        pdf_url: Option<String>,
        err: BillingError,
    ) -> BillingResult<RunOutcome> {
        self.fail_recorded(draft, pdf_url, err.to_string()).await
    }

    async fn fail_recorded(
        &self,
        draft: &Draft,
        pdf_url: Option<String>,
        error: String,
    ) -> BillingResult<RunOutcome> {
        tracing::warn!(
            company_id = %draft.company_id,
            proforma_number = %draft.document.number,
            error = %error,
            "Recording failed billing run"
        );
        let row = draft.row(HistoryStatus::Failed, pdf_url, Some(error.clone()), None);
        self.record_durably(&row).await?;
        Ok(RunOutcome::Failed { error })
    }

    /// Record a scheduled run that failed before the pipeline could start,
    /// such as when the idempotency check itself errors.
    pub async fn record_failed_run(
        &self,
        workspace: &Workspace,
        company: &Company,
        now: DateTime<Utc>,
        err: BillingError,
    ) -> RunOutcome {
        let error = err.to_string();
        match self
            .fail_early(workspace, company, BillingTrigger::Scheduled, now, err)
            .await
        {
            Ok(outcome) => outcome,
            Err(record_err) => {
                tracing::error!(
                    company_id = %company.id,
                    workspace_id = %workspace.id,
                    error = %error,
                    record_error = %record_err,
                    "Could not record failed billing run"
                );
                RunOutcome::Failed { error }
            }
        }
    }

    /// Manual generation: PDF and quote without email, recorded as `pending`.
    pub async fn generate_manual(
        &self,
        company: &Company,
        now: DateTime<Utc>,
    ) -> BillingResult<ManualProforma> {
        let workspace = self
            .directory
            .workspace(&company.workspace_id)
            .await?
            .ok_or_else(|| BillingError::WorkspaceNotFound {
                workspace_id: company.workspace_id.clone(),
            })?;

        let items = self.store.list_items(&company.id).await?;
        if items.is_empty() {
            return Err(BillingError::NoItemsConfigured);
        }

        let draft = self
            .draft(&workspace, company, &items, BillingTrigger::Manual, now)
            .await?;

        let url = match self.publish(&workspace, &draft, Some(now.timestamp())).await {
            Ok((_, url)) => url,
            Err(err) => {
                let row = draft.row(HistoryStatus::Failed, None, Some(err.to_string()), None);
                if let Err(record_err) = self.record(&row).await {
                    tracing::error!(
                        company_id = %company.id,
                        error = %record_err,
                        "Could not record failed manual run"
                    );
                }
                return Err(err);
            }
        };

        let row = draft.row(HistoryStatus::Pending, Some(url.clone()), None, None);
        self.record_durably(&row).await?;

        tracing::info!(
            company_id = %company.id,
            workspace_id = %workspace.id,
            proforma_number = %draft.document.number,
            admcloud_created = draft.accounting.created(),
            "Manual proforma generated"
        );

        Ok(ManualProforma {
            success: true,
            proforma_number: draft.document.number.clone(),
            admcloud_doc_id: draft.accounting.doc_id.clone(),
            admcloud_created: draft.accounting.created(),
            admcloud_error: draft.accounting.error.clone(),
            pdf_url: url,
            total: draft.document.totals.total,
            items_count: draft.lines().len(),
        })
    }
}

impl std::fmt::Debug for BillingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BillingService").finish_non_exhaustive()
    }
}
