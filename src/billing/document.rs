//! Proforma document assembly.
//!
//! The document is the single payload consumed by the PDF renderer, the
//! email templates and the ledger snapshot.

use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::quantity::{ResolvedLine, Totals};
use super::types::{BILLING_CURRENCY, BankTransferInfo, BillingTrigger, Company, Recipient, Workspace};

/// Validity window of a proforma.
pub const EXPIRATION_BUSINESS_DAYS: u32 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfo {
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    /// Printed as text; the image is never fetched
    pub logo_url: Option<String>,
    pub tax_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub name: String,
    pub tax_id: Option<String>,
    pub address: Option<String>,
    pub contact_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProformaDocument {
    pub number: String,
    pub issue_date: NaiveDate,
    pub expiration_date: NaiveDate,
    pub currency: String,
    pub provider: ProviderInfo,
    pub client: ClientInfo,
    pub lines: Vec<ResolvedLine>,
    pub totals: Totals,
    pub exchange_rate: Option<Decimal>,
    pub notes: Option<String>,
    pub bank_transfer: Option<BankTransferInfo>,
}

/// Add `days` weekdays to `start`. Saturdays and Sundays are skipped;
/// there is no holiday calendar.
pub fn add_business_days(start: NaiveDate, days: u32) -> NaiveDate {
    let mut date = start;
    let mut remaining = days;
    while remaining > 0 {
        date += Duration::days(1);
        if !is_weekend(date) {
            remaining -= 1;
        }
    }
    date
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Document number used when AdmCloud did not issue one:
/// `PRO-<YYYY><MM>-<last 6 chars of company id>`, `-M` for manual runs.
///
/// Unique per (company, month) only.
pub fn fallback_number(company_id: &str, year: i32, month: u32, trigger: BillingTrigger) -> String {
    let chars: Vec<char> = company_id.chars().collect();
    let tail: String = chars[chars.len().saturating_sub(6)..].iter().collect();
    let suffix = match trigger {
        BillingTrigger::Scheduled => "",
        BillingTrigger::Manual => "-M",
    };
    format!("PRO-{:04}{:02}-{}{}", year, month, tail, suffix)
}

/// Inputs gathered by the pipeline for one company.
pub struct DocumentInput<'a> {
    pub workspace: &'a Workspace,
    pub company: &'a Company,
    pub recipients: &'a [Recipient],
    pub lines: Vec<ResolvedLine>,
    pub number: String,
    pub issue_date: NaiveDate,
}

/// Build the canonical proforma payload.
pub fn assemble(input: DocumentInput<'_>) -> ProformaDocument {
    let DocumentInput {
        workspace,
        company,
        recipients,
        lines,
        number,
        issue_date,
    } = input;

    let totals = Totals::from_lines(&lines);

    ProformaDocument {
        number,
        issue_date,
        expiration_date: add_business_days(issue_date, EXPIRATION_BUSINESS_DAYS),
        currency: BILLING_CURRENCY.to_string(),
        provider: ProviderInfo {
            name: workspace.display_legal_name().to_string(),
            address: workspace.address.clone(),
            phone: workspace.phone.clone(),
            logo_url: workspace.logo_url.clone(),
            tax_id: workspace.tax_id.clone(),
        },
        client: ClientInfo {
            name: company.display_legal_name().to_string(),
            tax_id: company.tax_id.clone(),
            address: company.fiscal_address.clone(),
            contact_name: recipients.first().map(|r| r.name.clone()),
        },
        lines,
        totals,
        exchange_rate: None,
        notes: workspace.proforma_notes.clone(),
        bank_transfer: workspace.bank_transfer.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::billing::types::AdmCloudSettings;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_fallback_number() {
        assert_eq!(
            fallback_number("cmp_00abc123", 2024, 3, BillingTrigger::Scheduled),
            "PRO-202403-abc123"
        );
        assert_eq!(
            fallback_number("cmp_00abc123", 2024, 3, BillingTrigger::Manual),
            "PRO-202403-abc123-M"
        );
    }

    #[test]
    fn test_fallback_number_short_id() {
        assert_eq!(
            fallback_number("42", 2025, 11, BillingTrigger::Scheduled),
            "PRO-202511-42"
        );
    }

    #[test]
    fn test_business_days_from_friday() {
        // 2024-03-01 is a Friday
        let start = date(2024, 3, 1);
        assert_eq!(start.weekday(), Weekday::Fri);

        let end = add_business_days(start, EXPIRATION_BUSINESS_DAYS);
        assert!(!is_weekend(end));
        assert_eq!(end, date(2024, 4, 12));

        let weekdays = start
            .iter_days()
            .skip(1)
            .take_while(|d| *d <= end)
            .filter(|d| !is_weekend(*d))
            .count();
        assert_eq!(weekdays, 30);
    }

    #[test]
    fn test_business_days_never_weekend() {
        let start = date(2024, 1, 1);
        for offset in 0..14 {
            let issue = start + Duration::days(offset);
            let end = add_business_days(issue, EXPIRATION_BUSINESS_DAYS);
            assert!(!is_weekend(end), "{issue} -> {end}");
        }
    }

    #[test]
    fn test_assemble_uses_first_recipient_and_usd() {
        let workspace = Workspace {
            id: "w1".into(),
            name: "Agency".into(),
            legal_name: Some("Agency SRL".into()),
            address: Some("Av. Principal 1".into()),
            phone: None,
            logo_url: None,
            tax_id: Some("101-00000-1".into()),
            billing_enabled: true,
            billing_sender_email: Some("billing@agency.test".into()),
            billing_email_subject: None,
            billing_email_body: None,
            billing_cc: vec![],
            admcloud: AdmCloudSettings::disabled(),
            bank_transfer: None,
            proforma_notes: Some("Thanks".into()),
        };
        let company = Company {
            id: "c1".into(),
            workspace_id: "w1".into(),
            name: "Acme".into(),
            legal_name: None,
            tax_id: Some("131-1".into()),
            fiscal_address: None,
            status: "active_client".into(),
            admcloud_relationship_id: None,
        };
        let recipients = vec![
            Recipient {
                name: "Ana".into(),
                email: "ana@acme.test".into(),
            },
            Recipient {
                name: "Luis".into(),
                email: "luis@acme.test".into(),
            },
        ];

        let doc = assemble(DocumentInput {
            workspace: &workspace,
            company: &company,
            recipients: &recipients,
            lines: vec![],
            number: "PRO-202403-c1".into(),
            issue_date: date(2024, 3, 1),
        });

        assert_eq!(doc.currency, "USD");
        assert_eq!(doc.provider.name, "Agency SRL");
        assert_eq!(doc.client.name, "Acme");
        assert_eq!(doc.client.contact_name.as_deref(), Some("Ana"));
        assert_eq!(doc.notes.as_deref(), Some("Thanks"));
        assert_eq!(doc.totals.total, Decimal::ZERO);
    }
}
