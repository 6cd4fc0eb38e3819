//! PDF upload and email delivery.

use super::error::{BillingError, BillingResult};
use super::types::Recipient;
use crate::traits::blob::BlobStore;
use crate::traits::mailer::{Attachment, Email, Mailer};

pub const PDF_CONTENT_TYPE: &str = "application/pdf";

/// Object key of a proforma:
/// `billing/<workspace>/<company>/<YYYY-MM>/<number>.pdf`.
///
/// Manual runs pass their unix timestamp so repeated generations in the
/// same month never overwrite each other.
pub fn blob_key(
    workspace_id: &str,
    company_id: &str,
    year: i32,
    month: u32,
    number: &str,
    manual_at: Option<i64>,
) -> String {
    let file = match manual_at {
        Some(ts) => format!("{}-manual-{}", sanitize(number), ts),
        None => sanitize(number),
    };
    format!(
        "billing/{}/{}/{:04}-{:02}/{}.pdf",
        sanitize(workspace_id),
        sanitize(company_id),
        year,
        month,
        file
    )
}

/// Keep keys free of path separators and odd characters.
fn sanitize(segment: &str) -> String {
    segment
        .chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' | '-' | '_' | '.' => c,
            _ => '_',
        })
        .collect()
}

/// Upload the PDF and return its public URL.
pub async fn upload_pdf(blobs: &dyn BlobStore, key: &str, pdf: Vec<u8>) -> BillingResult<String> {
    blobs
        .put(key, pdf, PDF_CONTENT_TYPE)
        .await
        .map_err(|e| BillingError::Upload {
            message: e.to_string(),
        })
}

/// A rendered billing email, sent once per recipient.
#[derive(Debug, Clone)]
pub struct OutgoingEmail<'a> {
    pub from: &'a str,
    pub cc: &'a [String],
    pub subject: String,
    pub html: String,
    pub attachment: Attachment,
}

/// Per-recipient result of a delivery.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl DeliveryReport {
    pub fn any_delivered(&self) -> bool {
        !self.delivered.is_empty()
    }
}

/// Send one email per recipient. CC addresses ride on every email.
///
/// Failures are collected, never raised; the caller decides the row status.
pub async fn send_to_recipients(
    mailer: &dyn Mailer,
    recipients: &[Recipient],
    message: &OutgoingEmail<'_>,
) -> DeliveryReport {
    let mut report = DeliveryReport::default();

    for recipient in recipients {
        let email = Email::new(message.from, recipient.email.clone(), message.subject.clone())
            .html(message.html.clone())
            .cc_many(message.cc.iter().cloned())
            .attach(message.attachment.clone());

        match mailer.send(&email).await {
            Ok(()) => {
                tracing::debug!(recipient = %recipient.email, "Proforma email sent");
                report.delivered.push(recipient.email.clone());
            }
            Err(err) => {
                tracing::warn!(
                    recipient = %recipient.email,
                    error = %err,
                    "Proforma email failed"
                );
                report.failed.push((recipient.email.clone(), err.to_string()));
            }
        }
    }

    report
}

/// Turn a delivery report into the row outcome.
pub fn delivery_result(report: &DeliveryReport) -> BillingResult<()> {
    if report.any_delivered() {
        Ok(())
    } else {
        Err(BillingError::DeliveryFailed {
            attempted: report.failed.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingMailer;

    fn recipients() -> Vec<Recipient> {
        vec![
            Recipient {
                name: "Ana".into(),
                email: "ana@client.test".into(),
            },
            Recipient {
                name: "Luis".into(),
                email: "luis@client.test".into(),
            },
        ]
    }

    fn message(cc: &[String]) -> OutgoingEmail<'_> {
        OutgoingEmail {
            from: "billing@acme.test",
            cc,
            subject: "Proforma".into(),
            html: "<p>Hi</p>".into(),
            attachment: Attachment::pdf("PRO-1.pdf", b"%PDF".to_vec()),
        }
    }

    #[test]
    fn test_blob_key_layout() {
        assert_eq!(
            blob_key("w1", "c1", 2024, 3, "PRO-202403-abc123", None),
            "billing/w1/c1/2024-03/PRO-202403-abc123.pdf"
        );
        assert_eq!(
            blob_key("w1", "c1", 2024, 3, "COT/0001", Some(1709251200)),
            "billing/w1/c1/2024-03/COT_0001-manual-1709251200.pdf"
        );
    }

    #[tokio::test]
    async fn test_each_recipient_gets_own_email_with_cc() {
        let mailer = RecordingMailer::new();
        let cc = vec!["ops@acme.test".to_string()];
        let report = send_to_recipients(&mailer, &recipients(), &message(&cc)).await;

        assert_eq!(report.delivered.len(), 2);
        let sent = mailer.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].to, vec!["ana@client.test"]);
        assert_eq!(sent[1].cc, vec!["ops@acme.test"]);
        assert_eq!(sent[1].attachments[0].filename, "PRO-1.pdf");
    }

    #[tokio::test]
    async fn test_partial_failure_still_delivers() {
        let mailer = RecordingMailer::new().fail_for("ana@client.test");
        let report = send_to_recipients(&mailer, &recipients(), &message(&[])).await;

        assert_eq!(report.delivered, vec!["luis@client.test"]);
        assert_eq!(report.failed.len(), 1);
        assert!(delivery_result(&report).is_ok());
    }

    #[tokio::test]
    async fn test_all_failed() {
        let mailer = RecordingMailer::failing();
        let report = send_to_recipients(&mailer, &recipients(), &message(&[])).await;

        let err = delivery_result(&report).unwrap_err();
        assert_eq!(err.to_string(), "failed to send to all recipients");
    }
}
