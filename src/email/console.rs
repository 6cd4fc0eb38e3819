//! Console mailer for local runs
//!
//! Logs email metadata instead of sending. Bodies are never printed since
//! they carry client names and totals.

use crate::error::Result;
use crate::traits::mailer::{Email, Mailer};
use async_trait::async_trait;

/// A mailer that logs emails instead of sending them
///
/// Used when no SMTP host is configured.
#[derive(Debug, Clone, Default)]
pub struct ConsoleMailer;

impl ConsoleMailer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Mailer for ConsoleMailer {
    async fn send(&self, email: &Email) -> Result<()> {
        email.validate()?;

        tracing::info!(
            from = %email.from,
            to = email.to.len(),
            cc = email.cc.len(),
            subject = %email.subject,
            attachments = ?email.attachments.iter().map(|a| a.filename.as_str()).collect::<Vec<_>>(),
            "Console mailer: email not sent"
        );

        Ok(())
    }

    fn is_healthy(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_console_mailer_sends_without_error() {
        let email = Email::new("billing@acme.test", "ana@client.test", "Proforma").text("Hi");
        assert!(ConsoleMailer::new().send(&email).await.is_ok());
    }

    #[tokio::test]
    async fn test_console_mailer_validates_email() {
        let email = Email::new("billing@acme.test", "ana@client.test", "Proforma");
        assert!(ConsoleMailer::new().send(&email).await.is_err());
    }
}
