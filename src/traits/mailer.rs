//! Mailer trait for delivering billing emails

use crate::error::{AppError, Result};
use async_trait::async_trait;

/// A file attached to an email.
#[derive(Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub data: Vec<u8>,
}

impl Attachment {
    pub fn pdf(filename: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content_type: "application/pdf".to_string(),
            data,
        }
    }
}

impl std::fmt::Debug for Attachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Attachment")
            .field("filename", &self.filename)
            .field("content_type", &self.content_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}

/// An email message to be sent
#[derive(Debug, Clone)]
pub struct Email {
    /// Sender email address
    pub from: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub subject: String,
    /// Plain text body (optional if html is provided)
    pub text: Option<String>,
    /// HTML body (optional if text is provided)
    pub html: Option<String>,
    pub attachments: Vec<Attachment>,
}

impl Email {
    /// Create a new email with the required fields
    pub fn new(from: impl Into<String>, to: impl Into<String>, subject: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: vec![to.into()],
            cc: Vec::new(),
            subject: subject.into(),
            text: None,
            html: None,
            attachments: Vec::new(),
        }
    }

    /// Add CC recipients
    pub fn cc_many(mut self, recipients: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.cc.extend(recipients.into_iter().map(Into::into));
        self
    }

    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.text = Some(body.into());
        self
    }

    pub fn html(mut self, body: impl Into<String>) -> Self {
        self.html = Some(body.into());
        self
    }

    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Validate the email has required fields
    pub fn validate(&self) -> Result<()> {
        if self.from.trim().is_empty() {
            return Err(AppError::bad_request("Email 'from' is required"));
        }
        if self.to.is_empty() {
            return Err(AppError::bad_request("Email 'to' is required"));
        }
        if self.subject.is_empty() {
            return Err(AppError::bad_request("Email 'subject' is required"));
        }
        if self.text.is_none() && self.html.is_none() {
            return Err(AppError::bad_request(
                "Email must have either 'text' or 'html' body",
            ));
        }
        Ok(())
    }
}

/// Email delivery backend.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send one email. Implementations bound the call with a timeout.
    async fn send(&self, email: &Email) -> Result<()>;

    /// Check if the mailer backend is healthy/connected
    fn is_healthy(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        let email = Email::new("billing@acme.test", "ana@client.test", "Proforma")
            .html("<p>Hi</p>")
            .cc_many(["ops@acme.test"])
            .attach(Attachment::pdf("PRO-1.pdf", b"%PDF-1.3".to_vec()));
        assert!(email.validate().is_ok());
        assert_eq!(email.cc, vec!["ops@acme.test"]);

        let no_body = Email::new("billing@acme.test", "ana@client.test", "Proforma");
        assert!(no_body.validate().is_err());

        let no_from = Email::new(" ", "ana@client.test", "Proforma").text("x");
        assert!(no_from.validate().is_err());
    }

    #[test]
    fn test_attachment_debug_omits_bytes() {
        let attachment = Attachment::pdf("a.pdf", vec![1, 2, 3]);
        let rendered = format!("{:?}", attachment);
        assert!(rendered.contains("bytes: 3"));
        assert!(rendered.contains("application/pdf"));
    }
}
