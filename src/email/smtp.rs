//! SMTP mailer using lettre

use crate::error::{AppError, Result};
use crate::traits::mailer::{Email, Mailer};
use crate::utils::{get_env_parsed, get_env_with_prefix};
use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::{Attachment, Mailbox, MultiPart, SinglePart, header::ContentType},
    transport::smtp::authentication::Credentials,
};
use secrecy::{ExposeSecret, SecretString};
use std::time::Duration;

/// SMTP configuration
#[derive(Clone)]
pub struct SmtpConfig {
    pub host: String,
    /// Default 587 (STARTTLS)
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    pub starttls: bool,
    /// Socket timeout per send
    pub timeout_seconds: u64,
}

impl SmtpConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 587,
            username: None,
            password: None,
            starttls: true,
            timeout_seconds: 30,
        }
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(SecretString::from(password.into()));
        self
    }

    /// Use implicit TLS instead of STARTTLS
    pub fn no_starttls(mut self) -> Self {
        self.starttls = false;
        self
    }

    /// Read `SMTP_HOST`, `SMTP_PORT`, `SMTP_USERNAME`, `SMTP_PASSWORD`,
    /// `SMTP_STARTTLS` and `SMTP_TIMEOUT_SECONDS`.
    ///
    /// Returns `None` when no host is configured.
    pub fn from_env() -> Option<Self> {
        let mut config = Self::new(get_env_with_prefix("SMTP_HOST")?);

        if let Some(port) = get_env_parsed("SMTP_PORT") {
            config.port = port;
        }
        config.username = get_env_with_prefix("SMTP_USERNAME");
        config.password = get_env_with_prefix("SMTP_PASSWORD").map(SecretString::from);
        if let Some(starttls) = get_env_with_prefix("SMTP_STARTTLS") {
            config.starttls = starttls != "false" && starttls != "0";
        }
        if let Some(timeout) = get_env_parsed("SMTP_TIMEOUT_SECONDS") {
            config.timeout_seconds = timeout;
        }

        Some(config)
    }
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("starttls", &self.starttls)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish()
    }
}

/// SMTP mailer using lettre
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    config: SmtpConfig,
}

impl SmtpMailer {
    pub fn new(config: SmtpConfig) -> Result<Self> {
        let builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
        }
        .map_err(|e| AppError::internal(format!("Failed to create SMTP transport: {}", e)))?;

        let mut builder = builder
            .port(config.port)
            .timeout(Some(Duration::from_secs(config.timeout_seconds)));

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(
                username.clone(),
                password.expose_secret().to_string(),
            ));
        }

        Ok(Self {
            transport: builder.build(),
            config,
        })
    }

    fn build_message(&self, email: &Email) -> Result<Message> {
        let from: Mailbox = email
            .from
            .parse()
            .map_err(|e| AppError::bad_request(format!("Invalid 'from' address: {}", e)))?;

        let mut builder = Message::builder().from(from).subject(&email.subject);

        for to in &email.to {
            builder = builder.to(parse_mailbox("to", to)?);
        }
        for cc in &email.cc {
            builder = builder.cc(parse_mailbox("cc", cc)?);
        }

        let mut body = match (&email.text, &email.html) {
            (Some(text), Some(html)) => MultiPart::mixed()
                .multipart(MultiPart::alternative_plain_html(text.clone(), html.clone())),
            (Some(text), None) => MultiPart::mixed().singlepart(SinglePart::plain(text.clone())),
            (None, Some(html)) => MultiPart::mixed().singlepart(SinglePart::html(html.clone())),
            (None, None) => {
                return Err(AppError::bad_request(
                    "Email must have either text or HTML body",
                ));
            }
        };

        for attachment in &email.attachments {
            let content_type = ContentType::parse(&attachment.content_type).map_err(|e| {
                AppError::bad_request(format!(
                    "Invalid attachment content type '{}': {}",
                    attachment.content_type, e
                ))
            })?;
            body = body.singlepart(
                Attachment::new(attachment.filename.clone())
                    .body(attachment.data.clone(), content_type),
            );
        }

        builder
            .multipart(body)
            .map_err(|e| AppError::internal(format!("Failed to build email: {}", e)))
    }
}

fn parse_mailbox(field: &str, address: &str) -> Result<Mailbox> {
    address.parse().map_err(|e| {
        AppError::bad_request(format!("Invalid '{}' address '{}': {}", field, address, e))
    })
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &Email) -> Result<()> {
        email.validate()?;
        let message = self.build_message(email)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| AppError::service_unavailable(format!("Failed to send email: {}", e)))?;

        Ok(())
    }

    fn is_healthy(&self) -> bool {
        true
    }
}

impl std::fmt::Debug for SmtpMailer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpMailer")
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::mailer::Attachment as PdfAttachment;

    fn mailer() -> SmtpMailer {
        SmtpMailer::new(SmtpConfig::new("localhost").credentials("user", "hunter2")).unwrap()
    }

    #[test]
    fn test_message_carries_pdf_and_cc() {
        let email = Email::new("billing@acme.test", "ana@client.test", "Proforma PRO-1")
            .html("<p>Attached</p>")
            .cc_many(["ops@acme.test"])
            .attach(PdfAttachment::pdf("PRO-1.pdf", b"%PDF-1.3 test".to_vec()));

        let raw = String::from_utf8(mailer().build_message(&email).unwrap().formatted()).unwrap();
        assert!(raw.contains("Cc: ops@acme.test"));
        assert!(raw.contains("application/pdf"));
        assert!(raw.contains("PRO-1.pdf"));
    }

    #[test]
    fn test_invalid_recipient_rejected() {
        let email = Email::new("billing@acme.test", "not an address", "Proforma").text("x");
        assert!(mailer().build_message(&email).is_err());
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = SmtpConfig::new("smtp.acme.test").credentials("user", "hunter2");
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
