use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::auth::CronAuth;
use crate::billing::admcloud::AdmCloudClientConfig;
use crate::database::DatabaseConfig;
use crate::email::SmtpConfig;
use crate::error::{AppError, Result};
use crate::storage::BlobConfig;
use crate::utils::{get_env_flag, get_env_parsed, get_env_with_prefix};

/// Main configuration for the billing service
#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    /// Expose internal error details in responses
    pub dev_mode: bool,
    pub database: DatabaseConfig,
    pub cron_auth: CronAuth,
    pub session: SessionConfig,
    /// `None` falls back to the console mailer
    pub smtp: Option<SmtpConfig>,
    pub blob: BlobConfig,
    pub admcloud: AdmCloudClientConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Maximum request body size in bytes (default: 2MB)
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
    /// Whole-request timeout. The batch route walks every due company
    /// sequentially, so this is generous by default.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_json")]
    pub json: bool,
}

/// Session token verification for the interactive endpoints.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// HS256 signing secret shared with the CRM front end
    pub jwt_secret: SecretString,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_size: default_max_body_size(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: default_json(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_json() -> bool {
    false
}

fn default_max_body_size() -> usize {
    2 * 1024 * 1024
}

fn default_request_timeout() -> u64 {
    900
}

impl ServerConfig {
    pub fn addr(&self) -> std::result::Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.host, self.port).parse()
    }
}

/// Builder for Config with environment variable support
#[must_use = "builder does nothing until you call build()"]
pub struct ConfigBuilder {
    server: ServerConfig,
    logging: LoggingConfig,
    dev_mode: bool,
    database: DatabaseConfig,
    cron_secret: Option<SecretString>,
    cron_auth_disabled: bool,
    session_secret: Option<SecretString>,
    session_issuer: Option<String>,
    session_audience: Option<String>,
    smtp: Option<SmtpConfig>,
    blob: BlobConfig,
    admcloud: AdmCloudClientConfig,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            server: ServerConfig::default(),
            logging: LoggingConfig::default(),
            dev_mode: false,
            database: DatabaseConfig::default(),
            cron_secret: None,
            cron_auth_disabled: false,
            session_secret: None,
            session_issuer: None,
            session_audience: None,
            smtp: None,
            blob: BlobConfig::default(),
            admcloud: AdmCloudClientConfig::default(),
        }
    }

    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.server.host = host.into();
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.server.port = port;
        self
    }

    pub fn with_max_body_size(mut self, max_body_size: usize) -> Self {
        self.server.max_body_size = max_body_size;
        self
    }

    pub fn with_request_timeout(mut self, seconds: u64) -> Self {
        self.server.request_timeout_seconds = seconds;
        self
    }

    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.logging.level = level.into();
        self
    }

    pub fn with_json_logging(mut self, enabled: bool) -> Self {
        self.logging.json = enabled;
        self
    }

    pub fn with_dev_mode(mut self, enabled: bool) -> Self {
        self.dev_mode = enabled;
        self
    }

    pub fn with_database(mut self, database: DatabaseConfig) -> Self {
        self.database = database;
        self
    }

    pub fn with_cron_secret(mut self, secret: impl Into<String>) -> Self {
        self.cron_secret = Some(SecretString::from(secret.into()));
        self
    }

    /// Let the batch trigger through without a bearer secret.
    pub fn with_cron_auth_disabled(mut self, disabled: bool) -> Self {
        self.cron_auth_disabled = disabled;
        self
    }

    pub fn with_session_secret(mut self, secret: impl Into<String>) -> Self {
        self.session_secret = Some(SecretString::from(secret.into()));
        self
    }

    pub fn with_smtp(mut self, smtp: SmtpConfig) -> Self {
        self.smtp = Some(smtp);
        self
    }

    pub fn with_blob(mut self, blob: BlobConfig) -> Self {
        self.blob = blob;
        self
    }

    pub fn with_admcloud(mut self, admcloud: AdmCloudClientConfig) -> Self {
        self.admcloud = admcloud;
        self
    }

    /// Load configuration from environment variables with the `CRM_BILLING_` prefix
    pub fn from_env(mut self) -> Self {
        if let Some(host) = get_env_with_prefix("HOST") {
            self.server.host = host;
        }
        if let Some(port) = get_env_parsed("PORT") {
            self.server.port = port;
        }
        if let Some(size) = get_env_parsed("MAX_BODY_SIZE") {
            self.server.max_body_size = size;
        }
        if let Some(seconds) = get_env_parsed("REQUEST_TIMEOUT_SECONDS") {
            self.server.request_timeout_seconds = seconds;
        }
        if let Some(level) = get_env_with_prefix("LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Some(json) = get_env_flag("LOG_JSON") {
            self.logging.json = json;
        }
        if let Some(dev) = get_env_flag("DEV_MODE") {
            self.dev_mode = dev;
        }

        self.database = self.database.with_env_overrides();

        if let Some(secret) = get_env_with_prefix("CRON_SECRET") {
            self.cron_secret = Some(SecretString::from(secret));
        }
        if let Some(disabled) = get_env_flag("CRON_AUTH_DISABLED") {
            self.cron_auth_disabled = disabled;
        }

        if let Some(secret) = get_env_with_prefix("SESSION_JWT_SECRET") {
            self.session_secret = Some(SecretString::from(secret));
        }
        if let Some(issuer) = get_env_with_prefix("SESSION_JWT_ISSUER") {
            self.session_issuer = Some(issuer);
        }
        if let Some(audience) = get_env_with_prefix("SESSION_JWT_AUDIENCE") {
            self.session_audience = Some(audience);
        }

        if let Some(smtp) = SmtpConfig::from_env() {
            self.smtp = Some(smtp);
        }
        self.blob = self.blob.with_env_overrides();
        self.admcloud = self.admcloud.with_env_overrides();

        self
    }

    /// Build the configuration, validating all settings
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the server address or log level is invalid
    /// - neither a cron secret nor the explicit auth-disabled opt-in is set
    /// - the session secret is missing
    pub fn build(self) -> Result<Config> {
        self.server.addr().map_err(|e| {
            AppError::bad_request(format!(
                "Invalid server address {}:{} - {}",
                self.server.host, self.server.port, e
            ))
        })?;

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(AppError::bad_request(format!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            )));
        }

        if self.server.port == 0 {
            return Err(AppError::bad_request("Server port must be greater than 0"));
        }

        if self.server.max_body_size == 0 {
            return Err(AppError::bad_request(
                "Maximum body size must be greater than 0",
            ));
        }

        if self.server.request_timeout_seconds == 0 {
            return Err(AppError::bad_request(
                "Request timeout must be greater than 0",
            ));
        }

        if self.admcloud.timeout_seconds == 0 {
            return Err(AppError::bad_request(
                "AdmCloud timeout must be greater than 0",
            ));
        }

        let cron_auth = CronAuth::resolve(self.cron_secret, self.cron_auth_disabled)?;

        let jwt_secret = self.session_secret.ok_or_else(|| {
            AppError::bad_request("SESSION_JWT_SECRET must be set")
        })?;

        Ok(Config {
            server: self.server,
            logging: self.logging,
            dev_mode: self.dev_mode,
            database: self.database,
            cron_auth,
            session: SessionConfig {
                jwt_secret,
                issuer: self.session_issuer,
                audience: self.session_audience,
            },
            smtp: self.smtp,
            blob: self.blob,
            admcloud: self.admcloud,
        })
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> ConfigBuilder {
        ConfigBuilder::new().with_session_secret("session-secret")
    }

    #[test]
    fn test_missing_cron_secret_is_rejected() {
        let err = base().build().unwrap_err();
        assert!(err.to_string().contains("CRON_SECRET"));
    }

    #[test]
    fn test_explicit_auth_disabled_mode() {
        let config = base().with_cron_auth_disabled(true).build().unwrap();
        assert!(config.cron_auth.is_disabled());
    }

    #[test]
    fn test_secret_wins_over_disabled_flag() {
        let config = base()
            .with_cron_secret("s3cret")
            .with_cron_auth_disabled(true)
            .build()
            .unwrap();
        assert!(!config.cron_auth.is_disabled());
    }

    #[test]
    fn test_missing_session_secret_is_rejected() {
        let err = ConfigBuilder::new()
            .with_cron_secret("s3cret")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("SESSION_JWT_SECRET"));
    }

    #[test]
    fn test_invalid_log_level() {
        let err = base()
            .with_cron_secret("s3cret")
            .with_log_level("loud")
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("Invalid log level"));
    }

    #[test]
    fn test_debug_does_not_leak_secrets() {
        let config = base().with_cron_secret("very-secret-value").build().unwrap();
        let rendered = format!("{:?}", config);
        assert!(!rendered.contains("very-secret-value"));
        assert!(!rendered.contains("session-secret"));
    }

    #[test]
    fn test_server_addr() {
        let config = base()
            .with_cron_secret("s3cret")
            .with_host("127.0.0.1")
            .with_port(9000)
            .build()
            .unwrap();
        assert_eq!(config.server.addr().unwrap().port(), 9000);
    }
}
