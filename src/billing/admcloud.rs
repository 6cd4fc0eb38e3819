//! Live AdmCloud client.
//!
//! REST over reqwest with per-call timeout, bounded retries with
//! exponential backoff and jitter, and credentials that never reach logs
//! or `Debug` output.

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, StatusCode};
use secrecy::ExposeSecret;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::accounting::{
    AccountingClient, AccountingClientFactory, AccountingCustomer, CreatedQuote, QuoteRequest,
};
use super::error::{BillingError, BillingResult};
use super::types::AdmCloudCredentials;
use crate::utils::{get_env_parsed, get_env_with_prefix};

const DEFAULT_BASE_URL: &str = "https://api.admcloud.net/api";

// ============================================================================
// Configuration
// ============================================================================

/// Transport settings shared by every workspace's client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmCloudClientConfig {
    pub base_url: String,
    /// Maximum number of retry attempts for transient failures.
    pub max_retries: u32,
    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    pub max_delay_ms: u64,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for AdmCloudClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            max_retries: 3,
            base_delay_ms: 500,
            max_delay_ms: 10_000,
            timeout_seconds: 30,
        }
    }
}

impl AdmCloudClientConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    #[must_use]
    pub fn base_delay_ms(mut self, ms: u64) -> Self {
        self.base_delay_ms = ms;
        self
    }

    #[must_use]
    pub fn timeout_seconds(mut self, seconds: u64) -> Self {
        self.timeout_seconds = seconds;
        self
    }

    /// Apply `ADMCLOUD_*` overrides from the environment
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(url) = get_env_with_prefix("ADMCLOUD_BASE_URL") {
            self.base_url = url;
        }
        if let Some(seconds) = get_env_parsed("ADMCLOUD_TIMEOUT_SECONDS") {
            self.timeout_seconds = seconds;
        }
        if let Some(retries) = get_env_parsed("ADMCLOUD_MAX_RETRIES") {
            self.max_retries = retries;
        }
        self
    }
}

// ============================================================================
// Factory and client
// ============================================================================

/// Creates per-workspace clients sharing one connection pool.
#[derive(Debug, Clone)]
pub struct AdmCloudFactory {
    http: reqwest::Client,
    config: AdmCloudClientConfig,
}

impl AdmCloudFactory {
    pub fn new(config: AdmCloudClientConfig) -> BillingResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| BillingError::Internal {
                message: format!("Failed to build HTTP client: {}", e),
            })?;
        Ok(Self { http, config })
    }
}

impl AccountingClientFactory for AdmCloudFactory {
    fn connect(&self, credentials: &AdmCloudCredentials) -> BillingResult<Box<dyn AccountingClient>> {
        Ok(Box::new(AdmCloudClient {
            http: self.http.clone(),
            config: self.config.clone(),
            credentials: credentials.clone(),
        }))
    }
}

/// AdmCloud client bound to one set of credentials.
pub struct AdmCloudClient {
    http: reqwest::Client,
    config: AdmCloudClientConfig,
    credentials: AdmCloudCredentials,
}

// Debug implementation that doesn't expose credentials
impl std::fmt::Debug for AdmCloudClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmCloudClient")
            .field("base_url", &self.config.base_url)
            .field("app_id", &self.credentials.app_id)
            .finish_non_exhaustive()
    }
}

/// Response envelope used by the AdmCloud API.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default = "default_success")]
    success: bool,
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
}

fn default_success() -> bool {
    true
}

impl AdmCloudClient {
    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), path)
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, self.url(path))
            .query(&[
                ("appid", self.credentials.app_id.as_str()),
                ("company", self.credentials.company.as_str()),
            ])
            .basic_auth(
                &self.credentials.username,
                Some(self.credentials.password.expose_secret()),
            )
    }

    async fn call<T: DeserializeOwned + Send>(
        &self,
        operation: &str,
        replay: Replay,
        build: impl Fn() -> RequestBuilder,
    ) -> BillingResult<T> {
        with_retry(&self.config, operation, replay, || {
            let request = build();
            async move {
                let response = request.send().await.map_err(|e| transport_error(operation, e))?;
                decode(operation, response).await
            }
        })
        .await
    }
}

#[async_trait]
impl AccountingClient for AdmCloudClient {
    async fn get_customer(&self, relationship_id: &str) -> BillingResult<AccountingCustomer> {
        let path = format!("Customers/{}", relationship_id);
        self.call("get_customer", Replay::Safe, || self.request(Method::GET, &path))
            .await
    }

    /// AdmCloud has no idempotency key, so a quote POST that may have been
    /// processed is never sent again.
    async fn create_quote(&self, quote: &QuoteRequest) -> BillingResult<CreatedQuote> {
        self.call("create_quote", Replay::OnlyIfUnprocessed, || {
            self.request(Method::POST, "Quotes").json(quote)
        })
        .await
    }
}

async fn decode<T: DeserializeOwned>(
    operation: &str,
    response: reqwest::Response,
) -> Result<T, Failure> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(operation, e))?;

    if !status.is_success() {
        return Err(Failure::processed(BillingError::AccountingApi {
            operation: operation.to_string(),
            message: error_message(&body, status),
            http_status: Some(status.as_u16()),
        }));
    }

    let envelope: Envelope<T> = serde_json::from_str(&body).map_err(|e| {
        Failure::processed(BillingError::AccountingApi {
            operation: operation.to_string(),
            message: format!("Unexpected response: {}", e),
            http_status: Some(status.as_u16()),
        })
    })?;

    match (envelope.success, envelope.data) {
        (true, Some(data)) => Ok(data),
        (_, _) => Err(Failure::processed(BillingError::AccountingApi {
            operation: operation.to_string(),
            message: envelope
                .message
                .unwrap_or_else(|| "Request was not successful".to_string()),
            http_status: Some(status.as_u16()),
        })),
    }
}

fn error_message(body: &str, status: StatusCode) -> String {
    serde_json::from_str::<Envelope<serde_json::Value>>(body)
        .ok()
        .and_then(|e| e.message)
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("Request failed")
                .to_string()
        })
}

fn transport_error(operation: &str, err: reqwest::Error) -> Failure {
    let http_status = if err.is_timeout() {
        Some(408)
    } else {
        err.status().map(|s| s.as_u16())
    };
    Failure {
        // A failed connect means nothing was written to the socket
        reached_server: !err.is_connect(),
        error: BillingError::AccountingApi {
            operation: operation.to_string(),
            message: err.without_url().to_string(),
            http_status,
        },
    }
}

// ============================================================================
// Retry Logic
// ============================================================================

/// Whether a failed call may be sent again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Replay {
    /// Reads: every transient failure is retried.
    Safe,
    /// Writes: retried only when AdmCloud cannot have processed the request.
    OnlyIfUnprocessed,
}

/// A failed attempt, and whether the request may have reached AdmCloud.
#[derive(Debug)]
struct Failure {
    error: BillingError,
    reached_server: bool,
}

impl Failure {
    fn processed(error: BillingError) -> Self {
        Self {
            error,
            reached_server: true,
        }
    }

    fn may_retry(&self, replay: Replay) -> bool {
        if !self.error.is_retryable() {
            return false;
        }
        match replay {
            Replay::Safe => true,
            // 429 is refused before any processing
            Replay::OnlyIfUnprocessed => {
                !self.reached_server
                    || matches!(
                        self.error,
                        BillingError::AccountingApi {
                            http_status: Some(429),
                            ..
                        }
                    )
            }
        }
    }
}

/// Execute an async operation with retry logic and timeout.
///
/// Retries on:
/// - HTTP 429 (Rate Limited)
/// - HTTP 5xx (Server Errors), reads only
/// - Timeouts, reads only
/// - Connection failures
async fn with_retry<T, F, Fut>(
    config: &AdmCloudClientConfig,
    operation: &str,
    replay: Replay,
    operation_fn: F,
) -> BillingResult<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, Failure>>,
{
    let timeout_duration = Duration::from_secs(config.timeout_seconds);
    let mut attempts = 0;

    loop {
        let result = tokio::time::timeout(timeout_duration, operation_fn()).await;

        let failure = match result {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(failure)) => failure,
            Err(_timeout) => Failure::processed(BillingError::AccountingApi {
                operation: operation.to_string(),
                message: format!("Request timed out after {} seconds", config.timeout_seconds),
                http_status: Some(408),
            }),
        };

        if !failure.may_retry(replay) || attempts >= config.max_retries {
            if replay == Replay::OnlyIfUnprocessed && failure.reached_server && failure.error.is_retryable() {
                tracing::warn!(
                    target: "crm_billing::admcloud",
                    operation = operation,
                    error = %failure.error,
                    "AdmCloud write failed after the request was sent; not retrying"
                );
            }
            return Err(failure.error);
        }

        let delay = calculate_backoff_delay(attempts, config.base_delay_ms, config.max_delay_ms);
        tracing::warn!(
            target: "crm_billing::admcloud",
            operation = operation,
            attempt = attempts + 1,
            delay_ms = delay.as_millis() as u64,
            error = %failure.error,
            "Retrying AdmCloud call after transient error"
        );
        tokio::time::sleep(delay).await;
        attempts += 1;
    }
}

/// Calculate backoff delay with exponential backoff and jitter.
#[inline]
fn calculate_backoff_delay(attempt: u32, base_ms: u64, max_ms: u64) -> Duration {
    let delay_ms = base_ms.saturating_mul(2_u64.saturating_pow(attempt));
    let delay_ms = delay_ms.min(max_ms);

    // Jitter of 0-25% of the delay
    let jitter = if delay_ms > 0 {
        fastrand::u64(0..=delay_ms / 4)
    } else {
        0
    };
    Duration::from_millis(delay_ms.saturating_add(jitter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn credentials() -> AdmCloudCredentials {
        AdmCloudCredentials {
            app_id: "app-1".into(),
            company: "co-1".into(),
            username: "api-user".into(),
            password: SecretString::from("hunter2".to_string()),
        }
    }

    fn api_failure(operation: &str, status: u16) -> Failure {
        Failure::processed(BillingError::AccountingApi {
            operation: operation.into(),
            message: "upstream".into(),
            http_status: Some(status),
        })
    }

    #[test]
    fn test_backoff_is_bounded() {
        for attempt in 0..10 {
            let delay = calculate_backoff_delay(attempt, 500, 10_000);
            assert!(delay >= Duration::from_millis(500.min(10_000)));
            assert!(delay <= Duration::from_millis(12_500));
        }
        assert_eq!(calculate_backoff_delay(3, 0, 100), Duration::ZERO);
    }

    #[test]
    fn test_debug_hides_credentials() {
        let factory = AdmCloudFactory::new(AdmCloudClientConfig::default()).unwrap();
        let client = AdmCloudClient {
            http: factory.http.clone(),
            config: factory.config.clone(),
            credentials: credentials(),
        };
        let rendered = format!("{:?}", client);
        assert!(!rendered.contains("hunter2"));
        assert!(!rendered.contains("api-user"));
    }

    #[test]
    fn test_url_join() {
        let factory = AdmCloudFactory::new(
            AdmCloudClientConfig::default().base_url("http://localhost:9000/api/"),
        )
        .unwrap();
        let client = AdmCloudClient {
            http: factory.http.clone(),
            config: factory.config.clone(),
            credentials: credentials(),
        };
        assert_eq!(client.url("Quotes"), "http://localhost:9000/api/Quotes");
    }

    #[test]
    fn test_error_message_prefers_envelope() {
        assert_eq!(
            error_message(r#"{"success":false,"message":"Invalid item"}"#, StatusCode::BAD_REQUEST),
            "Invalid item"
        );
        assert_eq!(error_message("<html>", StatusCode::BAD_GATEWAY), "Bad Gateway");
    }

    #[tokio::test]
    async fn test_retry_stops_on_client_error() {
        let config = AdmCloudClientConfig::default().base_delay_ms(1);
        let attempts = Arc::new(AtomicU32::new(0));

        let result: BillingResult<()> = with_retry(&config, "create_quote", Replay::Safe, || {
            let attempts = attempts.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(api_failure("create_quote", 400))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_recovers_from_server_error() {
        let config = AdmCloudClientConfig::default().base_delay_ms(1);
        let attempts = Arc::new(AtomicU32::new(0));

        let result = with_retry(&config, "get_customer", Replay::Safe, || {
            let attempts = attempts.clone();
            async move {
                if attempts.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(api_failure("get_customer", 503))
                } else {
                    Ok(7)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_gives_up_after_max_retries() {
        let config = AdmCloudClientConfig::default()
            .base_delay_ms(1)
            .max_retries(2);
        let attempts = Arc::new(AtomicU32::new(0));

        let result: BillingResult<()> = with_retry(&config, "get_customer", Replay::Safe, || {
            let attempts = attempts.clone();
            async move {
                attempts.fetch_add(1, Ordering::SeqCst);
                Err(api_failure("get_customer", 429))
            }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_writes_retry_only_unprocessed_failures() {
        let write = Replay::OnlyIfUnprocessed;

        assert!(!api_failure("create_quote", 503).may_retry(write));
        assert!(!api_failure("create_quote", 408).may_retry(write));
        assert!(api_failure("create_quote", 429).may_retry(write));

        let refused = Failure {
            error: BillingError::AccountingApi {
                operation: "create_quote".into(),
                message: "connection refused".into(),
                http_status: None,
            },
            reached_server: false,
        };
        assert!(refused.may_retry(write));

        assert!(api_failure("get_customer", 503).may_retry(Replay::Safe));
        assert!(!api_failure("get_customer", 404).may_retry(Replay::Safe));
    }

    #[tokio::test]
    async fn test_write_is_not_repeated_after_server_error() {
        let config = AdmCloudClientConfig::default()
            .base_delay_ms(1)
            .max_retries(3);
        let attempts = Arc::new(AtomicU32::new(0));

        let result: BillingResult<()> =
            with_retry(&config, "create_quote", Replay::OnlyIfUnprocessed, || {
                let attempts = attempts.clone();
                async move {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    Err(api_failure("create_quote", 502))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }
}
