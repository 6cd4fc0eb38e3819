use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::collections::HashMap;

/// The main error type for the billing service
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Request timeout")]
    RequestTimeout,

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),

    #[error("Database error: {0}")]
    Database(String),
}

/// Error context for additional error information
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Unique error ID for tracking
    pub error_id: Option<String>,
    /// Additional error details
    pub details: Option<String>,
    /// Field-specific validation errors
    pub field_errors: HashMap<String, Vec<String>>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_error_id(mut self, id: impl Into<String>) -> Self {
        self.error_id = Some(id.into());
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.details = Some(detail.into());
        self
    }

    pub fn with_field_error(mut self, field: impl Into<String>, error: impl Into<String>) -> Self {
        self.field_errors
            .entry(field.into())
            .or_default()
            .push(error.into());
        self
    }
}

/// An [`AppError`] carrying an [`ErrorContext`] into the response body.
#[derive(Debug)]
pub struct ErrorWithContext {
    error: AppError,
    context: ErrorContext,
}

impl ErrorWithContext {
    pub fn new(error: AppError, context: ErrorContext) -> Self {
        Self { error, context }
    }

    pub fn error(&self) -> &AppError {
        &self.error
    }

    pub fn context(&self) -> &ErrorContext {
        &self.context
    }
}

impl std::fmt::Display for ErrorWithContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.error)?;
        if let Some(ref details) = self.context.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorWithContext {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

impl From<ErrorWithContext> for AppError {
    fn from(err: ErrorWithContext) -> Self {
        err.error
    }
}

impl From<AppError> for ErrorWithContext {
    fn from(error: AppError) -> Self {
        Self::new(error, ErrorContext::new())
    }
}

impl IntoResponse for ErrorWithContext {
    fn into_response(self) -> Response {
        self.error.into_response_with_context(Some(self.context), false)
    }
}

/// Full text of a server error whose body carries the generic message.
/// Read by the dev-mode response layer.
#[derive(Debug, Clone)]
pub(crate) struct ErrorDetail(pub String);

/// JSON body for error responses.
#[derive(Serialize)]
pub struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    field_errors: Option<HashMap<String, Vec<String>>>,
}

impl AppError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::Forbidden(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn service_unavailable(msg: impl Into<String>) -> Self {
        Self::ServiceUnavailable(msg.into())
    }

    pub fn with_context(self, context: ErrorContext) -> ErrorWithContext {
        ErrorWithContext::new(self, context)
    }

    /// Convert error to response, optionally with attached context.
    ///
    /// # Security
    ///
    /// Internal error details are only exposed when `dev_mode` is `true`.
    pub fn into_response_with_context(self, context: Option<ErrorContext>, dev_mode: bool) -> Response {
        let status = self.status_code();

        let error_msg = if dev_mode {
            self.to_string()
        } else {
            self.safe_message()
        };

        let mut response = ErrorResponse {
            error: error_msg,
            error_id: None,
            details: None,
            field_errors: None,
        };

        if let Some(context) = context {
            response.error_id = context.error_id;
            response.details = context.details;
            if !context.field_errors.is_empty() {
                response.field_errors = Some(context.field_errors);
            }
        }

        let error_id = response
            .error_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        response.error_id = Some(error_id.clone());

        if status.is_server_error() {
            tracing::error!(
                status = status.as_u16(),
                error_id = %error_id,
                error = %self,
                "Request failed"
            );
        } else {
            tracing::debug!(
                status = status.as_u16(),
                error_id = %error_id,
                error = %self,
                "Request rejected"
            );
        }

        let mut http = (status, Json(response)).into_response();
        if status.is_server_error() && !dev_mode {
            http.extensions_mut().insert(ErrorDetail(self.to_string()));
        }
        http
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) | Self::Anyhow(_) | Self::Database(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            Self::ServiceUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
        }
    }

    /// Client errors keep their message; server errors are replaced with a
    /// generic message (CWE-209).
    fn safe_message(&self) -> String {
        match self {
            Self::NotFound(msg) => format!("Not found: {}", msg),
            Self::BadRequest(msg) => format!("Bad request: {}", msg),
            Self::Unauthorized(msg) => format!("Unauthorized: {}", msg),
            Self::Forbidden(msg) => format!("Forbidden: {}", msg),
            Self::Conflict(msg) => format!("Conflict: {}", msg),
            Self::RequestTimeout => "Request timeout".to_string(),

            Self::Internal(_) | Self::Anyhow(_) => "Internal server error".to_string(),
            Self::ServiceUnavailable(_) => "Service unavailable".to_string(),
            Self::Database(_) => "Database error".to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.into_response_with_context(None, false)
    }
}

/// Result type alias used across the crate
pub type Result<T> = std::result::Result<T, AppError>;

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            AppError::BadRequest(format!("JSON error: {}", err))
        } else {
            AppError::Internal(format!("JSON serialization error: {}", err))
        }
    }
}

impl From<sea_orm::DbErr> for AppError {
    fn from(err: sea_orm::DbErr) -> Self {
        AppError::Database(err.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::RequestTimeout
        } else if err.is_connect() {
            AppError::ServiceUnavailable(format!("Connection error: {}", err))
        } else if let Some(status) = err.status() {
            match status.as_u16() {
                401 => AppError::Unauthorized("Upstream authentication failed".to_string()),
                403 => AppError::Forbidden("Upstream access denied".to_string()),
                404 => AppError::NotFound("Upstream resource not found".to_string()),
                503 => AppError::ServiceUnavailable("Upstream service unavailable".to_string()),
                _ => AppError::Internal(format!("Upstream error: {}", err)),
            }
        } else {
            AppError::Internal(format!("Request error: {}", err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(AppError::not_found("x").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::conflict("x").status_code(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::Database("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_safe_message_hides_server_details() {
        let err = AppError::internal("password=hunter2 leaked");
        assert_eq!(err.safe_message(), "Internal server error");

        let err = AppError::bad_request("billing_day out of range");
        assert_eq!(err.safe_message(), "Bad request: billing_day out of range");
    }

    #[test]
    fn test_error_with_context_display() {
        let error = AppError::bad_request("Validation failed")
            .with_context(ErrorContext::new().with_detail("billing_day must be 1-31"));
        assert_eq!(
            error.to_string(),
            "Bad request: Validation failed (billing_day must be 1-31)"
        );
    }

    #[tokio::test]
    async fn test_field_errors_are_serialized() {
        let response = AppError::bad_request("Validation failed")
            .with_context(
                ErrorContext::new()
                    .with_field_error("billing_day", "must be between 1 and 31")
                    .with_field_error("billing_day", "required"),
            )
            .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["field_errors"]["billing_day"].as_array().unwrap().len(), 2);
        assert!(body["error_id"].is_string());
    }
}
