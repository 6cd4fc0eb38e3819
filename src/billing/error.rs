//! Billing-specific error types.
//!
//! Messages of the pipeline variants end up in the ledger's
//! `error_message` column, so they are written for operators.

use std::fmt;

/// Billing-specific errors.
///
/// Converted to [`AppError`](crate::error::AppError) at the HTTP boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BillingError {
    // Lookup errors
    /// The company does not exist.
    CompanyNotFound { company_id: String },
    /// The workspace does not exist.
    WorkspaceNotFound { workspace_id: String },
    /// The billing item does not exist or belongs to another company.
    ItemNotFound { item_id: String },

    // Configuration errors, recorded as failed ledger rows
    /// The company has no subscription items.
    NoItemsConfigured,
    /// No contact is flagged to receive invoices.
    NoRecipients,
    /// The workspace has no billing sender email.
    SenderNotConfigured { workspace_id: String },
    /// Accounting is enabled but the company is not linked to a customer.
    AccountingNotLinked,
    /// Accounting is enabled but credentials are missing.
    AccountingCredentialsMissing,

    // External-call errors
    /// AdmCloud returned an error or could not be reached.
    AccountingApi {
        operation: String,
        message: String,
        http_status: Option<u16>,
    },
    /// Blob upload failed.
    Upload { message: String },
    /// Every recipient send failed.
    DeliveryFailed { attempted: usize },
    /// PDF generation failed.
    Render { message: String },

    // Ledger
    /// A sent row already exists for the period.
    LedgerConflict {
        company_id: String,
        month: u32,
        year: i32,
    },

    /// Invalid settings input.
    InvalidSettings { message: String },
    /// An unexpected internal error occurred.
    Internal { message: String },
}

impl fmt::Display for BillingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CompanyNotFound { company_id } => {
                write!(f, "Company not found: {}", company_id)
            }
            Self::WorkspaceNotFound { workspace_id } => {
                write!(f, "Workspace not found: {}", workspace_id)
            }
            Self::ItemNotFound { item_id } => {
                write!(f, "Billing item not found: {}", item_id)
            }
            Self::NoItemsConfigured => write!(f, "no subscription items configured"),
            Self::NoRecipients => write!(f, "no invoice recipients configured"),
            Self::SenderNotConfigured { workspace_id } => {
                write!(f, "billing sender email not configured for workspace {}", workspace_id)
            }
            Self::AccountingNotLinked => {
                write!(f, "company has no AdmCloud relationship id")
            }
            Self::AccountingCredentialsMissing => {
                write!(f, "AdmCloud is enabled but credentials are not configured")
            }
            Self::AccountingApi {
                operation,
                message,
                http_status,
            } => {
                write!(f, "AdmCloud error during '{}': {}", operation, message)?;
                if let Some(status) = http_status {
                    write!(f, " [HTTP {}]", status)?;
                }
                Ok(())
            }
            Self::Upload { message } => write!(f, "PDF upload failed: {}", message),
            Self::DeliveryFailed { .. } => write!(f, "failed to send to all recipients"),
            Self::Render { message } => write!(f, "PDF rendering failed: {}", message),
            Self::LedgerConflict {
                company_id,
                month,
                year,
            } => write!(
                f,
                "already billed by a concurrent run ({} {:04}-{:02})",
                company_id, year, month
            ),
            Self::InvalidSettings { message } => write!(f, "Invalid billing settings: {}", message),
            Self::Internal { message } => write!(f, "Internal billing error: {}", message),
        }
    }
}

impl std::error::Error for BillingError {}

/// Result type of pipeline steps.
pub type BillingResult<T> = std::result::Result<T, BillingError>;

impl From<BillingError> for crate::error::AppError {
    fn from(err: BillingError) -> Self {
        use crate::error::AppError;

        match &err {
            BillingError::CompanyNotFound { .. }
            | BillingError::WorkspaceNotFound { .. }
            | BillingError::ItemNotFound { .. } => AppError::NotFound(err.to_string()),

            BillingError::NoItemsConfigured
            | BillingError::NoRecipients
            | BillingError::SenderNotConfigured { .. }
            | BillingError::AccountingNotLinked
            | BillingError::AccountingCredentialsMissing
            | BillingError::InvalidSettings { .. } => AppError::BadRequest(err.to_string()),

            BillingError::LedgerConflict { .. } => AppError::Conflict(err.to_string()),

            BillingError::AccountingApi { .. }
            | BillingError::Upload { .. }
            | BillingError::DeliveryFailed { .. } => AppError::ServiceUnavailable(err.to_string()),

            BillingError::Render { .. } | BillingError::Internal { .. } => {
                AppError::Internal(err.to_string())
            }
        }
    }
}

impl From<BillingError> for crate::error::ErrorWithContext {
    fn from(err: BillingError) -> Self {
        crate::error::AppError::from(err).into()
    }
}

impl From<crate::error::AppError> for BillingError {
    fn from(err: crate::error::AppError) -> Self {
        Self::Internal {
            message: err.to_string(),
        }
    }
}

impl BillingError {
    /// Check if this error reflects tenant configuration rather than a fault.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::NoItemsConfigured
                | Self::NoRecipients
                | Self::SenderNotConfigured { .. }
                | Self::AccountingNotLinked
                | Self::AccountingCredentialsMissing
        )
    }

    /// Check if a retry of the same call could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::AccountingApi { http_status, .. } => {
                matches!(http_status, Some(408) | Some(429) | Some(500..=599) | None)
            }
            Self::Upload { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;

    #[test]
    fn test_ledger_messages() {
        assert_eq!(
            BillingError::NoRecipients.to_string(),
            "no invoice recipients configured"
        );
        assert_eq!(
            BillingError::DeliveryFailed { attempted: 3 }.to_string(),
            "failed to send to all recipients"
        );
        assert_eq!(
            BillingError::NoItemsConfigured.to_string(),
            "no subscription items configured"
        );
        assert_eq!(
            BillingError::AccountingNotLinked.to_string(),
            "company has no AdmCloud relationship id"
        );
    }

    #[test]
    fn test_accounting_error_display() {
        let err = BillingError::AccountingApi {
            operation: "create_quote".into(),
            message: "Invalid item".into(),
            http_status: Some(400),
        };
        assert_eq!(
            err.to_string(),
            "AdmCloud error during 'create_quote': Invalid item [HTTP 400]"
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_classification() {
        assert!(BillingError::NoRecipients.is_configuration());
        assert!(!BillingError::Upload { message: "x".into() }.is_configuration());
        assert!(
            BillingError::AccountingApi {
                operation: "get_customer".into(),
                message: "busy".into(),
                http_status: Some(503),
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_convert_to_app_error() {
        let err: AppError = BillingError::CompanyNotFound {
            company_id: "c1".into(),
        }
        .into();
        assert!(matches!(err, AppError::NotFound(_)));

        let err: AppError = BillingError::NoItemsConfigured.into();
        assert!(matches!(err, AppError::BadRequest(_)));

        let err: AppError = BillingError::LedgerConflict {
            company_id: "c1".into(),
            month: 3,
            year: 2024,
        }
        .into();
        assert!(matches!(err, AppError::Conflict(_)));
    }
}
