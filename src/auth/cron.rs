//! Authorization of the scheduler calling the daily batch.

use crate::app::AppContext;
use crate::auth::TokenExtractor;
use crate::error::{AppError, Result};
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use secrecy::{ExposeSecret, SecretString};
use subtle::ConstantTimeEq;

/// How the batch trigger is authorized.
///
/// There is no implicit open mode: an unset secret is rejected at startup
/// unless [`CronAuth::Disabled`] was requested explicitly.
#[derive(Clone)]
pub enum CronAuth {
    /// Requests must carry `Authorization: Bearer <secret>`
    Secret(SecretString),
    /// Every request is let through
    Disabled,
}

impl CronAuth {
    /// Pick the mode from configuration. A non-empty secret always wins.
    pub fn resolve(secret: Option<SecretString>, disabled: bool) -> Result<Self> {
        match secret {
            Some(secret) if !secret.expose_secret().trim().is_empty() => Ok(Self::Secret(secret)),
            _ if disabled => Ok(Self::Disabled),
            _ => Err(AppError::bad_request(
                "CRON_SECRET must be set, or CRON_AUTH_DISABLED=true to run the batch trigger without auth",
            )),
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, Self::Disabled)
    }

    /// Check a presented bearer token.
    pub fn verify(&self, presented: Option<&str>) -> Result<()> {
        let Self::Secret(secret) = self else {
            return Ok(());
        };

        let presented = presented.ok_or_else(|| AppError::unauthorized("Unauthorized"))?;
        let expected = secret.expose_secret().as_bytes();

        if bool::from(presented.as_bytes().ct_eq(expected)) {
            Ok(())
        } else {
            Err(AppError::unauthorized("Unauthorized"))
        }
    }
}

impl std::fmt::Debug for CronAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Secret(_) => f.write_str("CronAuth::Secret([REDACTED])"),
            Self::Disabled => f.write_str("CronAuth::Disabled"),
        }
    }
}

/// Extractor guarding the batch trigger.
#[derive(Debug, Clone, Copy)]
pub struct CronAuthorized;

impl FromRequestParts<AppContext> for CronAuthorized {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> std::result::Result<Self, Self::Rejection> {
        if state.cron_auth.is_disabled() {
            return Ok(Self);
        }

        let token = TokenExtractor::from_header(parts).ok();
        state.cron_auth.verify(token.as_deref()).map_err(|err| {
            tracing::warn!(path = %parts.uri.path(), "Rejected batch trigger with bad credentials");
            err
        })?;

        Ok(Self)
    }
}
