//! Operator sessions issued by the CRM front end.
//!
//! The front end signs HS256 JWTs with a shared secret; this service only
//! verifies them.

use crate::app::AppContext;
use crate::auth::TokenExtractor;
use crate::config::SessionConfig;
use crate::error::{AppError, Result};
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};

/// Claims carried by a session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    /// User id
    pub sub: String,
    pub exp: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Restricts the session to one tenant when present
    #[serde(default, rename = "workspaceId", skip_serializing_if = "Option::is_none")]
    pub workspace_id: Option<String>,
}

impl SessionClaims {
    /// Check that the session may act on a workspace.
    pub fn ensure_workspace(&self, workspace_id: &str) -> Result<()> {
        match self.workspace_id.as_deref() {
            Some(own) if own != workspace_id => Err(AppError::forbidden(
                "Session is not allowed to access this workspace",
            )),
            _ => Ok(()),
        }
    }
}

/// HS256 verifier for session tokens.
#[derive(Clone)]
pub struct SessionVerifier {
    key: DecodingKey,
    validation: Validation,
}

impl SessionVerifier {
    pub fn new(config: &SessionConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);

        if let Some(issuer) = &config.issuer {
            validation.set_issuer(&[issuer.as_str()]);
        }
        match &config.audience {
            Some(audience) => validation.set_audience(&[audience.as_str()]),
            None => validation.validate_aud = false,
        }

        Self {
            key: DecodingKey::from_secret(config.jwt_secret.expose_secret().as_bytes()),
            validation,
        }
    }

    pub fn verify(&self, token: &str) -> Result<SessionClaims> {
        decode::<SessionClaims>(token, &self.key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "Session token rejected");
                AppError::unauthorized("Invalid or expired session")
            })
    }
}

impl std::fmt::Debug for SessionVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionVerifier")
            .field("issuer", &self.validation.iss)
            .finish_non_exhaustive()
    }
}

/// Authenticated operator.
///
/// ```rust,ignore
/// async fn handler(SessionUser(claims): SessionUser) -> String {
///     claims.sub
/// }
/// ```
#[derive(Debug, Clone)]
pub struct SessionUser(pub SessionClaims);

impl FromRequestParts<AppContext> for SessionUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppContext,
    ) -> std::result::Result<Self, Self::Rejection> {
        let token = TokenExtractor::from_header(parts)?;
        let claims = state.sessions.verify(&token)?;
        Ok(Self(claims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, Header, encode};
    use secrecy::SecretString;

    fn config(audience: Option<&str>) -> SessionConfig {
        SessionConfig {
            jwt_secret: SecretString::from("session-secret".to_string()),
            issuer: None,
            audience: audience.map(str::to_string),
        }
    }

    fn token(secret: &str, exp: u64, workspace: Option<&str>) -> String {
        let claims = SessionClaims {
            sub: "user-1".into(),
            exp,
            email: None,
            workspace_id: workspace.map(str::to_string),
        };
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    fn future() -> u64 {
        (chrono::Utc::now().timestamp() + 3600) as u64
    }

    #[test]
    fn test_valid_token() {
        let verifier = SessionVerifier::new(&config(None));
        let claims = verifier
            .verify(&token("session-secret", future(), Some("w1")))
            .unwrap();
        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.workspace_id.as_deref(), Some("w1"));
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let verifier = SessionVerifier::new(&config(None));
        assert!(verifier.verify(&token("other", future(), None)).is_err());
    }

    #[test]
    fn test_expired_rejected() {
        let verifier = SessionVerifier::new(&config(None));
        assert!(verifier.verify(&token("session-secret", 1_000, None)).is_err());
    }

    #[test]
    fn test_audience_enforced_when_configured() {
        let verifier = SessionVerifier::new(&config(Some("crm")));
        // Token carries no aud claim
        assert!(verifier.verify(&token("session-secret", future(), None)).is_err());
    }

    #[test]
    fn test_workspace_scope() {
        let claims = SessionClaims {
            sub: "u".into(),
            exp: 0,
            email: None,
            workspace_id: Some("w1".into()),
        };
        assert!(claims.ensure_workspace("w1").is_ok());
        assert!(matches!(
            claims.ensure_workspace("w2"),
            Err(AppError::Forbidden(_))
        ));
    }
}
