//! Billing test data.

use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use rust_decimal::Decimal;
use secrecy::SecretString;
use uuid::Uuid;

use crate::auth::{CronAuth, SessionClaims};
use crate::billing::types::{
    ACTIVE_CLIENT_STATUS, AdmCloudCredentials, AdmCloudSettings, Company, CountBase, CountType,
    NewBillingItem, Workspace,
};

/// Signing secret used by [`BillingHarness`](super::BillingHarness).
pub const TEST_SESSION_SECRET: &str = "test-session-secret";

/// Bearer secret for the cron route in tests.
pub const TEST_CRON_SECRET: &str = "test-cron-secret";

/// Cron auth expecting [`TEST_CRON_SECRET`].
pub fn cron_auth() -> CronAuth {
    CronAuth::Secret(SecretString::from(TEST_CRON_SECRET.to_string()))
}

/// Helper functions for generating fake test data
pub mod fake {
    use super::*;

    /// Generate a fake email address
    pub fn email() -> String {
        format!("contact-{}@client.test", Uuid::new_v4().simple())
    }

    /// Generate an id with a readable prefix, like CRM ids
    pub fn id(prefix: &str) -> String {
        format!("{}_{}", prefix, &Uuid::new_v4().simple().to_string()[..12])
    }
}

/// Workspace with billing enabled, a sender address and AdmCloud off.
pub fn workspace(id: &str) -> Workspace {
    Workspace {
        id: id.to_string(),
        name: format!("Provider {}", id),
        legal_name: Some(format!("Provider {} SRL", id)),
        address: Some("Av. Winston Churchill 1099, Santo Domingo".to_string()),
        phone: Some("+1 809 555 0100".to_string()),
        logo_url: None,
        tax_id: Some("131-00000-1".to_string()),
        billing_enabled: true,
        billing_sender_email: Some(format!("billing@{}.test", id)),
        billing_email_subject: None,
        billing_email_body: None,
        billing_cc: Vec::new(),
        admcloud: AdmCloudSettings::disabled(),
        bank_transfer: None,
        proforma_notes: None,
    }
}

/// AdmCloud enabled with complete credentials.
pub fn admcloud_enabled() -> AdmCloudSettings {
    AdmCloudSettings {
        enabled: true,
        credentials: Some(AdmCloudCredentials {
            app_id: "test-app".to_string(),
            company: "test-company".to_string(),
            username: "api@provider.test".to_string(),
            password: SecretString::from("test-password".to_string()),
        }),
        default_payment_term_id: Some("NET30".to_string()),
        default_sales_stage_id: None,
    }
}

/// Active client company.
pub fn company(id: &str, workspace_id: &str, name: &str) -> Company {
    Company {
        id: id.to_string(),
        workspace_id: workspace_id.to_string(),
        name: name.to_string(),
        legal_name: Some(format!("{} SRL", name)),
        tax_id: Some("101-12345-6".to_string()),
        fiscal_address: Some("Calle El Conde 1, Santo Domingo".to_string()),
        status: ACTIVE_CLIENT_STATUS.to_string(),
        admcloud_relationship_id: None,
    }
}

pub fn manual_item(code: &str, quantity: Decimal, unit_price: Decimal) -> NewBillingItem {
    item(code, unit_price, CountType::Manual { quantity })
}

pub fn users_item(code: &str, unit_price: Decimal) -> NewBillingItem {
    item(code, unit_price, CountType::ActiveUsers)
}

pub fn projects_item(code: &str, unit_price: Decimal) -> NewBillingItem {
    item(code, unit_price, CountType::ActiveProjects)
}

pub fn calculated_item(code: &str, base: CountBase, subtract: u32, unit_price: Decimal) -> NewBillingItem {
    item(code, unit_price, CountType::Calculated { base, subtract })
}

fn item(code: &str, unit_price: Decimal, count_type: CountType) -> NewBillingItem {
    NewBillingItem {
        external_item_id: None,
        code: code.to_string(),
        description: format!("{} subscription", code),
        unit_price,
        count_type,
    }
}

/// HS256 session token signed with `secret`, valid for an hour.
pub fn session_token(secret: &str, user_id: &str, workspace_id: Option<&str>) -> String {
    sign(secret, user_id, workspace_id, Utc::now().timestamp() + 3600)
}

/// Session token that expired an hour ago.
pub fn expired_session_token(secret: &str, user_id: &str) -> String {
    sign(secret, user_id, None, Utc::now().timestamp() - 3600)
}

fn sign(secret: &str, user_id: &str, workspace_id: Option<&str>, exp: i64) -> String {
    let claims = SessionClaims {
        sub: user_id.to_string(),
        exp: u64::try_from(exp).unwrap_or(0),
        email: Some(format!("{}@provider.test", user_id)),
        workspace_id: workspace_id.map(str::to_string),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .unwrap_or_default()
}
