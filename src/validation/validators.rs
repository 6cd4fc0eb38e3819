//! Custom validators for billing settings input.

use rust_decimal::Decimal;
use std::borrow::Cow;
use validator::ValidationError;

use crate::billing::types::{BillingType, CountBase};

fn invalid(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(Cow::Borrowed(message));
    err
}

pub fn validate_billing_type(value: &str) -> Result<(), ValidationError> {
    BillingType::parse(value)
        .map(|_| ())
        .ok_or_else(|| invalid("billing_type", "must be 'standard' or 'custom'"))
}

pub fn validate_count_type(value: &str) -> Result<(), ValidationError> {
    match value {
        "manual" | "active_projects" | "active_users" | "calculated" => Ok(()),
        _ => Err(invalid(
            "count_type",
            "must be one of manual, active_projects, active_users, calculated",
        )),
    }
}

pub fn validate_count_base(value: &str) -> Result<(), ValidationError> {
    CountBase::parse(value)
        .map(|_| ())
        .ok_or_else(|| invalid("count_base", "must be 'users' or 'projects'"))
}

pub fn validate_non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(invalid("non_negative", "must not be negative"));
    }
    Ok(())
}
