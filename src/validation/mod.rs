//! Request validation using the `validator` crate.
//!
//! Failures are rendered as 400 responses whose `field_errors` map each
//! field to its messages.

mod extractor;
mod validators;

pub use extractor::{ValidatedJson, ValidatedQuery, validation_error};
pub use validators::{validate_billing_type, validate_count_base, validate_count_type, validate_non_negative};
pub use validator;
