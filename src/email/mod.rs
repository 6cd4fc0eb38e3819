//! Email backends
//!
//! - `SmtpMailer` sends through an SMTP relay using lettre
//! - `ConsoleMailer` logs instead of sending, for local runs

mod console;
mod smtp;

pub use console::ConsoleMailer;
pub use smtp::{SmtpConfig, SmtpMailer};

pub use crate::traits::mailer::{Attachment, Email, Mailer};
