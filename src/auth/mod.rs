//! Request authentication: the cron bearer secret and operator sessions.

pub mod cron;
pub mod session;
pub mod token;

pub use cron::{CronAuth, CronAuthorized};
pub use session::{SessionClaims, SessionUser, SessionVerifier};
pub use token::TokenExtractor;
