//! Seams to outbound infrastructure.
//!
//! Production backends live in [`crate::email`] and [`crate::storage`];
//! in-memory fakes live in [`crate::testing`].

pub mod blob;
pub mod mailer;
