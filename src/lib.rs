//! Campaign mailer: resumable, rate-limited batch dispatch of personalized email.

pub mod api;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod mailer;
pub mod recipients;
pub mod store;
pub mod template;
