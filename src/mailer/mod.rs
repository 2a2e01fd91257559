//! Outbound mail: message composition and the relay transport.

pub mod compose;
pub mod transport;

pub use compose::{AttachmentSource, Composed, SenderIdentity, compose};
pub use transport::{MailSession, MailTransport, SessionGuard, SmtpLogin, SmtpRelay};
