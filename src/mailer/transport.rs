//! Outbound transport: one authenticated relay session per run.
//!
//! `MailTransport::connect` establishes and authenticates the session
//! (Disconnected → Authenticating → Ready). The returned [`MailSession`]
//! sends messages one at a time and is consumed by `close`.

use std::time::Duration;

use async_trait::async_trait;
use lettre::transport::smtp::PoolConfig;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info, warn};

use crate::error::TransportError;

/// Login for the relay.
#[derive(Debug)]
pub struct SmtpLogin {
    pub username: String,
    pub password: SecretString,
}

/// Opens authenticated sessions to an outbound relay.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn connect(&self, login: &SmtpLogin) -> Result<Box<dyn MailSession>, TransportError>;
}

/// A ready session. Hold it in a [`SessionGuard`] so it is closed on every exit path.
#[async_trait]
pub trait MailSession: Send {
    async fn send_one(&mut self, message: Message) -> Result<(), TransportError>;

    async fn close(self: Box<Self>);
}

/// Scoped ownership of an open session.
///
/// `close` releases it in place. A guard dropped without `close` hands the
/// session to a background task that closes it.
pub struct SessionGuard {
    session: Option<Box<dyn MailSession>>,
}

impl SessionGuard {
    pub fn new(session: Box<dyn MailSession>) -> Self {
        Self {
            session: Some(session),
        }
    }

    pub async fn send_one(&mut self, message: Message) -> Result<(), TransportError> {
        match self.session.as_mut() {
            Some(session) => session.send_one(message).await,
            None => Err(TransportError::Send {
                recipient: message
                    .envelope()
                    .to()
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
                reason: "session already closed".into(),
            }),
        }
    }

    pub async fn close(mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
        }
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                warn!("Relay session dropped without close, closing in background");
                handle.spawn(session.close());
            }
            Err(_) => warn!("Relay session dropped outside a runtime"),
        }
    }
}

/// STARTTLS submission relay (e.g. `smtp.gmail.com:587`).
#[derive(Debug, Clone)]
pub struct SmtpRelay {
    host: String,
    port: u16,
    timeout: Duration,
}

impl SmtpRelay {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn connection_error(&self, reason: impl ToString) -> TransportError {
        TransportError::Connection {
            host: self.host.clone(),
            port: self.port,
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl MailTransport for SmtpRelay {
    async fn connect(&self, login: &SmtpLogin) -> Result<Box<dyn MailSession>, TransportError> {
        let creds = Credentials::new(
            login.username.clone(),
            login.password.expose_secret().to_string(),
        );

        // A pool of one keeps every send on the same authenticated connection.
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&self.host)
            .map_err(|e| self.connection_error(e))?
            .port(self.port)
            .timeout(Some(self.timeout))
            .credentials(creds)
            .pool_config(PoolConfig::new().min_idle(0).max_size(1))
            .build();

        debug!(host = %self.host, port = self.port, "Authenticating with SMTP relay");

        match transport.test_connection().await {
            Ok(true) => {}
            Ok(false) => return Err(self.connection_error("relay did not accept the session")),
            Err(e) if e.is_permanent() => {
                return Err(TransportError::Auth {
                    username: login.username.clone(),
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(self.connection_error(e)),
        }

        info!(host = %self.host, port = self.port, "Connected to SMTP relay");
        Ok(Box::new(SmtpSession {
            transport,
            host: self.host.clone(),
        }))
    }
}

struct SmtpSession {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    host: String,
}

#[async_trait]
impl MailSession for SmtpSession {
    async fn send_one(&mut self, message: Message) -> Result<(), TransportError> {
        let recipient = message
            .envelope()
            .to()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");

        self.transport
            .send(message)
            .await
            .map(|_| ())
            .map_err(|e| TransportError::Send {
                recipient,
                reason: e.to_string(),
            })
    }

    async fn close(self: Box<Self>) {
        let SmtpSession { transport, host } = *self;
        // Dropping the transport drops the pooled connection.
        drop(transport);
        info!(host = %host, "SMTP session closed");
    }
}
