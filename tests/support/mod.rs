//! Shared fakes for integration tests: a recording relay and no-wait limiters.
#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use lettre::Message;
use secrecy::SecretString;
use tokio::sync::Notify;

use campaign_mailer::config::DispatchConfig;
use campaign_mailer::dispatch::{DispatchEngine, EventLevel, EventLog, RateLimiter};
use campaign_mailer::error::TransportError;
use campaign_mailer::mailer::{MailSession, MailTransport, SmtpLogin};
use campaign_mailer::store::CursorStore;
use campaign_mailer::template::Template;

/// What the fake relay observed.
#[derive(Default)]
pub struct RelayLog {
    pub connects: AtomicUsize,
    pub closes: AtomicUsize,
    /// Recipient of every attempted send, in order.
    pub attempts: Mutex<Vec<String>>,
    /// Raw bytes of every accepted message.
    pub delivered: Mutex<Vec<Vec<u8>>>,
}

impl RelayLog {
    pub fn attempts(&self) -> Vec<String> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn delivered_count(&self) -> usize {
        self.delivered.lock().unwrap().len()
    }
}

/// In-memory relay that rejects a fixed set of recipients.
#[derive(Default)]
pub struct FakeRelay {
    pub log: Arc<RelayLog>,
    pub reject: HashSet<String>,
    pub refuse_login: bool,
}

impl FakeRelay {
    pub fn rejecting(addresses: &[&str]) -> Self {
        Self {
            reject: addresses.iter().map(|a| a.to_string()).collect(),
            ..Self::default()
        }
    }

    pub fn refusing_login() -> Self {
        Self {
            refuse_login: true,
            ..Self::default()
        }
    }
}

#[async_trait]
impl MailTransport for FakeRelay {
    async fn connect(&self, login: &SmtpLogin) -> Result<Box<dyn MailSession>, TransportError> {
        self.log.connects.fetch_add(1, Ordering::SeqCst);
        if self.refuse_login {
            return Err(TransportError::Auth {
                username: login.username.clone(),
                reason: "535 bad credentials".into(),
            });
        }
        Ok(Box::new(FakeSession {
            log: Arc::clone(&self.log),
            reject: self.reject.clone(),
        }))
    }
}

struct FakeSession {
    log: Arc<RelayLog>,
    reject: HashSet<String>,
}

#[async_trait]
impl MailSession for FakeSession {
    async fn send_one(&mut self, message: Message) -> Result<(), TransportError> {
        let recipient = message.envelope().to()[0].to_string();
        self.log.attempts.lock().unwrap().push(recipient.clone());

        if self.reject.contains(&recipient) {
            return Err(TransportError::Send {
                recipient,
                reason: "550 mailbox unavailable".into(),
            });
        }
        self.log.delivered.lock().unwrap().push(message.formatted());
        Ok(())
    }

    async fn close(self: Box<Self>) {
        self.log.closes.fetch_add(1, Ordering::SeqCst);
    }
}

/// Counts waits without sleeping.
#[derive(Default)]
pub struct CountingLimiter {
    pub waits: AtomicUsize,
}

#[async_trait]
impl RateLimiter for CountingLimiter {
    async fn wait(&self) {
        self.waits.fetch_add(1, Ordering::SeqCst);
    }
}

/// Blocks each wait until the test releases it.
#[derive(Default)]
pub struct GatedLimiter {
    pub gate: Notify,
}

#[async_trait]
impl RateLimiter for GatedLimiter {
    async fn wait(&self) {
        self.gate.notified().await;
    }
}

pub fn write_recipients(dir: &Path, addresses: &[&str]) -> PathBuf {
    let path = dir.join("recipients.csv");
    let mut contents = String::from("Name,Email\n");
    for (i, address) in addresses.iter().enumerate() {
        contents.push_str(&format!("person{i},{address}\n"));
    }
    std::fs::write(&path, contents).unwrap();
    path
}

pub fn config_for(recipient_file: PathBuf, stopper: usize) -> DispatchConfig {
    DispatchConfig {
        sender_address: "sender@example.com".into(),
        sender_name: Some("Campaign Sender".into()),
        credential: SecretString::from("abcdefghijklmnop".to_string()),
        stopper,
        recipient_file: Some(recipient_file),
        template: Template::custom("Hello", "{greeting},\n\nThanks for reading."),
        attachment: None,
    }
}

pub fn engine_with(
    relay: FakeRelay,
    limiter: Arc<dyn RateLimiter>,
    data_dir: &Path,
) -> (DispatchEngine, Arc<RelayLog>) {
    let log = Arc::clone(&relay.log);
    let engine = DispatchEngine::new(
        Arc::new(relay),
        CursorStore::new(data_dir.join("email_counter.json")),
        limiter,
        EventLog::new(1000),
    );
    (engine, log)
}

pub async fn count_level(events: &EventLog, level: EventLevel) -> usize {
    events
        .snapshot()
        .await
        .iter()
        .filter(|e| e.level == level)
        .count()
}

pub async fn messages(events: &EventLog) -> Vec<String> {
    events
        .snapshot()
        .await
        .into_iter()
        .map(|e| e.message)
        .collect()
}
