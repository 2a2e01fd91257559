//! Event log: in-memory run history with broadcast to live observers.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{RwLock, broadcast};
use tracing::{error, info, warn};

/// Default broadcast channel capacity.
const DEFAULT_BROADCAST_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// One timestamped status line.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchEvent {
    pub timestamp: DateTime<Utc>,
    pub level: EventLevel,
    pub message: String,
}

impl fmt::Display for DispatchEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.message
        )
    }
}

/// Append-only log, cleared at the start of each run.
///
/// Readers take a snapshot under the read lock, so they never observe a
/// half-applied append. Entries beyond `capacity` evict the oldest.
pub struct EventLog {
    entries: RwLock<VecDeque<DispatchEvent>>,
    capacity: usize,
    tx: broadcast::Sender<DispatchEvent>,
}

impl EventLog {
    pub fn new(capacity: usize) -> Arc<Self> {
        let (tx, _rx) = broadcast::channel(DEFAULT_BROADCAST_CAPACITY);
        Arc::new(Self {
            entries: RwLock::new(VecDeque::new()),
            capacity: capacity.max(1),
            tx,
        })
    }

    /// Subscribe to events as they are appended.
    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.tx.subscribe()
    }

    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    pub async fn push(&self, level: EventLevel, message: impl Into<String>) {
        let event = DispatchEvent {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        };

        match level {
            EventLevel::Info | EventLevel::Success => info!("{}", event.message),
            EventLevel::Warning => warn!("{}", event.message),
            EventLevel::Error => error!("{}", event.message),
        }

        {
            let mut entries = self.entries.write().await;
            if entries.len() >= self.capacity {
                entries.pop_front();
            }
            entries.push_back(event.clone());
        }

        // Ok if nobody is listening
        let _ = self.tx.send(event);
    }

    pub async fn info(&self, message: impl Into<String>) {
        self.push(EventLevel::Info, message).await;
    }

    pub async fn success(&self, message: impl Into<String>) {
        self.push(EventLevel::Success, message).await;
    }

    pub async fn warning(&self, message: impl Into<String>) {
        self.push(EventLevel::Warning, message).await;
    }

    pub async fn error(&self, message: impl Into<String>) {
        self.push(EventLevel::Error, message).await;
    }

    /// Ordered copy of the current entries.
    pub async fn snapshot(&self) -> Vec<DispatchEvent> {
        self.entries.read().await.iter().cloned().collect()
    }
}
