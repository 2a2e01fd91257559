//! Run coordinator: owns the engine and allows one active run at a time.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

use super::engine::{self, DispatchEngine, RunOutcome};
use super::events::{DispatchEvent, EventLog};
use crate::config::DispatchConfig;
use crate::error::{DispatchError, Error};

/// Snapshot for status queries.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DispatchStatus {
    pub cursor: usize,
    pub total_recipients: usize,
    pub stopper_limit: usize,
    pub running: bool,
}

/// Holds the run flag for as long as it lives.
///
/// Released on drop, so a panicking run still frees the slot.
struct RunGuard {
    flag: Arc<AtomicBool>,
}

impl RunGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                flag: Arc::clone(flag),
            })
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Single-campaign dispatcher shared with the HTTP layer.
pub struct Dispatcher {
    engine: Arc<DispatchEngine>,
    running: Arc<AtomicBool>,
}

impl Dispatcher {
    pub fn new(engine: DispatchEngine) -> Arc<Self> {
        Arc::new(Self {
            engine: Arc::new(engine),
            running: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn event_log(&self) -> &Arc<EventLog> {
        self.engine.events()
    }

    /// Ordered snapshot of the current run's events.
    pub async fn events(&self) -> Vec<DispatchEvent> {
        self.engine.events().snapshot().await
    }

    /// Start a run on a background task and return immediately.
    ///
    /// Fails with [`DispatchError::AlreadyRunning`] while another run (or a
    /// cursor reset) holds the slot. The handle may be dropped to detach.
    pub fn start(&self, config: DispatchConfig) -> Result<JoinHandle<RunOutcome>, DispatchError> {
        let guard = RunGuard::acquire(&self.running).ok_or(DispatchError::AlreadyRunning)?;
        let engine = Arc::clone(&self.engine);
        let run_id = Uuid::new_v4();

        info!(run_id = %run_id, "Dispatch run starting");

        let handle = tokio::spawn(
            async move {
                let _guard = guard;
                let outcome = engine.run_once(config).await;
                info!(?outcome, "Dispatch run ended");
                outcome
            }
            .instrument(info_span!("dispatch_run", run_id = %run_id)),
        );

        Ok(handle)
    }

    pub async fn status(&self, config: &DispatchConfig) -> DispatchStatus {
        let total_recipients = match &config.recipient_file {
            Some(path) => engine::count_recipients(path).await,
            None => 0,
        };

        DispatchStatus {
            cursor: self.engine.cursor().load().await,
            total_recipients,
            stopper_limit: config.stopper,
            running: self.is_running(),
        }
    }

    /// Operator reset of the cursor to 0. Rejected while a run is active.
    pub async fn reset_cursor(&self) -> Result<(), Error> {
        let _guard = RunGuard::acquire(&self.running).ok_or(DispatchError::AlreadyRunning)?;
        self.engine.cursor().reset().await?;
        self.engine
            .events()
            .info("Counter has been reset to 0.")
            .await;
        Ok(())
    }
}
