//! Dispatch engine: one batch run over the recipient list.
//!
//! A run reads the cursor, sends to the window `[start, min(start + stopper, len))`
//! in ascending order and persists the cursor after each confirmed send.
//! Every failure ends up in the event log; `run_once` itself never errors.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use super::events::EventLog;
use super::limiter::RateLimiter;
use crate::config::DispatchConfig;
use crate::error::SourceError;
use crate::mailer::{AttachmentSource, MailTransport, SenderIdentity, SessionGuard, SmtpLogin, compose};
use crate::recipients::{self, Recipient, RecipientList};
use crate::store::CursorStore;
use crate::template::ResolvedTemplate;

/// The slice of the recipient list a run is allowed to touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchWindow {
    pub start: usize,
    pub end: usize,
}

impl BatchWindow {
    pub fn compute(cursor: usize, stopper: usize, total: usize) -> Self {
        Self {
            start: cursor,
            end: cursor.saturating_add(stopper).min(total),
        }
    }

    /// True once the cursor has reached the end of the list.
    pub fn is_exhausted(&self) -> bool {
        self.start >= self.end
    }
}

/// Counts for a run that reached the send loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub window: BatchWindow,
    pub sent: usize,
    pub failed: usize,
    /// Cursor value after the run.
    pub cursor: usize,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// Stopped before sending: bad config, unreadable source, or relay failure.
    Aborted,
    /// Cursor already at the end of the list; nothing sent.
    AlreadyComplete,
    Finished(RunSummary),
}

/// Orchestrates source, cursor, renderer, composer, and transport.
pub struct DispatchEngine {
    transport: Arc<dyn MailTransport>,
    cursor: CursorStore,
    limiter: Arc<dyn RateLimiter>,
    events: Arc<EventLog>,
}

impl DispatchEngine {
    pub fn new(
        transport: Arc<dyn MailTransport>,
        cursor: CursorStore,
        limiter: Arc<dyn RateLimiter>,
        events: Arc<EventLog>,
    ) -> Self {
        Self {
            transport,
            cursor,
            limiter,
            events,
        }
    }

    pub fn events(&self) -> &Arc<EventLog> {
        &self.events
    }

    pub fn cursor(&self) -> &CursorStore {
        &self.cursor
    }

    pub async fn run_once(&self, config: DispatchConfig) -> RunOutcome {
        self.events.clear().await;
        self.events.info("Email sending process started.").await;

        let template = match config.check_preconditions() {
            Ok(template) => template,
            Err(e) => {
                self.events.error(format!("ERROR: {e}")).await;
                return RunOutcome::Aborted;
            }
        };

        let Some(path) = config.recipient_file.clone() else {
            self.events.error("ERROR: No recipient file selected.").await;
            return RunOutcome::Aborted;
        };

        let recipients = match load_recipients(path.clone()).await {
            Ok(list) => list,
            Err(e) => {
                self.events.error(format!("ERROR loading CSV file: {e}")).await;
                return RunOutcome::Aborted;
            }
        };
        self.events
            .info(format!(
                "Loaded {} emails from {}.",
                recipients.len(),
                display_name(&path)
            ))
            .await;

        let window = BatchWindow::compute(self.cursor.load().await, config.stopper, recipients.len());
        if window.is_exhausted() {
            self.events.info("All emails have already been sent!").await;
            return RunOutcome::AlreadyComplete;
        }
        self.events
            .info(format!(
                "Preparing to send emails from index {} to {}.",
                window.start,
                window.end - 1
            ))
            .await;

        let attachment = match &config.attachment {
            Some(path) => Some(AttachmentSource::load(path).await),
            None => None,
        };

        let sender = SenderIdentity {
            address: config.sender_address.clone(),
            name: config.sender_name.clone(),
        };
        let login = SmtpLogin {
            username: config.sender_address,
            password: config.credential,
        };

        let mut session = match self.transport.connect(&login).await {
            Ok(session) => SessionGuard::new(session),
            Err(e) => {
                self.events
                    .error(format!(
                        "ERROR: Failed to connect to SMTP server. Check credentials. Details: {e}"
                    ))
                    .await;
                return RunOutcome::Aborted;
            }
        };
        self.events.info("Successfully connected to SMTP server.").await;

        let batch = Batch {
            recipients: &recipients,
            window,
            template: &template,
            sender: &sender,
            attachment: attachment.as_ref(),
        };
        let summary = self.send_window(&mut session, batch).await;

        session.close().await;
        self.events
            .info("Batch finished. SMTP server connection closed.")
            .await;

        RunOutcome::Finished(summary)
    }

    async fn send_window(&self, session: &mut SessionGuard, batch: Batch<'_>) -> RunSummary {
        let total = batch.recipients.len();
        // End of the contiguous success streak, and the last value actually persisted.
        let mut streak = batch.window.start;
        let mut committed = batch.window.start;
        let mut sent = 0;
        let mut failed = 0;

        for index in batch.window.start..batch.window.end {
            let Some(recipient) = batch.recipients.get(index) else {
                break;
            };

            let message = match self.prepare(recipient, &batch).await {
                Ok(message) => message,
                Err(Prepare::Fatal(reason)) => {
                    self.events
                        .error(format!("ERROR: {reason}. Stopping batch."))
                        .await;
                    break;
                }
                Err(Prepare::Skip(reason)) => {
                    failed += 1;
                    self.events
                        .error(format!("ERROR sending to {}: {reason}", recipient.address))
                        .await;
                    continue;
                }
            };

            match session.send_one(message).await {
                Ok(()) => {
                    sent += 1;
                    // Only a contiguous run of successes from the cursor may advance it,
                    // and only once the new value is on disk.
                    let advanced = streak == index;
                    if advanced {
                        streak = index + 1;
                        match self.cursor.save(streak).await {
                            Ok(()) => committed = streak,
                            Err(e) => {
                                self.events
                                    .error(format!("ERROR: Failed to persist progress {streak}: {e}"))
                                    .await;
                            }
                        }
                    }

                    self.events
                        .success(format!(
                            "SUCCESS: Email sent to {} ({}/{})",
                            recipient.address,
                            index + 1,
                            total
                        ))
                        .await;
                    if !advanced {
                        self.events
                            .warning(format!(
                                "Progress held at {committed}: an earlier recipient in this batch failed."
                            ))
                            .await;
                    }

                    self.limiter.wait().await;
                }
                Err(e) => {
                    failed += 1;
                    self.events
                        .error(format!("ERROR sending to {}: {e}", recipient.address))
                        .await;
                }
            }
        }

        debug!(sent, failed, cursor = committed, "Send window complete");
        RunSummary {
            window: batch.window,
            sent,
            failed,
            cursor: committed,
        }
    }

    async fn prepare(
        &self,
        recipient: &Recipient,
        batch: &Batch<'_>,
    ) -> Result<lettre::Message, Prepare> {
        let body = batch
            .template
            .render(recipient)
            .map_err(|e| Prepare::Fatal(e.to_string()))?;

        let composed = compose(
            batch.sender,
            &recipient.address,
            &batch.template.subject,
            body,
            batch.attachment,
        )
        .map_err(|e| Prepare::Skip(e.to_string()))?;

        if let Some((file_name, reason)) = composed.skipped_attachment {
            self.events
                .warning(format!(
                    "Warning: Attachment '{file_name}' unavailable ({reason}). Sending without attachment."
                ))
                .await;
        }

        Ok(composed.message)
    }
}

/// Per-run inputs to the send loop.
struct Batch<'a> {
    recipients: &'a RecipientList,
    window: BatchWindow,
    template: &'a ResolvedTemplate,
    sender: &'a SenderIdentity,
    attachment: Option<&'a AttachmentSource>,
}

enum Prepare {
    /// Abort the rest of the batch.
    Fatal(String),
    /// Skip this recipient only.
    Skip(String),
}

async fn load_recipients(path: PathBuf) -> Result<RecipientList, SourceError> {
    let task_path = path.clone();
    tokio::task::spawn_blocking(move || recipients::load(&task_path))
        .await
        .unwrap_or_else(|e| {
            Err(SourceError::Parse {
                path,
                reason: format!("loader task failed: {e}"),
            })
        })
}

/// Load the recipient list without touching the event log (for status queries).
pub(crate) async fn count_recipients(path: &Path) -> usize {
    load_recipients(path.to_path_buf())
        .await
        .map(|list| list.len())
        .unwrap_or(0)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
