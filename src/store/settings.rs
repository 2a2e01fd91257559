//! Operator settings document (`config.json`).
//!
//! A flat key/value JSON object written by the operator-facing routes and
//! read when a run is triggered. Absent or corrupt storage loads as empty.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::warn;

use crate::error::StoreError;
use crate::template::{self, DEFAULT_CUSTOM_BODY, DEFAULT_CUSTOM_SUBJECT, Template};

/// Default file name under the data directory.
pub const SETTINGS_FILE: &str = "config.json";

/// Batch size used when the operator has not set one.
pub const DEFAULT_STOPPER: usize = 100;

/// The template the operator last saved from the editor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedTemplate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl SavedTemplate {
    /// A built-in name with no edited body selects the built-in; anything
    /// else is a custom template with defaults for missing fields.
    pub fn to_template(&self) -> Template {
        let name = self.name.as_deref().unwrap_or("default");
        let has_body = self.body.as_deref().is_some_and(|b| !b.is_empty());

        if template::is_built_in(name) && !has_body {
            return Template::built_in(name);
        }

        Template::custom(
            self.subject
                .clone()
                .unwrap_or_else(|| DEFAULT_CUSTOM_SUBJECT.to_string()),
            self.body
                .clone()
                .unwrap_or_else(|| DEFAULT_CUSTOM_BODY.to_string()),
        )
    }
}

/// Persisted operator settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopper: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_template: Option<SavedTemplate>,
}

impl Settings {
    pub fn stopper(&self) -> usize {
        self.stopper.unwrap_or(DEFAULT_STOPPER)
    }

    pub fn template(&self) -> Template {
        self.current_template
            .as_ref()
            .map(SavedTemplate::to_template)
            .unwrap_or_else(|| Template::built_in("default"))
    }
}

/// File-backed settings with serialized read-modify-write updates.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> Settings {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Settings::default(),
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Settings unreadable, using defaults");
                return Settings::default();
            }
        };

        serde_json::from_slice(&bytes).unwrap_or_else(|e| {
            warn!(path = %self.path.display(), error = %e, "Settings corrupt, using defaults");
            Settings::default()
        })
    }

    pub async fn save(&self, settings: &Settings) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        self.write(settings).await
    }

    /// Load, apply `f`, and save under the write lock. Returns the new settings.
    pub async fn update<F>(&self, f: F) -> Result<Settings, StoreError>
    where
        F: FnOnce(&mut Settings),
    {
        let _guard = self.write_lock.lock().await;
        let mut settings = self.load().await;
        f(&mut settings);
        self.write(&settings).await?;
        Ok(settings)
    }

    async fn write(&self, settings: &Settings) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec_pretty(settings)?;
        super::write_atomic(&self.path, &bytes).await
    }
}
