//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use crate::error::ConfigError;
use crate::store::Settings;
use crate::store::cursor::CURSOR_FILE;
use crate::store::settings::SETTINGS_FILE;
use crate::template::{ResolvedTemplate, Template};

/// Process-level configuration, read once from the environment at startup.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP listen port.
    pub port: u16,
    /// Directory holding the cursor and settings documents.
    pub data_dir: PathBuf,
    /// Directory holding recipient files and attachments.
    pub upload_dir: PathBuf,
    pub smtp_host: String,
    pub smtp_port: u16,
    /// Fixed pause after each confirmed send.
    pub send_delay: Duration,
    /// Display name paired with the sender address.
    pub sender_name: Option<String>,
    /// Maximum retained event log entries.
    pub event_log_capacity: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let data_dir = PathBuf::from("./data");
        Self {
            port: 5001,
            upload_dir: data_dir.join("uploads"),
            data_dir,
            smtp_host: "smtp.gmail.com".to_string(),
            smtp_port: 587,
            send_delay: Duration::from_secs(5),
            sender_name: None,
            event_log_capacity: 1000,
        }
    }
}

impl ServerConfig {
    /// Build config from `MAILER_*` environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let data_dir = std::env::var("MAILER_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.data_dir);

        let upload_dir = std::env::var("MAILER_UPLOAD_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| data_dir.join("uploads"));

        Self {
            port: env_parse("MAILER_PORT").unwrap_or(defaults.port),
            data_dir,
            upload_dir,
            smtp_host: std::env::var("MAILER_SMTP_HOST").unwrap_or(defaults.smtp_host),
            smtp_port: env_parse("MAILER_SMTP_PORT").unwrap_or(defaults.smtp_port),
            send_delay: env_parse("MAILER_SEND_DELAY_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.send_delay),
            sender_name: std::env::var("MAILER_SENDER_NAME")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            event_log_capacity: env_parse("MAILER_EVENT_LOG_CAP")
                .unwrap_or(defaults.event_log_capacity),
        }
    }

    pub fn cursor_path(&self) -> PathBuf {
        self.data_dir.join(CURSOR_FILE)
    }

    pub fn settings_path(&self) -> PathBuf {
        self.data_dir.join(SETTINGS_FILE)
    }

    /// Resolve an uploaded file name to its path.
    pub fn upload_path(&self, file_name: &str) -> PathBuf {
        self.upload_dir.join(file_name)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

/// Immutable inputs for one dispatch run.
///
/// Built from whatever the operator has saved; completeness is checked by
/// [`DispatchConfig::check_preconditions`] inside the run, not at construction.
#[derive(Debug)]
pub struct DispatchConfig {
    pub sender_address: String,
    pub sender_name: Option<String>,
    pub credential: SecretString,
    /// Maximum sends per run.
    pub stopper: usize,
    pub recipient_file: Option<PathBuf>,
    pub template: Template,
    pub attachment: Option<PathBuf>,
}

impl DispatchConfig {
    pub fn from_settings(settings: &Settings, server: &ServerConfig) -> Self {
        Self {
            sender_address: settings.email.clone().unwrap_or_default(),
            sender_name: server.sender_name.clone(),
            credential: SecretString::from(settings.password.clone().unwrap_or_default()),
            stopper: settings.stopper(),
            recipient_file: non_empty(&settings.default_file).map(|f| server.upload_path(f)),
            template: settings.template(),
            attachment: non_empty(&settings.resume_file).map(|f| server.upload_path(f)),
        }
    }

    /// Verify every required field is present and the template renders.
    pub fn check_preconditions(&self) -> Result<ResolvedTemplate, ConfigError> {
        if self.sender_address.trim().is_empty() {
            return Err(missing("sender address"));
        }
        if self.credential.expose_secret().is_empty() {
            return Err(missing("sender credential"));
        }
        if self.stopper == 0 {
            return Err(ConfigError::InvalidValue {
                key: "stopper".into(),
                message: "must be a positive number".into(),
            });
        }
        if self.recipient_file.is_none() {
            return Err(missing("recipient file"));
        }

        let template = self.template.resolve()?;
        template.validate()?;
        Ok(template)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

fn missing(key: &str) -> ConfigError {
    ConfigError::MissingRequired { key: key.into() }
}
