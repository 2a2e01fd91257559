//! Error types for the campaign mailer.

use std::path::PathBuf;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required configuration: {key}")]
    MissingRequired { key: String },

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Invalid template: {0}")]
    Template(#[from] TemplateError),
}

/// Errors loading the recipient list.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Recipient file not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to parse {}: {reason}", .path.display())]
    Parse { path: PathBuf, reason: String },

    #[error("No 'email' column found in {}", .0.display())]
    NoAddressColumn(PathBuf),
}

/// Template selection and rendering errors.
#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("Unknown built-in template: {0}")]
    UnknownBuiltIn(String),

    #[error("Template references undefined placeholder {{{0}}}")]
    UndefinedPlaceholder(String),

    #[error("Unbalanced brace at byte {0}")]
    UnbalancedBrace(usize),
}

/// Message composition errors.
#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error("Invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("Failed to build message: {0}")]
    Build(#[from] lettre::error::Error),
}

/// Outbound relay errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to connect to {host}:{port}: {reason}")]
    Connection {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("Authentication failed for {username}: {reason}")]
    Auth { username: String, reason: String },

    #[error("Send to {recipient} failed: {reason}")]
    Send { recipient: String, reason: String },
}

/// Persistence errors for the cursor and settings documents.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Run coordination errors surfaced to the trigger caller.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("A dispatch run is already active")]
    AlreadyRunning,
}
