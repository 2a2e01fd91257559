//! Recipient source: loads the ordered address list from an uploaded CSV file.

use std::io;
use std::path::Path;

use serde::Serialize;
use tracing::debug;

use crate::error::SourceError;

/// Greeting name used when nothing alphabetic can be pulled from an address.
pub const FALLBACK_NAME: &str = "there";

/// A single campaign recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recipient {
    pub address: String,
    pub display_name: String,
}

impl Recipient {
    pub fn new(address: impl Into<String>) -> Self {
        let address = address.into();
        let display_name = extract_name(&address);
        Self {
            address,
            display_name,
        }
    }
}

/// Ordered recipients. The cursor indexes into this positionally, so the
/// order must match the row order of the source file.
#[derive(Debug, Clone, Default)]
pub struct RecipientList {
    recipients: Vec<Recipient>,
}

impl RecipientList {
    pub fn from_addresses<I, S>(addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let recipients = addresses
            .into_iter()
            .filter_map(|a| {
                let trimmed = a.as_ref().trim();
                (!trimmed.is_empty()).then(|| Recipient::new(trimmed))
            })
            .collect();
        Self { recipients }
    }

    pub fn len(&self) -> usize {
        self.recipients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipients.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Recipient> {
        self.recipients.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Recipient> {
        self.recipients.iter()
    }
}

/// Derive a greeting name from the local part of an address.
///
/// Non-alphabetic characters act as word separators and each word is
/// title-cased: `john.doe@x.com` → `John Doe`, `a1b2@x.com` → `A B`.
pub fn extract_name(address: &str) -> String {
    let local = address.split('@').next().unwrap_or_default();
    let name = local
        .split(|c: char| !c.is_ascii_alphabetic())
        .filter(|part| !part.is_empty())
        .map(capitalize)
        .collect::<Vec<_>>()
        .join(" ");

    if name.is_empty() {
        FALLBACK_NAME.to_string()
    } else {
        name
    }
}

fn capitalize(word: &str) -> String {
    let lower = word.to_ascii_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// Load recipients from a CSV file.
///
/// The address column is the first header containing `email`
/// (case-insensitive). Rows with a blank value in that column are dropped.
/// This is blocking I/O; async callers should go through `spawn_blocking`.
pub fn load(path: &Path) -> Result<RecipientList, SourceError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| source_error(path, e))?;

    let headers = reader.headers().map_err(|e| source_error(path, e))?.clone();
    let column = headers
        .iter()
        .position(|h| h.trim_start_matches('\u{feff}').to_lowercase().contains("email"))
        .ok_or_else(|| SourceError::NoAddressColumn(path.to_path_buf()))?;

    let mut addresses = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| source_error(path, e))?;
        if let Some(value) = record.get(column) {
            addresses.push(value.to_string());
        }
    }

    let list = RecipientList::from_addresses(addresses);
    debug!(path = %path.display(), count = list.len(), "Loaded recipient list");
    Ok(list)
}

fn source_error(path: &Path, err: csv::Error) -> SourceError {
    if let csv::ErrorKind::Io(io_err) = err.kind()
        && io_err.kind() == io::ErrorKind::NotFound
    {
        return SourceError::NotFound(path.to_path_buf());
    }
    SourceError::Parse {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}
