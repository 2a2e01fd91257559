//! Durable progress cursor: the count of recipients confirmed sent.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::StoreError;

/// Default file name under the data directory.
pub const CURSOR_FILE: &str = "email_counter.json";

#[derive(Debug, Serialize, Deserialize)]
struct CursorDocument {
    #[serde(default)]
    counter: usize,
}

/// File-backed cursor stored as `{"counter": n}`.
///
/// Every save overwrites the whole document.
#[derive(Debug, Clone)]
pub struct CursorStore {
    path: PathBuf,
}

impl CursorStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the cursor. Missing or corrupt storage reads as 0.
    pub async fn load(&self) -> usize {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return 0,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Cursor unreadable, using 0");
                return 0;
            }
        };

        match serde_json::from_slice::<CursorDocument>(&bytes) {
            Ok(doc) => doc.counter,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Cursor corrupt, using 0");
                0
            }
        }
    }

    pub async fn save(&self, counter: usize) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(&CursorDocument { counter })?;
        super::write_atomic(&self.path, &bytes).await?;
        debug!(counter, "Cursor persisted");
        Ok(())
    }

    /// Operator reset back to the start of the list.
    pub async fn reset(&self) -> Result<(), StoreError> {
        self.save(0).await
    }
}
