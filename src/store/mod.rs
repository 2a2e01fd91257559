//! Persistence layer: JSON documents for the progress cursor and operator settings.

pub mod cursor;
pub mod settings;

use std::path::Path;

use tokio::fs;

use crate::error::StoreError;

pub use cursor::CursorStore;
pub use settings::{SavedTemplate, Settings, SettingsStore};

/// Overwrite `path` with `bytes` via a sibling temp file and a rename, so a
/// crash mid-write leaves the previous document intact.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).await.map_err(io_err)?;
    }

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    fs::write(&tmp, bytes).await.map_err(io_err)?;
    fs::rename(&tmp, path).await.map_err(io_err)?;
    Ok(())
}
