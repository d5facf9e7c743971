//! File storage module
//!
//! Writes an assembled piece or a whole download to the output path.

use std::path::Path;

use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info};

use crate::error::{Result, TorrentError};

/// Write `data` verbatim to `path`, creating parent directories as needed
pub async fn write_output(path: &Path, data: &[u8]) -> Result<()> {
    debug!("Writing {} bytes to {}", data.len(), path.display());

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| storage_error("Failed to create output directory", parent, e))?;
    }

    let mut file = fs::File::create(path)
        .await
        .map_err(|e| storage_error("Failed to create output file", path, e))?;
    file.write_all(data)
        .await
        .map_err(|e| storage_error("Failed to write output file", path, e))?;
    file.flush()
        .await
        .map_err(|e| storage_error("Failed to flush output file", path, e))?;

    info!("Wrote {} bytes to {}", data.len(), path.display());
    Ok(())
}

fn storage_error(message: &str, path: &Path, err: std::io::Error) -> TorrentError {
    error!("{} '{}': {}", message, path.display(), err);
    TorrentError::storage_error_full(message, path.display().to_string(), err.to_string())
}
