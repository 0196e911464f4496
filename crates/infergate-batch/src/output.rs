//! Output document writer.

use std::path::Path;

use infergate_core::to_spaced_json;
use serde::Serialize;
use tracing::info;

use crate::error::BatchError;

/// Write the ordered results as a single JSON array, `null` for failed
/// slots. Missing parent directories are created.
pub async fn write_output<T: Serialize>(
    path: &Path,
    results: &[Option<T>],
) -> Result<(), BatchError> {
    let document = to_spaced_json(results)?;
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| BatchError::io(parent, e))?;
    }
    tokio::fs::write(path, document)
        .await
        .map_err(|e| BatchError::io(path, e))?;
    info!(path = %path.display(), items = results.len(), "Wrote batch output");
    Ok(())
}
