// File assembly: concatenate a completed file's fragments and write it under the base path.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};
use crate::manifest::{FileEntry, Manifest};
use crate::store::traits::{FragmentStore, FragmentStoreExt};

/// Write `file` to `base/local_path`, creating parent directories.
///
/// Every fragment of the file must be in the store. A missing one means the
/// session's bookkeeping disagrees with the store, which is reported as
/// [`EngineError::MissingFragment`] instead of writing a truncated file.
pub async fn write_file(
    manifest: &Manifest,
    store: &dyn FragmentStore,
    base: &Path,
    file: &FileEntry,
) -> EngineResult<PathBuf> {
    let mut content = Vec::with_capacity(file.file_size as usize);
    for key in manifest.file_fragment_keys(file) {
        match store.get_fragment(key).map_err(EngineError::Store)? {
            Some(value) => content.extend_from_slice(&value),
            None => {
                return Err(EngineError::MissingFragment {
                    file: file.key,
                    fragment: key,
                })
            }
        }
    }
    if content.len() as u64 != file.file_size {
        warn!(
            "file {} assembled to {} bytes, manifest says {}",
            file.key,
            content.len(),
            file.file_size
        );
    }

    let path = base.join(&file.local_path);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| EngineError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
    }
    tokio::fs::write(&path, &content)
        .await
        .map_err(|source| EngineError::Io {
            path: path.clone(),
            source,
        })?;

    info!(
        "file {} written to {} ({} bytes)",
        file.key,
        path.display(),
        content.len()
    );
    Ok(path)
}
