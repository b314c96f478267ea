// Fatal error kinds for manifests and download sessions.

use std::path::PathBuf;

use thiserror::Error;

use crate::manifest::{FileKey, FragmentKey};

/// Errors that end a session (or prevent one from starting).
///
/// Remote fetch and peer failures are not represented here: the engine logs
/// them and retries on a later iteration.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),

    #[error("invalid downloader options: {0}")]
    InvalidOptions(String),

    #[error("fragment store failure: {0:#}")]
    Store(anyhow::Error),

    #[error("fragment {fragment} of file {file} is accounted as known but missing from the store")]
    MissingFragment { file: FileKey, fragment: FragmentKey },

    #[error("failed to write {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;
