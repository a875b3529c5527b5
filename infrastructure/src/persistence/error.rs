use application::ApplicationError;
use domain::RecordId;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failures surfaced by [`JsonFileStore`](super::JsonFileStore).
///
/// Unparsable file contents are not an error: they read as an empty collection.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Invalid storage path: {0}")]
    InvalidPath(String),
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Failed to serialize collection: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("No identifier left after {0}")]
    IdsExhausted(RecordId),
    #[error("Storage task did not complete: {0}")]
    TaskAborted(String),
}

impl StoreError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl From<StoreError> for ApplicationError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidPath(msg) => ApplicationError::InvalidInput(msg),
            other => ApplicationError::InfrastructureError(other.to_string()),
        }
    }
}
