use thiserror::Error;

use crate::blob::BackendError;
use crate::lock::LockError;
use crate::record::Version;

/// Errors from the blob store and the counter store built on it.
///
/// A missing artifact is not an error: it loads as an empty snapshot.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The canonical artifact exists but does not parse. Never overwritten.
    #[error("canonical artifact {version} is malformed: {reason}")]
    Malformed { version: String, reason: String },

    /// The live artifact changed between load and save.
    #[error("version conflict: expected {expected}, found {actual}")]
    Conflict { expected: Version, actual: Version },

    /// The backend is unreachable or retries ran out; the hit was not counted.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("failed to encode snapshot: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Lock(#[from] LockError),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    /// Map this error to an HTTP-style status code.
    pub fn status_code(&self) -> u16 {
        match self {
            StoreError::Conflict { .. } => 409,
            StoreError::Unavailable(_) | StoreError::Backend(_) => 503,
            StoreError::Malformed { .. } | StoreError::Encode(_) | StoreError::Lock(_) => 500,
        }
    }
}
