use thiserror::Error;

/// Error type for lock operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    /// The underlying primitive was poisoned (a thread panicked while holding it).
    #[error("lock poisoned: {0}")]
    Poisoned(String),
    /// The lock could not be acquired within the allowed wait.
    #[error("lock acquire timed out after {0:?}")]
    TimedOut(std::time::Duration),
}
