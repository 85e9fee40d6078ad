use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use super::{Lock, LockError};

/// In-process lock backed by `Mutex<bool>` + `Condvar`.
///
/// Unlike a `MutexGuard`, holding it does not borrow any data, so it can be
/// held across calls into the blob store.
pub struct InMemoryLock {
    state: Mutex<bool>,
    wake: Condvar,
}

impl InMemoryLock {
    pub fn new() -> Self {
        InMemoryLock {
            state: Mutex::new(false),
            wake: Condvar::new(),
        }
    }
}

impl Default for InMemoryLock {
    fn default() -> Self {
        Self::new()
    }
}

impl Lock for InMemoryLock {
    fn lock_timeout(&self, timeout: Duration) -> Result<(), LockError> {
        let deadline = Instant::now() + timeout;
        let mut locked = self
            .state
            .lock()
            .map_err(|e| LockError::Poisoned(e.to_string()))?;
        while *locked {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(LockError::TimedOut(timeout));
            }
            let (guard, _) = self
                .wake
                .wait_timeout(locked, remaining)
                .map_err(|e| LockError::Poisoned(e.to_string()))?;
            locked = guard;
        }
        *locked = true;
        Ok(())
    }

    fn unlock(&self) -> Result<(), LockError> {
        let mut locked = self
            .state
            .lock()
            .map_err(|e| LockError::Poisoned(e.to_string()))?;
        if *locked {
            *locked = false;
            self.wake.notify_one();
        }
        Ok(())
    }
}
