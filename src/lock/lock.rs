use std::time::Duration;

use super::LockError;

/// A mutual-exclusion primitive guarding a load-mutate-save cycle.
///
/// The in-process implementation uses `Mutex` + `Condvar`; a deployment
/// running several replicas could put a lease-based lock behind the same trait.
pub trait Lock: Send + Sync {
    /// Acquire the lock, giving up after `timeout`.
    fn lock_timeout(&self, timeout: Duration) -> Result<(), LockError>;

    /// Release the lock.
    fn unlock(&self) -> Result<(), LockError>;
}

/// Releases the lock when dropped, including on early `?` returns.
pub struct LockGuard<'a, L: Lock + ?Sized> {
    lock: &'a L,
}

impl<'a, L: Lock + ?Sized> LockGuard<'a, L> {
    pub fn acquire_timeout(lock: &'a L, timeout: Duration) -> Result<Self, LockError> {
        lock.lock_timeout(timeout)?;
        Ok(Self { lock })
    }
}

impl<L: Lock + ?Sized> Drop for LockGuard<'_, L> {
    fn drop(&mut self) {
        if let Err(e) = self.lock.unlock() {
            tracing::error!(error = %e, "failed to release mutation lock");
        }
    }
}
