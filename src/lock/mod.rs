//! Process-local mutation lock.

mod error;
mod in_memory;
#[allow(clippy::module_inception)]
mod lock;

pub use error::LockError;
pub use in_memory::InMemoryLock;
pub use lock::{Lock, LockGuard};
