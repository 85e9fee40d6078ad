//! Hit accounting on top of the blob store.

mod retry;
mod store;

pub use retry::RetryPolicy;
pub use store::{CounterStore, HitOutcome, Report, DEFAULT_LOCK_WAIT};
