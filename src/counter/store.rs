use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, warn};

use super::retry::RetryPolicy;
use crate::blob::{BlobStore, Channel};
use crate::clock::{Clock, SystemClock};
use crate::enrich::Metadata;
use crate::error::StoreError;
use crate::lock::{InMemoryLock, Lock, LockError, LockGuard};
use crate::record::{Snapshot, SnapshotStats, Version, VisitorRecord};

/// How long a hit waits for the mutation lock before giving up.
pub const DEFAULT_LOCK_WAIT: Duration = Duration::from_secs(30);

/// Result of recording one hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HitOutcome {
    pub record: VisitorRecord,
    pub is_new: bool,
    /// Aggregates of the snapshot the hit was published in.
    pub unique_visitors: usize,
    pub total_views: u64,
    pub version: Version,
    /// Save attempts it took, 1 when there was no conflict.
    pub attempts: u32,
}

/// A fresh read of the store with derived aggregates.
#[derive(Debug, Clone)]
pub struct Report {
    pub snapshot: Snapshot,
    pub stats: SnapshotStats,
}

/// Applies hits to the durable snapshot through load-merge-save cycles.
///
/// Cycles in this process are serialized by `L`; cycles in other processes
/// are caught by the blob store's version check and retried on top of the
/// newer state, so no hit is ever applied to a stale snapshot.
pub struct CounterStore<C, L = InMemoryLock> {
    blobs: BlobStore<C>,
    lock: L,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
    lock_wait: Duration,
}

impl<C: Channel> CounterStore<C> {
    pub fn new(blobs: BlobStore<C>) -> Self {
        Self {
            blobs,
            lock: InMemoryLock::new(),
            retry: RetryPolicy::default(),
            clock: Arc::new(SystemClock),
            lock_wait: DEFAULT_LOCK_WAIT,
        }
    }
}

impl<C: Channel, L: Lock> CounterStore<C, L> {
    /// Replace the mutation lock.
    pub fn with_lock<L2: Lock>(self, lock: L2) -> CounterStore<C, L2> {
        CounterStore {
            blobs: self.blobs,
            lock,
            retry: self.retry,
            clock: self.clock,
            lock_wait: self.lock_wait,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn with_lock_wait(mut self, lock_wait: Duration) -> Self {
        self.lock_wait = lock_wait;
        self
    }

    pub fn blobs(&self) -> &BlobStore<C> {
        &self.blobs
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Count one hit for `key`.
    ///
    /// Conflicts are retried from a fresh load with backoff; once retries run
    /// out the hit is reported as [`StoreError::Unavailable`] and not counted.
    pub fn record_hit(&self, key: &str, meta: &Metadata) -> Result<HitOutcome, StoreError> {
        let _guard = LockGuard::acquire_timeout(&self.lock, self.lock_wait).map_err(|e| match e {
            LockError::TimedOut(waited) => {
                StoreError::Unavailable(format!("mutation lock busy for {waited:?}"))
            }
            other => StoreError::Lock(other),
        })?;

        let mut retry = 0;
        loop {
            match self.apply_once(key, meta) {
                Ok(mut outcome) => {
                    outcome.attempts = retry + 1;
                    debug!(
                        key,
                        is_new = outcome.is_new,
                        views = outcome.record.total_views,
                        attempts = outcome.attempts,
                        "recorded hit"
                    );
                    return Ok(outcome);
                }
                Err(e) if e.is_conflict() && retry < self.retry.max_retries => {
                    let delay = self.retry.backoff(retry);
                    retry += 1;
                    warn!(key, retry, ?delay, error = %e, "snapshot changed underneath, retrying");
                    thread::sleep(delay);
                }
                Err(e) if e.is_conflict() => {
                    error!(key, attempts = retry + 1, "giving up on hit after repeated conflicts");
                    return Err(StoreError::Unavailable(format!(
                        "snapshot kept changing, gave up after {} attempts",
                        retry + 1
                    )));
                }
                Err(e) => return Err(unavailable(e)),
            }
        }
    }

    /// Read the store fresh (never from a cache) and derive aggregates.
    pub fn query(&self) -> Result<Report, StoreError> {
        let snapshot = self.blobs.load().map_err(unavailable)?;
        let stats = SnapshotStats::from_snapshot(&snapshot);
        Ok(Report { snapshot, stats })
    }

    fn apply_once(&self, key: &str, meta: &Metadata) -> Result<HitOutcome, StoreError> {
        let mut snapshot = self.blobs.load()?;
        let expected = snapshot.version().clone();
        let (record, is_new) = snapshot.apply_hit(key, self.clock.now(), meta);
        let version = self.blobs.save(&snapshot, &expected)?;
        Ok(HitOutcome {
            record,
            is_new,
            unique_visitors: snapshot.unique_visitors(),
            total_views: snapshot.total_views(),
            version,
            attempts: 1,
        })
    }
}

fn unavailable(e: StoreError) -> StoreError {
    match e {
        StoreError::Backend(backend) => StoreError::Unavailable(backend.to_string()),
        other => other,
    }
}
