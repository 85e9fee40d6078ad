//! Time source for visitor timestamps.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};

/// Supplies the current time to the counter store.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to, or by a fixed step on every read.
///
/// Clone-friendly (cloning shares the same underlying instant).
#[derive(Debug, Clone)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

#[derive(Debug)]
struct ManualState {
    now: DateTime<Utc>,
    step: Duration,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState {
                now: start,
                step: Duration::zero(),
            })),
        }
    }

    /// Advance by `step` after every `now()` call.
    pub fn with_step(self, step: Duration) -> Self {
        if let Ok(mut state) = self.state.lock() {
            state.step = step;
        }
        self
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut state) = self.state.lock() {
            state.now += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        match self.state.lock() {
            Ok(mut state) => {
                let now = state.now;
                let step = state.step;
                state.now = now + step;
                now
            }
            Err(poisoned) => poisoned.into_inner().now,
        }
    }
}
