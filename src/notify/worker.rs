//! Bounded notification pool.
//!
//! Requests hand notifications to [`Notifier::submit`], which never blocks:
//! when the queue is full the notification is dropped and counted. A fixed
//! set of worker threads delivers to the sink. [`Notifier::shutdown`] closes
//! the queue, lets the workers drain what is already queued and joins them.
//!
//! ```ignore
//! use std::sync::Arc;
//! use view_counter::notify::{LogSink, Notifier};
//!
//! let notifier = Notifier::spawn(Arc::new(LogSink), 2, 64)?;
//! notifier.submit(notification);
//!
//! let stats = notifier.shutdown();
//! println!("delivered {} notifications", stats.delivered);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use super::{Notification, NotificationSink, NotifyError};

pub const DEFAULT_WORKERS: usize = 2;
pub const DEFAULT_QUEUE: usize = 64;

/// Delivery counters, cumulative since the pool started.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NotifierStats {
    pub delivered: u64,
    pub failed: u64,
    pub dropped: u64,
}

#[derive(Default)]
struct Counters {
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> NotifierStats {
        NotifierStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

pub struct Notifier {
    queue: Mutex<Option<SyncSender<Notification>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<Counters>,
}

impl Notifier {
    /// Start `workers` threads (at least one) behind a queue of `capacity`.
    pub fn spawn(
        sink: Arc<dyn NotificationSink>,
        workers: usize,
        capacity: usize,
    ) -> Result<Self, NotifyError> {
        let (tx, rx) = sync_channel(capacity.max(1));
        let rx = Arc::new(Mutex::new(rx));
        let counters = Arc::new(Counters::default());

        let handles = (0..workers.max(1))
            .map(|i| {
                let rx = Arc::clone(&rx);
                let sink = Arc::clone(&sink);
                let counters = Arc::clone(&counters);
                thread::Builder::new()
                    .name(format!("notifier-{i}"))
                    .spawn(move || run(rx, sink, counters))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            queue: Mutex::new(Some(tx)),
            workers: Mutex::new(handles),
            counters,
        })
    }

    /// Queue a notification. Returns `false` if it was dropped.
    pub fn submit(&self, notification: Notification) -> bool {
        let queue = match self.queue.lock() {
            Ok(queue) => queue,
            Err(poisoned) => poisoned.into_inner(),
        };
        let Some(tx) = queue.as_ref() else {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            debug!("notifier is shut down, dropping notification");
            return false;
        };
        match tx.try_send(notification) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("notification queue full, dropping notification");
                false
            }
            Err(TrySendError::Disconnected(_)) => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                warn!("notifier workers are gone, dropping notification");
                false
            }
        }
    }

    pub fn stats(&self) -> NotifierStats {
        self.counters.snapshot()
    }

    /// Close the queue, wait for queued notifications to be delivered, and
    /// return the final counters. Later calls return immediately.
    pub fn shutdown(&self) -> NotifierStats {
        self.close();
        let handles = match self.workers.lock() {
            Ok(mut workers) => std::mem::take(&mut *workers),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for handle in handles {
            if handle.join().is_err() {
                warn!("notifier worker panicked");
            }
        }
        self.counters.snapshot()
    }

    fn close(&self) {
        match self.queue.lock() {
            Ok(mut queue) => drop(queue.take()),
            Err(poisoned) => drop(poisoned.into_inner().take()),
        }
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        // Don't join on drop; workers exit once the queue is drained
        self.close();
    }
}

fn run(rx: Arc<Mutex<Receiver<Notification>>>, sink: Arc<dyn NotificationSink>, counters: Arc<Counters>) {
    loop {
        let next = match rx.lock() {
            Ok(rx) => rx.recv(),
            Err(_) => break,
        };
        let Ok(notification) = next else {
            break;
        };

        match sink.notify(&notification) {
            Ok(()) => {
                counters.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!(visitor = %notification.visitor_id, error = %e, "notification failed");
            }
        }
    }
}
