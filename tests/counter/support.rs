#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use view_counter::blob::{BlobStore, InMemoryChannel};
use view_counter::{CounterStore, ManualClock, Metadata, RetryPolicy};

pub const FILE: &str = "views.json";

pub fn start() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, 1, 9, 0, 0).unwrap()
}

/// A counter over `channel` with a clock that ticks a second per read and no backoff.
pub fn counter(channel: &InMemoryChannel) -> CounterStore<InMemoryChannel> {
    CounterStore::new(BlobStore::new(channel.clone()))
        .with_retry(RetryPolicy::immediate(3))
        .with_clock(ManualClock::new(start()).with_step(Duration::seconds(1)))
}

/// Another process records a hit for `key`, posting straight to the channel.
pub fn rival_hit(channel: &InMemoryChannel, key: &str) {
    let mut snapshot = BlobStore::new(channel.clone()).load().unwrap();
    let base = snapshot.version().id().unwrap_or_default().to_string();
    snapshot.apply_hit(key, Utc::now(), &Metadata::unknown());
    let body = snapshot.to_artifact().unwrap();
    channel.post(&body, FILE, &format!("📊 **Views Updated**\nlineage: {base}"));
}

/// Make a rival hit land inside each of the next `times` uploads.
pub fn rivals_on_upload(channel: &InMemoryChannel, key: &'static str, times: usize) -> Arc<AtomicUsize> {
    let remaining = Arc::new(AtomicUsize::new(times));
    let counter = Arc::clone(&remaining);
    channel.on_upload(move |ch| {
        if counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            rival_hit(ch, key);
        }
    });
    remaining
}
