//! Counter store integration tests.

mod support;

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use support::{counter, rival_hit, rivals_on_upload, start, FILE};
use view_counter::blob::InMemoryChannel;
use view_counter::enrich::{EnrichError, GeoLookup, Location, UNKNOWN};
use view_counter::{Enrichment, Hit, Metadata, RetryPolicy, StoreError, Tracker};

#[test]
fn scenario_two_visitors() {
    let channel = InMemoryChannel::new();
    let counter = counter(&channel);

    let first = counter.record_hit("1.2.3.4", &Metadata::unknown()).unwrap();
    assert_eq!(first.record.total_views, 1);
    assert_eq!(counter.query().unwrap().snapshot.len(), 1);

    let second = counter.record_hit("1.2.3.4", &Metadata::unknown()).unwrap();
    assert_eq!(second.record.total_views, 2);
    assert_eq!(counter.query().unwrap().snapshot.len(), 1);

    counter.record_hit("5.6.7.8", &Metadata::unknown()).unwrap();
    let report = counter.query().unwrap();
    assert_eq!(report.snapshot.len(), 2);
    assert_eq!(report.stats.total_views, 3);
    assert_eq!(report.stats.total_unique_visitors, 2);
    assert_eq!(channel.artifacts(FILE).len(), 1);
}

#[test]
fn new_then_returning_visitor() {
    let channel = InMemoryChannel::new();
    let counter = counter(&channel);

    let first = counter.record_hit("9.9.9.9", &Metadata::unknown()).unwrap();
    assert!(first.is_new);
    assert_eq!(first.record.total_views, 1);
    assert_eq!(first.record.first_viewed, start());
    assert_eq!(first.record.first_viewed, first.record.last_viewed);

    let second = counter.record_hit("9.9.9.9", &Metadata::unknown()).unwrap();
    assert!(!second.is_new);
    assert_eq!(second.record.total_views, 2);
    assert_eq!(second.record.first_viewed, first.record.first_viewed);
    assert!(second.record.last_viewed > second.record.first_viewed);
}

#[test]
fn concurrent_hits_are_not_lost() {
    let channel = InMemoryChannel::new();
    let counter = Arc::new(counter(&channel));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let counter = Arc::clone(&counter);
            thread::spawn(move || {
                for _ in 0..5 {
                    counter.record_hit("1.1.1.1", &Metadata::unknown()).unwrap();
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let report = counter.query().unwrap();
    assert_eq!(report.snapshot.len(), 1);
    assert_eq!(report.snapshot.get("1.1.1.1").unwrap().total_views, 40);
    assert_eq!(channel.artifacts(FILE).len(), 1);
}

#[test]
fn separate_processes_never_lose_or_invent_hits() {
    // each store has its own lock, as two replicas would
    let channel = InMemoryChannel::new();
    let stores: Vec<_> = (0..3)
        .map(|_| Arc::new(counter(&channel).with_retry(RetryPolicy::immediate(20))))
        .collect();

    let handles: Vec<_> = stores
        .iter()
        .map(|store| {
            let store = Arc::clone(store);
            thread::spawn(move || {
                (0..10)
                    .filter(|_| store.record_hit("2.2.2.2", &Metadata::unknown()).is_ok())
                    .count() as u64
            })
        })
        .collect();
    let succeeded: u64 = handles.into_iter().map(|h| h.join().unwrap()).sum();

    let report = stores[0].query().unwrap();
    let views = report.snapshot.get("2.2.2.2").map_or(0, |r| r.total_views);
    assert_eq!(views, succeeded);
    assert!(succeeded > 0);
}

#[test]
fn conflict_retry_applies_hit_on_latest_state() {
    let channel = InMemoryChannel::new();
    let counter = counter(&channel);
    counter.record_hit("me", &Metadata::unknown()).unwrap();

    let remaining = rivals_on_upload(&channel, "rival", 2);
    let outcome = counter.record_hit("me", &Metadata::unknown()).unwrap();
    channel.clear_upload_hook();

    assert_eq!(remaining.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(outcome.record.total_views, 2);

    let snapshot = counter.query().unwrap().snapshot;
    assert_eq!(snapshot.get("me").unwrap().total_views, 2);
    assert_eq!(snapshot.get("rival").unwrap().total_views, 2);
    assert_eq!(snapshot.total_views(), 4);
    assert_eq!(channel.artifacts(FILE).len(), 1);
}

#[test]
fn exhausted_retries_are_unavailable() {
    let channel = InMemoryChannel::new();
    let counter = counter(&channel);

    rivals_on_upload(&channel, "rival", usize::MAX);
    let err = counter.record_hit("me", &Metadata::unknown()).unwrap_err();
    channel.clear_upload_hook();

    assert!(matches!(err, StoreError::Unavailable(_)));
    assert_eq!(err.status_code(), 503);

    // one rival hit per attempt: the first plus three retries
    let snapshot = counter.query().unwrap().snapshot;
    assert!(snapshot.get("me").is_none());
    assert_eq!(snapshot.get("rival").unwrap().total_views, 4);
}

#[test]
fn query_never_serves_a_stale_copy() {
    let channel = InMemoryChannel::new();
    let counter = counter(&channel);
    counter.record_hit("me", &Metadata::unknown()).unwrap();
    assert_eq!(counter.query().unwrap().stats.total_views, 1);

    rival_hit(&channel, "rival");
    let report = counter.query().unwrap();
    assert_eq!(report.stats.total_views, 2);
    assert_eq!(report.stats.total_unique_visitors, 2);
}

#[test]
fn backend_outage_is_unavailable_and_not_counted() {
    let channel = InMemoryChannel::new();
    let counter = counter(&channel);
    counter.record_hit("me", &Metadata::unknown()).unwrap();

    channel.fail_next_uploads(1);
    let err = counter.record_hit("me", &Metadata::unknown()).unwrap_err();
    assert!(matches!(err, StoreError::Unavailable(_)));
    assert_eq!(counter.query().unwrap().snapshot.get("me").unwrap().total_views, 1);
    assert_eq!(channel.artifacts(FILE).len(), 1);
}

#[test]
fn lost_upload_reply_counts_the_hit_once_and_reports_it() {
    let channel = InMemoryChannel::new();
    let counter = counter(&channel);
    counter.record_hit("1.2.3.4", &Metadata::unknown()).unwrap();

    channel.lose_next_upload_replies(1);
    let outcome = counter.record_hit("1.2.3.4", &Metadata::unknown()).unwrap();
    assert_eq!(outcome.record.total_views, 2);
    assert_eq!(outcome.attempts, 1);

    let report = counter.query().unwrap();
    assert_eq!(report.snapshot.get("1.2.3.4").unwrap().total_views, 2);
    assert_eq!(report.snapshot.version(), &outcome.version);
    assert_eq!(channel.artifacts(FILE).len(), 1);
}

#[test]
fn malformed_artifact_is_not_overwritten() {
    let channel = InMemoryChannel::new();
    channel.post(b"[1, 2, 3]", FILE, "📊 **Views Updated**");
    let counter = counter(&channel);

    let err = counter.record_hit("me", &Metadata::unknown()).unwrap_err();
    assert!(matches!(err, StoreError::Malformed { .. }));
    assert_eq!(channel.upload_count(), 0);
    assert!(counter.query().is_err());
}

struct Failing;

impl GeoLookup for Failing {
    fn locate(&self, ip: &str) -> Result<Location, EnrichError> {
        Err(EnrichError::Lookup {
            ip: ip.to_string(),
            reason: "quota exceeded".into(),
        })
    }
}

struct Hanging;

impl GeoLookup for Hanging {
    fn locate(&self, _ip: &str) -> Result<Location, EnrichError> {
        thread::sleep(Duration::from_secs(5));
        Ok(Location {
            city: "Too".into(),
            country: "Late".into(),
            timezone: "UTC".into(),
        })
    }
}

fn tracked_without_agent(enrichment: Enrichment) -> view_counter::VisitorRecord {
    let channel = InMemoryChannel::new();
    let tracker = Tracker::new(counter(&channel)).with_enrichment(enrichment);
    let outcome = tracker
        .track(&Hit {
            client_ip: "93.184.216.34".into(),
            user_agent: None,
            page: "/".into(),
        })
        .unwrap();
    outcome.hit.record
}

#[test]
fn enrichment_error_falls_back_to_placeholders() {
    let record = tracked_without_agent(Enrichment::new(Arc::new(Failing), Duration::from_secs(1)));
    assert_eq!(record.total_views, 1);
    assert_eq!(record.region, UNKNOWN);
    assert_eq!(record.timezone, UNKNOWN);
    assert_eq!(record.device, UNKNOWN);
}

#[test]
fn enrichment_timeout_falls_back_to_placeholders() {
    let started = std::time::Instant::now();
    let record =
        tracked_without_agent(Enrichment::new(Arc::new(Hanging), Duration::from_millis(50)));
    assert!(started.elapsed() < Duration::from_secs(4));
    assert_eq!(record.region, UNKNOWN);
    assert_eq!(record.device, UNKNOWN);
}
