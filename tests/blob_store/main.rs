//! Blob store integration tests against the in-memory channel.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use view_counter::blob::{BlobStore, InMemoryChannel};
use view_counter::{Metadata, Snapshot, StoreError, Version};

const FILE: &str = "views.json";

fn store(channel: &InMemoryChannel) -> BlobStore<InMemoryChannel> {
    BlobStore::new(channel.clone())
}

fn hit(snapshot: &mut Snapshot, key: &str) {
    let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
    snapshot.apply_hit(key, now, &Metadata::unknown());
}

/// Load, apply a hit, save against the loaded version.
fn bump(store: &BlobStore<InMemoryChannel>, key: &str) -> Result<Version, StoreError> {
    let mut snapshot = store.load()?;
    let expected = snapshot.version().clone();
    hit(&mut snapshot, key);
    store.save(&snapshot, &expected)
}

#[test]
fn load_is_idempotent() {
    let channel = InMemoryChannel::new();
    let store = store(&channel);
    bump(&store, "1.2.3.4").unwrap();

    let first = store.load().unwrap();
    let second = store.load().unwrap();
    assert_eq!(first, second);
    assert_eq!(first.version(), second.version());
}

#[test]
fn one_artifact_after_every_save() {
    let channel = InMemoryChannel::new();
    let store = store(&channel);
    for i in 0..5 {
        let version = bump(&store, &format!("10.0.0.{i}")).unwrap();
        let artifacts = channel.artifacts(FILE);
        assert_eq!(artifacts.len(), 1);
        assert_eq!(Some(artifacts[0].id.as_str()), version.id());
    }
    assert_eq!(store.load().unwrap().len(), 5);
}

#[test]
fn unrelated_messages_are_ignored() {
    let channel = InMemoryChannel::new();
    let store = store(&channel);
    bump(&store, "a").unwrap();
    channel.post_text("🔍 New Page View");
    channel.post(b"hello", "notes.txt", "not ours");

    let snapshot = store.load().unwrap();
    assert_eq!(snapshot.len(), 1);
    bump(&store, "b").unwrap();
    assert_eq!(channel.messages().len(), 3);
}

#[test]
fn malformed_artifact_is_surfaced_and_kept() {
    let channel = InMemoryChannel::new();
    let store = store(&channel);
    let posted = channel.post(b"{ not json", FILE, "📊 **Views Updated**");

    let err = store.load().unwrap_err();
    assert!(matches!(err, StoreError::Malformed { ref version, .. } if version == &posted.id));
    assert_eq!(err.status_code(), 500);

    // a writer that never read it cannot replace it either
    let mut fresh = Snapshot::empty();
    hit(&mut fresh, "a");
    assert!(store.save(&fresh, &Version::none()).unwrap_err().is_conflict());

    let artifacts = channel.artifacts(FILE);
    assert_eq!(artifacts.len(), 1);
    assert_eq!(
        channel.file(&artifacts[0].attachments[0].url).unwrap(),
        b"{ not json".to_vec()
    );
}

#[test]
fn duplicate_from_failed_delete_resolves_to_newest() {
    let channel = InMemoryChannel::new();
    let store = store(&channel);
    bump(&store, "a").unwrap();

    channel.fail_next_deletes(1);
    let second = bump(&store, "b").unwrap();
    assert_eq!(channel.artifacts(FILE).len(), 2);

    let snapshot = store.load().unwrap();
    assert_eq!(snapshot.version(), &second);
    assert_eq!(snapshot.len(), 2);

    // the next save collects the leftover
    bump(&store, "c").unwrap();
    assert_eq!(channel.artifacts(FILE).len(), 1);
    assert_eq!(store.load().unwrap().len(), 3);
}

#[test]
fn failed_upload_leaves_store_untouched() {
    let channel = InMemoryChannel::new();
    let store = store(&channel);
    let version = bump(&store, "a").unwrap();

    channel.fail_next_uploads(1);
    assert!(matches!(bump(&store, "b"), Err(StoreError::Backend(_))));

    let snapshot = store.load().unwrap();
    assert_eq!(snapshot.version(), &version);
    assert!(snapshot.get("b").is_none());
}

#[test]
fn unverifiable_upload_is_withdrawn() {
    let channel = InMemoryChannel::new();
    let store = store(&channel);
    let version = bump(&store, "a").unwrap();

    // the pre-check listing succeeds, the verification listing fails
    let armed = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&armed);
    channel.on_upload(move |ch| {
        if flag.swap(false, Ordering::SeqCst) {
            ch.fail_next_lists(1);
        }
    });

    assert!(matches!(bump(&store, "b"), Err(StoreError::Backend(_))));
    channel.clear_upload_hook();

    let snapshot = store.load().unwrap();
    assert_eq!(snapshot.version(), &version);
    assert_eq!(channel.artifacts(FILE).len(), 1);
}

#[test]
fn scan_window_bounds_discovery() {
    let channel = InMemoryChannel::new();
    let store = store(&channel).with_scan_window(5);
    bump(&store, "a").unwrap();
    for i in 0..5 {
        channel.post_text(&format!("chatter {i}"));
    }

    let snapshot = store.load().unwrap();
    assert!(snapshot.is_empty());
    assert!(snapshot.version().is_none());
}

#[test]
fn legacy_artifact_loads_and_is_superseded() {
    let channel = InMemoryChannel::new();
    let store = store(&channel);
    let legacy = br#"{
        "203.0.113.9": {
            "first_viewed": "2024-01-05T10:00:00.123456",
            "last_viewed": "2024-01-06T11:30:00.654321",
            "total_views": 4,
            "region": "Paris, France",
            "device": "Desktop"
        }
    }"#;
    let posted = channel.post(legacy, FILE, "📊 **Views Updated** - Total unique IPs: 1");

    let snapshot = store.load().unwrap();
    assert_eq!(snapshot.version(), &Version::of(posted.id.clone()));
    let record = snapshot.get("203.0.113.9").unwrap();
    assert_eq!(record.total_views, 4);
    assert_eq!(record.timezone, "Unknown");
    assert_eq!(record.region, "Paris, France");

    bump(&store, "203.0.113.9").unwrap();
    let artifacts = channel.artifacts(FILE);
    assert_eq!(artifacts.len(), 1);
    assert_ne!(artifacts[0].id, posted.id);
    assert_eq!(store.load().unwrap().get("203.0.113.9").unwrap().total_views, 5);
}

#[test]
fn stale_version_conflicts() {
    let channel = InMemoryChannel::new();
    let store = store(&channel);
    let mut stale = store.load().unwrap();
    bump(&store, "a").unwrap();

    hit(&mut stale, "b");
    let err = store.save(&stale, &Version::none()).unwrap_err();
    assert!(matches!(err, StoreError::Conflict { ref expected, .. } if expected.is_none()));
    assert_eq!(err.status_code(), 409);
    assert!(store.load().unwrap().get("b").is_none());
}

#[test]
fn concurrent_writer_between_check_and_upload_wins() {
    let channel = InMemoryChannel::new();
    let store = store(&channel);
    let base = bump(&store, "a").unwrap();
    let base_id = base.id().unwrap().to_string();

    // another process publishes from the same base after our version check
    let armed = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&armed);
    let rival_base = base_id.clone();
    channel.on_upload(move |ch| {
        if flag.swap(false, Ordering::SeqCst) {
            ch.post(
                br#"{"rival": {"first_viewed": "2024-03-01T12:00:00Z", "last_viewed": "2024-03-01T12:00:00Z", "total_views": 1}}"#,
                FILE,
                &format!("📊 **Views Updated**\nlineage: {rival_base}"),
            );
        }
    });

    let err = bump(&store, "ours").unwrap_err();
    assert!(err.is_conflict());
    channel.clear_upload_hook();

    // our upload was withdrawn; the rival's is live
    let snapshot = store.load().unwrap();
    assert!(snapshot.get("rival").is_some());
    assert!(snapshot.get("ours").is_none());
    assert_eq!(channel.artifacts(FILE).len(), 2);

    // the next save builds on the rival and clears the base
    bump(&store, "ours").unwrap();
    let snapshot = store.load().unwrap();
    assert!(snapshot.get("rival").is_some());
    assert!(snapshot.get("ours").is_some());
    assert_eq!(channel.artifacts(FILE).len(), 1);
}

#[test]
fn concurrent_first_writers_on_empty_store() {
    let channel = InMemoryChannel::new();
    let store = store(&channel);

    let armed = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&armed);
    channel.on_upload(move |ch| {
        if flag.swap(false, Ordering::SeqCst) {
            ch.post(b"{}", FILE, "📊 **Views Updated**\nlineage:");
        }
    });

    assert!(bump(&store, "late").unwrap_err().is_conflict());
    channel.clear_upload_hook();

    let snapshot = store.load().unwrap();
    assert!(snapshot.is_empty());
    assert!(!snapshot.version().is_none());
}

#[test]
fn upload_posted_despite_transport_error_is_committed() {
    let channel = InMemoryChannel::new();
    let store = store(&channel);
    bump(&store, "a").unwrap();

    channel.lose_next_upload_replies(1);
    let version = bump(&store, "b").unwrap();

    let snapshot = store.load().unwrap();
    assert_eq!(snapshot.version(), &version);
    assert!(snapshot.get("a").is_some());
    assert!(snapshot.get("b").is_some());
    assert_eq!(channel.artifacts(FILE).len(), 1);
}

#[test]
fn upload_posted_despite_transport_error_after_losing_a_race_is_withdrawn() {
    let channel = InMemoryChannel::new();
    let store = store(&channel);
    let base = bump(&store, "a").unwrap();
    let rival_base = base.id().unwrap().to_string();

    let armed = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&armed);
    channel.on_upload(move |ch| {
        if flag.swap(false, Ordering::SeqCst) {
            ch.post(
                br#"{"rival": {"first_viewed": "2024-03-01T12:00:00Z", "last_viewed": "2024-03-01T12:00:00Z", "total_views": 1}}"#,
                FILE,
                &format!("📊 **Views Updated**\nlineage: {rival_base}"),
            );
        }
    });
    channel.lose_next_upload_replies(1);

    assert!(bump(&store, "ours").unwrap_err().is_conflict());
    channel.clear_upload_hook();

    let snapshot = store.load().unwrap();
    assert!(snapshot.get("rival").is_some());
    assert!(snapshot.get("ours").is_none());
    assert_eq!(channel.artifacts(FILE).len(), 2);
}
