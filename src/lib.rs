pub mod access;
pub mod blob;
pub mod clock;
pub mod config;
pub mod counter;
pub mod enrich;
mod error;
#[cfg(feature = "http")]
pub mod http;
pub mod identity;
pub mod lock;
pub mod notify;
pub mod record;
mod tracker;

pub use access::ReferrerGate;
pub use blob::{BackendError, BlobStore, Channel, InMemoryChannel};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, ConfigError};
pub use counter::{CounterStore, HitOutcome, Report, RetryPolicy};
pub use enrich::{Enrichment, Metadata};
pub use error::StoreError;
#[cfg(feature = "http")]
pub use http::{ApiError, AppState};
pub use identity::{visitor_id, IdentityPolicy};
pub use notify::{Notification, NotificationSink, Notifier, NotifyPolicy};
pub use record::{Snapshot, SnapshotStats, Version, VisitorRecord};
pub use tracker::{Hit, TrackOutcome, Tracker};

#[cfg(feature = "remote")]
pub use blob::DiscordChannel;
