//! Visitor records and the snapshot that holds them.

mod snapshot;
mod stats;
mod visitor;

pub use snapshot::{Snapshot, Version};
pub use stats::{Bucket, RecentVisitor, SnapshotStats};
pub use visitor::VisitorRecord;
