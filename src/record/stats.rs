use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::snapshot::Snapshot;

const TOP_LIMIT: usize = 10;
const RECENT_LIMIT: usize = 50;

/// Aggregates derived from a snapshot for the stats endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotStats {
    pub total_views: u64,
    pub total_unique_visitors: usize,
    pub top_regions: Vec<Bucket>,
    pub top_devices: Vec<Bucket>,
    pub recent_visitors: Vec<RecentVisitor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Bucket {
    pub name: String,
    pub views: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentVisitor {
    pub visitor_id: String,
    pub last_viewed: DateTime<Utc>,
    pub total_views: u64,
    pub region: String,
    pub device: String,
}

impl SnapshotStats {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let mut regions: HashMap<&str, u64> = HashMap::new();
        let mut devices: HashMap<&str, u64> = HashMap::new();
        for record in snapshot.records() {
            *regions.entry(record.region.as_str()).or_default() += record.total_views;
            *devices.entry(record.device.as_str()).or_default() += record.total_views;
        }

        let mut recent: Vec<_> = snapshot.records().collect();
        recent.sort_by(|a, b| b.last_viewed.cmp(&a.last_viewed).then(a.key.cmp(&b.key)));
        let recent_visitors = recent
            .into_iter()
            .take(RECENT_LIMIT)
            .map(|r| RecentVisitor {
                visitor_id: r.visitor_id(),
                last_viewed: r.last_viewed,
                total_views: r.total_views,
                region: r.region.clone(),
                device: r.device.clone(),
            })
            .collect();

        Self {
            total_views: snapshot.total_views(),
            total_unique_visitors: snapshot.unique_visitors(),
            top_regions: top(regions),
            top_devices: top(devices),
            recent_visitors,
        }
    }
}

fn top(counts: HashMap<&str, u64>) -> Vec<Bucket> {
    let mut buckets: Vec<Bucket> = counts
        .into_iter()
        .map(|(name, views)| Bucket {
            name: name.to_string(),
            views,
        })
        .collect();
    buckets.sort_by(|a, b| b.views.cmp(&a.views).then_with(|| a.name.cmp(&b.name)));
    buckets.truncate(TOP_LIMIT);
    buckets
}
