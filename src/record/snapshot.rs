use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::visitor::VisitorRecord;
use crate::enrich::Metadata;

/// Opaque token naming the live artifact a snapshot was read from.
///
/// `Version::none()` stands for "no artifact exists yet".
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(transparent)]
pub struct Version(Option<String>);

impl Version {
    pub fn none() -> Self {
        Version(None)
    }

    pub fn of(id: impl Into<String>) -> Self {
        Version(Some(id.into()))
    }

    pub fn id(&self) -> Option<&str> {
        self.0.as_deref()
    }

    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(id) => write!(f, "{}", id),
            None => write!(f, "none"),
        }
    }
}

/// The full durable state: visitor key -> record, plus the version it was loaded at.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Snapshot {
    records: BTreeMap<String, VisitorRecord>,
    version: Version,
    /// Ids of the artifacts the loaded one superseded, nearest first.
    pub(crate) ancestors: Vec<String>,
}

impl Snapshot {
    /// The snapshot of a store that has never been written.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Decode a persisted artifact (a JSON object of key -> record).
    pub fn from_artifact(
        bytes: &[u8],
        version: Version,
        ancestors: Vec<String>,
    ) -> Result<Self, serde_json::Error> {
        let mut records: BTreeMap<String, VisitorRecord> = serde_json::from_slice(bytes)?;
        for (key, record) in records.iter_mut() {
            record.key = key.clone();
        }
        Ok(Self {
            records,
            version,
            ancestors,
        })
    }

    /// Encode the records as the persisted artifact.
    pub fn to_artifact(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec_pretty(&self.records)
    }

    pub fn version(&self) -> &Version {
        &self.version
    }

    pub fn get(&self, key: &str) -> Option<&VisitorRecord> {
        self.records.get(key)
    }

    pub fn records(&self) -> impl Iterator<Item = &VisitorRecord> {
        self.records.values()
    }

    /// Records by key, in the shape they are persisted.
    pub fn as_map(&self) -> &BTreeMap<String, VisitorRecord> {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn unique_visitors(&self) -> usize {
        self.records.len()
    }

    pub fn total_views(&self) -> u64 {
        self.records.values().map(|r| r.total_views).sum()
    }

    /// Apply one hit in memory. Returns the updated record and whether the key was new.
    pub fn apply_hit(
        &mut self,
        key: &str,
        now: DateTime<Utc>,
        meta: &Metadata,
    ) -> (VisitorRecord, bool) {
        match self.records.get_mut(key) {
            Some(record) => {
                record.record_view(now, meta);
                (record.clone(), false)
            }
            None => {
                let record = VisitorRecord::first_hit(key, now, meta);
                self.records.insert(key.to_string(), record.clone());
                (record, true)
            }
        }
    }

    /// The ancestry an artifact superseding this snapshot should record.
    pub(crate) fn successor_lineage(&self, depth: usize) -> Vec<String> {
        let mut lineage = Vec::with_capacity(depth);
        if let Some(id) = self.version.id() {
            lineage.push(id.to_string());
        }
        lineage.extend(self.ancestors.iter().cloned());
        lineage.truncate(depth);
        lineage
    }
}
