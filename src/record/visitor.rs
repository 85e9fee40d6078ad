use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::enrich::{Metadata, UNKNOWN};
use crate::identity;

/// One entry per distinct visitor key.
///
/// The key itself is the map key in the persisted artifact, so it is not
/// serialized with the record; [`Snapshot`](super::Snapshot) fills it in on decode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VisitorRecord {
    #[serde(skip)]
    pub key: String,
    #[serde(with = "timestamp")]
    pub first_viewed: DateTime<Utc>,
    #[serde(with = "timestamp")]
    pub last_viewed: DateTime<Utc>,
    pub total_views: u64,
    #[serde(default = "unknown")]
    pub region: String,
    #[serde(default = "unknown")]
    pub timezone: String,
    #[serde(default = "unknown")]
    pub device: String,
}

fn unknown() -> String {
    UNKNOWN.to_string()
}

impl VisitorRecord {
    /// A record for a visitor seen for the first time at `now`.
    pub fn first_hit(key: impl Into<String>, now: DateTime<Utc>, meta: &Metadata) -> Self {
        Self {
            key: key.into(),
            first_viewed: now,
            last_viewed: now,
            total_views: 1,
            region: meta.region.clone(),
            timezone: meta.timezone.clone(),
            device: meta.device.clone(),
        }
    }

    /// Fold one more hit into the record.
    ///
    /// `last_viewed` never moves backwards, and metadata already known is kept;
    /// only `Unknown` fields are filled from `meta`.
    pub fn record_view(&mut self, now: DateTime<Utc>, meta: &Metadata) {
        self.total_views = self.total_views.saturating_add(1);
        if now > self.last_viewed {
            self.last_viewed = now;
        }
        fill_unknown(&mut self.region, &meta.region);
        fill_unknown(&mut self.timezone, &meta.timezone);
        fill_unknown(&mut self.device, &meta.device);
    }

    /// Short digest of the key, safe to show to operators and clients.
    pub fn visitor_id(&self) -> String {
        identity::visitor_id(&self.key)
    }
}

fn fill_unknown(field: &mut String, candidate: &str) {
    if field == UNKNOWN && candidate != UNKNOWN && !candidate.is_empty() {
        *field = candidate.to_string();
    }
}

/// RFC 3339 on the way out; on the way in also accepts the naive ISO-8601
/// timestamps (no offset, assumed UTC) found in artifacts from older deployments.
mod timestamp {
    use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Micros, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(parsed.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
            .map(|naive| naive.and_utc())
            .map_err(|e| de::Error::custom(format!("invalid timestamp {raw:?}: {e}")))
    }
}
