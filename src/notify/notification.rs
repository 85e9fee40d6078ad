use chrono::{DateTime, Utc};

use crate::counter::HitOutcome;
use crate::enrich::Metadata;

/// Summary of one recorded hit, for humans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub page: String,
    pub region: String,
    pub timezone: String,
    pub device: String,
    pub browser: String,
    /// First 8 characters of the visitor key.
    pub visitor_id: String,
    pub visitor_views: u64,
    pub total_views: u64,
    pub unique_visitors: usize,
    pub is_new: bool,
    pub timestamp: DateTime<Utc>,
}

impl Notification {
    /// Build from the outcome of a hit and the metadata resolved for the request.
    pub fn from_hit(page: impl Into<String>, outcome: &HitOutcome, meta: &Metadata) -> Self {
        let record = &outcome.record;
        Self {
            page: page.into(),
            region: meta.region.clone(),
            timezone: meta.timezone.clone(),
            device: meta.device.clone(),
            browser: meta.browser.clone(),
            visitor_id: record.visitor_id(),
            visitor_views: record.total_views,
            total_views: outcome.total_views,
            unique_visitors: outcome.unique_visitors,
            is_new: outcome.is_new,
            timestamp: record.last_viewed,
        }
    }

    pub fn title(&self) -> &'static str {
        if self.is_new {
            "🔍 New Visitor"
        } else {
            "🔍 New Page View"
        }
    }
}
