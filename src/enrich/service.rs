use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::debug;

use super::device::{classify_browser, classify_device};
use super::geo::{is_local, EnrichError, GeoLookup, Location};
use super::UNKNOWN;

/// Best-effort metadata attached to a hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Metadata {
    pub region: String,
    pub timezone: String,
    pub device: String,
    pub browser: String,
}

impl Metadata {
    /// Every field set to the `Unknown` placeholder.
    pub fn unknown() -> Self {
        Self {
            region: UNKNOWN.into(),
            timezone: UNKNOWN.into(),
            device: UNKNOWN.into(),
            browser: UNKNOWN.into(),
        }
    }
}

impl Default for Metadata {
    fn default() -> Self {
        Self::unknown()
    }
}

/// Resolves metadata for a hit without ever failing or blocking past its deadline.
#[derive(Clone)]
pub struct Enrichment {
    geo: Option<Arc<dyn GeoLookup>>,
    timeout: Duration,
}

impl Enrichment {
    pub fn new(geo: Arc<dyn GeoLookup>, timeout: Duration) -> Self {
        Self {
            geo: Some(geo),
            timeout,
        }
    }

    /// Device/browser classification only; region and timezone stay `Unknown`.
    pub fn disabled() -> Self {
        Self {
            geo: None,
            timeout: Duration::ZERO,
        }
    }

    pub fn resolve(&self, ip: &str, user_agent: Option<&str>) -> Metadata {
        let ua = user_agent.unwrap_or_default();
        let mut meta = Metadata {
            device: classify_device(ua).to_string(),
            browser: classify_browser(ua).to_string(),
            ..Metadata::unknown()
        };

        match self.locate(ip) {
            Ok(Some(location)) => {
                meta.region = location.region();
                if !location.timezone.is_empty() {
                    meta.timezone = location.timezone;
                }
            }
            Ok(None) => {}
            Err(e) => debug!(ip, error = %e, "enrichment unavailable, using placeholders"),
        }
        meta
    }

    fn locate(&self, ip: &str) -> Result<Option<Location>, EnrichError> {
        if is_local(ip) {
            return Ok(Some(Location::local()));
        }
        let Some(geo) = self.geo.clone() else {
            return Ok(None);
        };

        // The lookup runs on its own thread so a hung provider cannot hold the hit.
        let (tx, rx) = mpsc::channel();
        let owned_ip = ip.to_string();
        thread::Builder::new()
            .name("geo-lookup".into())
            .spawn(move || {
                let _ = tx.send(geo.locate(&owned_ip));
            })
            .map_err(|e| EnrichError::Transport(e.to_string()))?;

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result.map(Some),
            Err(RecvTimeoutError::Timeout) => Err(EnrichError::Timeout(self.timeout)),
            Err(RecvTimeoutError::Disconnected) => Err(EnrichError::Lookup {
                ip: ip.to_string(),
                reason: "lookup thread exited without a result".into(),
            }),
        }
    }
}
