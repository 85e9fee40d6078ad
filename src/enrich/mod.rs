//! Geolocation and user-agent classification for a hit.
//!
//! Everything here is best effort: [`Enrichment::resolve`] always returns a
//! [`Metadata`], substituting [`UNKNOWN`] for anything it could not learn in time.

mod device;
mod geo;
#[cfg(feature = "remote")]
mod ip_api;
mod service;

pub use device::{classify_browser, classify_device};
pub use geo::{is_local, EnrichError, GeoLookup, Location, DEFAULT_GEO_ENDPOINT};
#[cfg(feature = "remote")]
pub use ip_api::IpApiClient;
pub use service::{Enrichment, Metadata};

/// Placeholder for metadata that could not be determined.
pub const UNKNOWN: &str = "Unknown";
