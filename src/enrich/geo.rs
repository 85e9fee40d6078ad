use std::net::IpAddr;
use std::time::Duration;

use thiserror::Error;

use super::UNKNOWN;

/// ip-api.com JSON endpoint; the client appends `/{ip}`.
pub const DEFAULT_GEO_ENDPOINT: &str = "http://ip-api.com/json";

#[derive(Debug, Error)]
pub enum EnrichError {
    #[error("geolocation transport failed: {0}")]
    Transport(String),

    #[error("geolocation lookup failed for {ip}: {reason}")]
    Lookup { ip: String, reason: String },

    #[error("geolocation timed out after {0:?}")]
    Timeout(Duration),
}

/// Where an address appears to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Location {
    pub city: String,
    pub country: String,
    pub timezone: String,
}

impl Location {
    /// Placeholder for loopback and private-network clients.
    pub fn local() -> Self {
        Self {
            city: "Local".into(),
            country: "Local".into(),
            timezone: "Local".into(),
        }
    }

    /// `"City, Country"`, collapsing to whichever half is known.
    pub fn region(&self) -> String {
        let known = |s: &str| !s.is_empty() && s != UNKNOWN;
        match (known(&self.city), known(&self.country)) {
            _ if self.city == "Local" && self.country == "Local" => "Local".into(),
            (true, true) => format!("{}, {}", self.city, self.country),
            (true, false) => self.city.clone(),
            (false, true) => self.country.clone(),
            (false, false) => UNKNOWN.into(),
        }
    }
}

/// IP geolocation provider.
pub trait GeoLookup: Send + Sync {
    fn locate(&self, ip: &str) -> Result<Location, EnrichError>;
}

/// Addresses that never reach a geolocation provider.
pub fn is_local(ip: &str) -> bool {
    if ip.eq_ignore_ascii_case("localhost") {
        return true;
    }
    match ip.parse::<IpAddr>() {
        Ok(IpAddr::V4(v4)) => v4.is_loopback() || v4.is_private() || v4.is_link_local(),
        Ok(IpAddr::V6(v6)) => v6.is_loopback() || (v6.segments()[0] & 0xfe00) == 0xfc00,
        Err(_) => false,
    }
}
