//! ip-api.com geolocation over blocking HTTP.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::Deserialize;

use super::geo::{EnrichError, GeoLookup, Location};
use super::UNKNOWN;

#[derive(Debug, Deserialize)]
struct IpApiResponse {
    status: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    city: Option<String>,
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    timezone: Option<String>,
}

pub struct IpApiClient {
    http: Client,
    endpoint: String,
}

impl IpApiClient {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, EnrichError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| EnrichError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
        })
    }
}

impl GeoLookup for IpApiClient {
    fn locate(&self, ip: &str) -> Result<Location, EnrichError> {
        let url = format!("{}/{}", self.endpoint, ip);
        let body: IpApiResponse = self
            .http
            .get(&url)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(|e| EnrichError::Transport(e.to_string()))?;

        if body.status != "success" {
            return Err(EnrichError::Lookup {
                ip: ip.to_string(),
                reason: body.message.unwrap_or(body.status),
            });
        }

        let or_unknown = |v: Option<String>| v.unwrap_or_else(|| UNKNOWN.to_string());
        Ok(Location {
            city: or_unknown(body.city),
            country: or_unknown(body.country),
            timezone: or_unknown(body.timezone),
        })
    }
}
