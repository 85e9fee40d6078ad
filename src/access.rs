//! Referrer gate for the tracking endpoint.

/// Admits requests whose `Referer` (or, failing that, `Origin`) starts with
/// the configured prefix. With no prefix configured every request is admitted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReferrerGate {
    allowed_prefix: Option<String>,
}

impl ReferrerGate {
    pub fn new(allowed_prefix: Option<String>) -> Self {
        Self {
            allowed_prefix: allowed_prefix
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty()),
        }
    }

    pub fn open() -> Self {
        Self::default()
    }

    pub fn allowed_prefix(&self) -> Option<&str> {
        self.allowed_prefix.as_deref()
    }

    /// The origin part of the prefix (`scheme://host[:port]`), for CORS.
    pub fn allowed_origin(&self) -> Option<&str> {
        let prefix = self.allowed_prefix.as_deref()?;
        let after_scheme = prefix.find("://").map(|i| i + 3).unwrap_or(0);
        match prefix[after_scheme..].find('/') {
            Some(slash) => Some(&prefix[..after_scheme + slash]),
            None => Some(prefix),
        }
    }

    pub fn check(&self, referer: Option<&str>, origin: Option<&str>) -> bool {
        let Some(prefix) = self.allowed_prefix.as_deref() else {
            return true;
        };
        let candidate = referer.filter(|r| !r.is_empty()).or(origin);
        candidate.is_some_and(|c| c.starts_with(prefix))
    }
}
