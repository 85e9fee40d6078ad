use std::fmt;
use std::str::FromStr;

use sha2::{Digest, Sha256};

/// How hits are folded into visitors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentityPolicy {
    /// One visitor per client IP.
    #[default]
    ByIp,
    /// One visitor per (IP, user agent) pair, keyed by a SHA-256 hex digest.
    ///
    /// Separates users behind a shared NAT, but splits one user across browsers.
    ByIpAndAgent,
}

impl IdentityPolicy {
    /// The visitor key for a hit.
    pub fn visitor_key(&self, ip: &str, user_agent: Option<&str>) -> String {
        match self {
            IdentityPolicy::ByIp => ip.to_string(),
            IdentityPolicy::ByIpAndAgent => {
                let mut hasher = Sha256::new();
                hasher.update(ip.as_bytes());
                hasher.update(b":");
                hasher.update(user_agent.unwrap_or_default().as_bytes());
                hex::encode(hasher.finalize())
            }
        }
    }
}

/// Display id for a visitor key: the first 8 hex chars of its SHA-256.
///
/// Stable for a key under either policy, and never reveals the address.
pub fn visitor_id(key: &str) -> String {
    let digest = Sha256::digest(key.as_bytes());
    hex::encode(&digest[..4])
}

impl fmt::Display for IdentityPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdentityPolicy::ByIp => write!(f, "ip"),
            IdentityPolicy::ByIpAndAgent => write!(f, "ip_agent"),
        }
    }
}

impl FromStr for IdentityPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ip" | "by_ip" => Ok(IdentityPolicy::ByIp),
            "ip_agent" | "ip+agent" | "by_ip_and_agent" => Ok(IdentityPolicy::ByIpAndAgent),
            other => Err(format!("unknown identity policy {other:?} (expected ip or ip_agent)")),
        }
    }
}
