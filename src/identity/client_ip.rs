use std::net::IpAddr;

/// Header carrying the proxy chain, client first.
pub const FORWARDED_FOR: &str = "x-forwarded-for";
/// Header carrying the single client address set by some proxies.
pub const REAL_IP: &str = "x-real-ip";

/// Resolve the client address for a request.
///
/// Precedence: leftmost `X-Forwarded-For` entry, then `X-Real-IP`, then the
/// socket peer. The headers are trusted as-is; this is only sound behind a
/// reverse proxy that sets them.
pub fn client_ip(
    forwarded_for: Option<&str>,
    real_ip: Option<&str>,
    peer: Option<IpAddr>,
) -> Option<String> {
    let first_forwarded = forwarded_for
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty());
    let real = real_ip.map(str::trim).filter(|v| !v.is_empty());

    first_forwarded
        .or(real)
        .map(str::to_string)
        .or_else(|| peer.map(|ip| ip.to_string()))
}
