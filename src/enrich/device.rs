//! User-agent classification by substring match.

use super::UNKNOWN;

/// `Mobile`, `Tablet` or `Desktop`; `Unknown` for an empty user agent.
pub fn classify_device(user_agent: &str) -> &'static str {
    let ua = user_agent.trim().to_ascii_lowercase();
    if ua.is_empty() {
        return UNKNOWN;
    }
    // iPad user agents also carry "Mobile"
    if ua.contains("tablet") || ua.contains("ipad") {
        "Tablet"
    } else if ua.contains("mobile") || ua.contains("android") || ua.contains("iphone") {
        "Mobile"
    } else {
        "Desktop"
    }
}

/// Browser family; order matters since Chromium forks also advertise Chrome and Safari.
pub fn classify_browser(user_agent: &str) -> &'static str {
    let ua = user_agent.trim().to_ascii_lowercase();
    if ua.is_empty() {
        return UNKNOWN;
    }
    if ua.contains("edg/") || ua.contains("edga/") || ua.contains("edgios/") {
        "Edge"
    } else if ua.contains("opr/") || ua.contains("opera") {
        "Opera"
    } else if ua.contains("chrome") || ua.contains("crios") {
        "Chrome"
    } else if ua.contains("firefox") || ua.contains("fxios") {
        "Firefox"
    } else if ua.contains("safari") {
        "Safari"
    } else {
        "Other"
    }
}
