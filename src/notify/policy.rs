use std::fmt;
use std::str::FromStr;

/// Which hits produce a notification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NotifyPolicy {
    EveryHit,
    #[default]
    NewVisitorsOnly,
    Off,
}

impl NotifyPolicy {
    pub fn should_notify(&self, is_new: bool) -> bool {
        match self {
            NotifyPolicy::EveryHit => true,
            NotifyPolicy::NewVisitorsOnly => is_new,
            NotifyPolicy::Off => false,
        }
    }
}

impl fmt::Display for NotifyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NotifyPolicy::EveryHit => "every_hit",
            NotifyPolicy::NewVisitorsOnly => "new_visitors",
            NotifyPolicy::Off => "off",
        })
    }
}

impl FromStr for NotifyPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "every_hit" | "every-hit" | "all" => Ok(NotifyPolicy::EveryHit),
            "new_visitors" | "new-visitors" | "new" => Ok(NotifyPolicy::NewVisitorsOnly),
            "off" | "none" | "disabled" => Ok(NotifyPolicy::Off),
            other => Err(format!(
                "unknown notify policy {other:?}, expected every_hit, new_visitors or off"
            )),
        }
    }
}
