//! Service configuration from the environment.

use std::env;
use std::fmt::{Debug, Display};
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use crate::blob::{DEFAULT_FILENAME, DEFAULT_SCAN_WINDOW, MAX_SCAN_WINDOW};
use crate::counter::{RetryPolicy, DEFAULT_LOCK_WAIT};
use crate::enrich::DEFAULT_GEO_ENDPOINT;
use crate::identity::IdentityPolicy;
use crate::notify::{NotifyPolicy, DEFAULT_QUEUE, DEFAULT_WORKERS};

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3000";

/// Where notifications go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum NotifyTarget {
    /// An embed in the notification channel.
    #[default]
    Discord,
    /// The service log only.
    Log,
}

impl FromStr for NotifyTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "discord" => Ok(NotifyTarget::Discord),
            "log" => Ok(NotifyTarget::Log),
            other => Err(format!("unknown notify target {other:?}, expected discord or log")),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid {key}={value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} must be set")]
    Missing(&'static str),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub discord_token: Option<String>,
    pub channel_id: Option<String>,
    /// Falls back to `channel_id` when unset.
    pub notify_channel_id: Option<String>,
    pub allowed_referrer: Option<String>,
    pub identity: IdentityPolicy,
    pub artifact_filename: String,
    pub scan_window: usize,
    pub retry: RetryPolicy,
    pub lock_wait: Duration,
    pub enrich_timeout: Duration,
    pub geo_endpoint: String,
    pub notify_policy: NotifyPolicy,
    pub notify_target: NotifyTarget,
    pub notify_workers: usize,
    pub notify_queue: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let scan_window: usize = parse_or(&var, "SCAN_WINDOW", DEFAULT_SCAN_WINDOW)?;
        if !(1..=MAX_SCAN_WINDOW).contains(&scan_window) {
            return Err(ConfigError::Invalid {
                key: "SCAN_WINDOW",
                value: scan_window.to_string(),
                reason: format!("must be between 1 and {MAX_SCAN_WINDOW}"),
            });
        }

        let defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_retries: parse_or(&var, "MAX_RETRIES", defaults.max_retries)?,
            base_backoff: millis_or(&var, "RETRY_BACKOFF_MS", defaults.base_backoff)?,
            max_backoff: millis_or(&var, "RETRY_BACKOFF_MAX_MS", defaults.max_backoff)?,
            jitter: true,
        };

        let channel_id = var("CHANNEL_ID");
        let notify_channel_id = var("NOTIFY_CHANNEL_ID").or_else(|| channel_id.clone());

        Ok(Self {
            bind_addr: string_or(&var, "BIND_ADDR", DEFAULT_BIND_ADDR),
            discord_token: var("DISCORD_BOT_TOKEN"),
            channel_id,
            notify_channel_id,
            allowed_referrer: var("ALLOWED_REFERRER"),
            identity: parse_or(&var, "IDENTITY_POLICY", IdentityPolicy::default())?,
            artifact_filename: string_or(&var, "ARTIFACT_FILENAME", DEFAULT_FILENAME),
            scan_window,
            retry,
            lock_wait: millis_or(&var, "LOCK_WAIT_MS", DEFAULT_LOCK_WAIT)?,
            enrich_timeout: millis_or(&var, "ENRICH_TIMEOUT_MS", Duration::from_secs(3))?,
            geo_endpoint: string_or(&var, "GEO_ENDPOINT", DEFAULT_GEO_ENDPOINT),
            notify_policy: parse_or(&var, "NOTIFY_POLICY", NotifyPolicy::default())?,
            notify_target: parse_or(&var, "NOTIFY_TARGET", NotifyTarget::default())?,
            notify_workers: parse_or(&var, "NOTIFY_WORKERS", DEFAULT_WORKERS)?,
            notify_queue: parse_or(&var, "NOTIFY_QUEUE", DEFAULT_QUEUE)?,
        })
    }

    /// Bot token and storage channel, required to run against Discord.
    pub fn discord_credentials(&self) -> Result<(&str, &str), ConfigError> {
        let token = self
            .discord_token
            .as_deref()
            .ok_or(ConfigError::Missing("DISCORD_BOT_TOKEN"))?;
        let channel = self
            .channel_id
            .as_deref()
            .ok_or(ConfigError::Missing("CHANNEL_ID"))?;
        Ok((token, channel))
    }
}

fn string_or<V>(var: &V, key: &str, default: &str) -> String
where
    V: Fn(&str) -> Option<String>,
{
    var(key).unwrap_or_else(|| {
        info!("{key} not set, using default: {default}");
        default.to_string()
    })
}

fn parse_or<V, T>(var: &V, key: &'static str, default: T) -> Result<T, ConfigError>
where
    V: Fn(&str) -> Option<String>,
    T: FromStr + Debug,
    T::Err: Display,
{
    match var(key) {
        None => {
            info!("{key} not set, using default: {default:?}");
            Ok(default)
        }
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            key,
            reason: e.to_string(),
            value,
        }),
    }
}

fn millis_or<V>(var: &V, key: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    V: Fn(&str) -> Option<String>,
{
    let default_ms = u64::try_from(default.as_millis()).unwrap_or(u64::MAX);
    parse_or(var, key, default_ms).map(Duration::from_millis)
}
