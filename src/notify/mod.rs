//! Operator notifications, delivered off the request path.

#[cfg(feature = "remote")]
mod discord;
mod notification;
mod policy;
mod sink;
mod worker;

#[cfg(feature = "remote")]
pub use discord::DiscordSink;
pub use notification::Notification;
pub use policy::NotifyPolicy;
pub use sink::{LogSink, NotificationSink, NotifyError};
pub use worker::{Notifier, NotifierStats, DEFAULT_QUEUE, DEFAULT_WORKERS};
