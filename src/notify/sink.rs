use thiserror::Error;
use tracing::info;

use super::Notification;
use crate::blob::BackendError;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification delivery failed: {0}")]
    Delivery(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("failed to start notifier worker: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Somewhere an operator reads about hits.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Writes notifications to the log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, n: &Notification) -> Result<(), NotifyError> {
        info!(
            page = %n.page,
            region = %n.region,
            device = %n.device,
            browser = %n.browser,
            visitor = %n.visitor_id,
            visitor_views = n.visitor_views,
            total_views = n.total_views,
            unique_visitors = n.unique_visitors,
            is_new = n.is_new,
            "{}",
            n.title()
        );
        Ok(())
    }
}
