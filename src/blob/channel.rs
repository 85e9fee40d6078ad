use thiserror::Error;

/// A file attached to a channel message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub url: String,
}

/// A message as returned by [`Channel::list_recent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelMessage {
    pub id: String,
    /// Monotonic position in the channel (a snowflake for Discord, a counter in memory).
    pub ordinal: u64,
    /// The message text posted alongside the attachments.
    pub caption: String,
    pub attachments: Vec<Attachment>,
}

impl ChannelMessage {
    pub fn has_attachment(&self, filename: &str) -> bool {
        self.attachments.iter().any(|a| a.filename == filename)
    }

    pub fn attachment(&self, filename: &str) -> Option<&Attachment> {
        self.attachments.iter().find(|a| a.filename == filename)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Connection, TLS or timeout failure.
    #[error("channel transport failed: {0}")]
    Transport(String),

    /// The message or attachment no longer exists.
    #[error("channel resource not found: {0}")]
    NotFound(String),

    /// The service answered with a non-success status.
    #[error("channel returned status {status}: {body}")]
    Status { status: u16, body: String },

    /// The service answered with something we could not understand.
    #[error("unexpected channel response: {0}")]
    Decode(String),
}

/// The primitives a messaging channel offers: list, fetch, upload, delete.
///
/// There is no compare-and-swap and no lookup by id that survives restarts;
/// [`BlobStore`](super::BlobStore) builds versioned storage on top of these.
pub trait Channel: Send + Sync {
    /// The most recent `limit` messages, in any order.
    fn list_recent(&self, limit: usize) -> Result<Vec<ChannelMessage>, BackendError>;

    /// Download an attachment.
    fn fetch(&self, url: &str) -> Result<Vec<u8>, BackendError>;

    /// Post a new message carrying one file attachment.
    fn upload(
        &self,
        content: &[u8],
        filename: &str,
        caption: &str,
    ) -> Result<ChannelMessage, BackendError>;

    /// Delete a message. Returns `false` if it was already gone.
    fn delete(&self, id: &str) -> Result<bool, BackendError>;
}

impl<C: Channel + ?Sized> Channel for std::sync::Arc<C> {
    fn list_recent(&self, limit: usize) -> Result<Vec<ChannelMessage>, BackendError> {
        (**self).list_recent(limit)
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>, BackendError> {
        (**self).fetch(url)
    }

    fn upload(
        &self,
        content: &[u8],
        filename: &str,
        caption: &str,
    ) -> Result<ChannelMessage, BackendError> {
        (**self).upload(content, filename, caption)
    }

    fn delete(&self, id: &str) -> Result<bool, BackendError> {
        (**self).delete(id)
    }
}
