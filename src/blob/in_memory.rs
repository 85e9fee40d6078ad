use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::channel::{Attachment, BackendError, Channel, ChannelMessage};

type UploadHook = Arc<dyn Fn(&InMemoryChannel) + Send + Sync>;

/// In-memory channel for tests and local development.
///
/// Clone-friendly (cloning shares the same underlying messages). Faults can
/// be injected per operation, and an upload hook lets a test act as a
/// concurrent writer at the worst possible moment: after the caller's
/// version check, before its upload lands.
#[derive(Clone, Default)]
pub struct InMemoryChannel {
    state: Arc<Mutex<ChannelState>>,
    hook: Arc<Mutex<Option<UploadHook>>>,
}

#[derive(Default)]
struct ChannelState {
    messages: Vec<ChannelMessage>,
    files: HashMap<String, Vec<u8>>,
    next_ordinal: u64,
    failing_lists: usize,
    failing_uploads: usize,
    lost_upload_replies: usize,
    failing_deletes: usize,
    uploads: usize,
    deletes: usize,
}

impl InMemoryChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, ChannelState> {
        // a panicking test thread must not take the channel down with it
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Post a message with an attachment, bypassing hooks and injected faults.
    pub fn post(&self, content: &[u8], filename: &str, caption: &str) -> ChannelMessage {
        let mut state = self.state();
        state.next_ordinal += 1;
        let ordinal = state.next_ordinal;
        let id = ordinal.to_string();
        let url = format!("memory://{id}/{filename}");
        state.files.insert(url.clone(), content.to_vec());
        let message = ChannelMessage {
            id,
            ordinal,
            caption: caption.to_string(),
            attachments: vec![Attachment {
                filename: filename.to_string(),
                url,
            }],
        };
        state.messages.push(message.clone());
        message
    }

    /// Post a plain text message with no attachment.
    pub fn post_text(&self, caption: &str) -> ChannelMessage {
        let mut state = self.state();
        state.next_ordinal += 1;
        let ordinal = state.next_ordinal;
        let message = ChannelMessage {
            id: ordinal.to_string(),
            ordinal,
            caption: caption.to_string(),
            attachments: Vec::new(),
        };
        state.messages.push(message.clone());
        message
    }

    /// Every live message, oldest first.
    pub fn messages(&self) -> Vec<ChannelMessage> {
        self.state().messages.clone()
    }

    /// Live messages carrying `filename`, oldest first.
    pub fn artifacts(&self, filename: &str) -> Vec<ChannelMessage> {
        self.state()
            .messages
            .iter()
            .filter(|m| m.has_attachment(filename))
            .cloned()
            .collect()
    }

    /// Raw attachment bytes, if the message still exists.
    pub fn file(&self, url: &str) -> Option<Vec<u8>> {
        self.state().files.get(url).cloned()
    }

    pub fn fail_next_lists(&self, n: usize) {
        self.state().failing_lists = n;
    }

    pub fn fail_next_uploads(&self, n: usize) {
        self.state().failing_uploads = n;
    }

    /// Let the next `n` uploads post their message, then report a timeout.
    pub fn lose_next_upload_replies(&self, n: usize) {
        self.state().lost_upload_replies = n;
    }

    pub fn fail_next_deletes(&self, n: usize) {
        self.state().failing_deletes = n;
    }

    /// Successful uploads so far (hooks and `post` excluded).
    pub fn upload_count(&self) -> usize {
        self.state().uploads
    }

    /// Successful deletes so far.
    pub fn delete_count(&self) -> usize {
        self.state().deletes
    }

    /// Run `hook` at the start of every `upload`, before the message is posted.
    pub fn on_upload<F>(&self, hook: F)
    where
        F: Fn(&InMemoryChannel) + Send + Sync + 'static,
    {
        *self.hook.lock().unwrap_or_else(|p| p.into_inner()) = Some(Arc::new(hook));
    }

    pub fn clear_upload_hook(&self) {
        *self.hook.lock().unwrap_or_else(|p| p.into_inner()) = None;
    }
}

fn injected(counter: &mut usize, op: &str) -> Result<(), BackendError> {
    if *counter > 0 {
        *counter -= 1;
        return Err(BackendError::Transport(format!("injected {op} failure")));
    }
    Ok(())
}

impl Channel for InMemoryChannel {
    fn list_recent(&self, limit: usize) -> Result<Vec<ChannelMessage>, BackendError> {
        let mut state = self.state();
        injected(&mut state.failing_lists, "list")?;
        Ok(state.messages.iter().rev().take(limit).cloned().collect())
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>, BackendError> {
        self.state()
            .files
            .get(url)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(url.to_string()))
    }

    fn upload(
        &self,
        content: &[u8],
        filename: &str,
        caption: &str,
    ) -> Result<ChannelMessage, BackendError> {
        let hook = self.hook.lock().unwrap_or_else(|p| p.into_inner()).clone();
        if let Some(hook) = hook {
            hook(self);
        }

        {
            let mut state = self.state();
            injected(&mut state.failing_uploads, "upload")?;
            state.uploads += 1;
        }
        let message = self.post(content, filename, caption);
        injected(&mut self.state().lost_upload_replies, "upload reply")?;
        Ok(message)
    }

    fn delete(&self, id: &str) -> Result<bool, BackendError> {
        let mut state = self.state();
        injected(&mut state.failing_deletes, "delete")?;
        let Some(pos) = state.messages.iter().position(|m| m.id == id) else {
            return Ok(false);
        };
        let removed = state.messages.remove(pos);
        for attachment in &removed.attachments {
            state.files.remove(&attachment.url);
        }
        state.deletes += 1;
        Ok(true)
    }
}
