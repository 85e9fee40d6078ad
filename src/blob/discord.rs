//! Discord channel transport over the bot REST API (blocking).

use std::time::Duration;

use reqwest::blocking::{multipart, Client, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::json;

use super::channel::{Attachment, BackendError, Channel, ChannelMessage};

pub const DISCORD_API: &str = "https://discord.com/api/v10";

#[derive(Debug, Deserialize)]
struct WireMessage {
    id: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    attachments: Vec<WireAttachment>,
}

#[derive(Debug, Deserialize)]
struct WireAttachment {
    filename: String,
    url: String,
}

impl WireMessage {
    fn into_message(self) -> Result<ChannelMessage, BackendError> {
        // snowflakes are time-ordered
        let ordinal = self
            .id
            .parse::<u64>()
            .map_err(|_| BackendError::Decode(format!("message id {:?} is not a snowflake", self.id)))?;
        Ok(ChannelMessage {
            id: self.id,
            ordinal,
            caption: self.content,
            attachments: self
                .attachments
                .into_iter()
                .map(|a| Attachment {
                    filename: a.filename,
                    url: a.url,
                })
                .collect(),
        })
    }
}

/// A Discord text channel authenticated with a bot token.
pub struct DiscordChannel {
    http: Client,
    api: String,
    token: String,
    channel_id: String,
}

impl DiscordChannel {
    pub fn new(token: impl Into<String>, channel_id: impl Into<String>) -> Result<Self, BackendError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(transport)?;
        Ok(Self {
            http,
            api: DISCORD_API.to_string(),
            token: token.into(),
            channel_id: channel_id.into(),
        })
    }

    /// Point at a different API root (a proxy or a mock server).
    pub fn with_api_base(mut self, api: impl Into<String>) -> Self {
        self.api = api.into().trim_end_matches('/').to_string();
        self
    }

    pub fn channel_id(&self) -> &str {
        &self.channel_id
    }

    fn messages_url(&self) -> String {
        format!("{}/channels/{}/messages", self.api, self.channel_id)
    }

    fn auth(&self) -> String {
        format!("Bot {}", self.token)
    }

    /// Post a JSON message body (text and/or embeds) without attachments.
    pub fn post_json(&self, body: &serde_json::Value) -> Result<(), BackendError> {
        let response = self
            .http
            .post(self.messages_url())
            .header("Authorization", self.auth())
            .json(body)
            .send()
            .map_err(transport)?;
        check(response).map(|_| ())
    }
}

fn transport(e: reqwest::Error) -> BackendError {
    BackendError::Transport(e.to_string())
}

fn check(response: Response) -> Result<Response, BackendError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let url = response.url().to_string();
    let body = response.text().unwrap_or_default();
    if status == StatusCode::NOT_FOUND {
        return Err(BackendError::NotFound(url));
    }
    Err(BackendError::Status {
        status: status.as_u16(),
        body,
    })
}

impl Channel for DiscordChannel {
    fn list_recent(&self, limit: usize) -> Result<Vec<ChannelMessage>, BackendError> {
        let response = self
            .http
            .get(self.messages_url())
            .query(&[("limit", limit.clamp(1, 100))])
            .header("Authorization", self.auth())
            .send()
            .map_err(transport)?;
        let wire: Vec<WireMessage> = check(response)?
            .json()
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        wire.into_iter().map(WireMessage::into_message).collect()
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>, BackendError> {
        let response = self.http.get(url).send().map_err(transport)?;
        let bytes = check(response)?.bytes().map_err(transport)?;
        Ok(bytes.to_vec())
    }

    fn upload(
        &self,
        content: &[u8],
        filename: &str,
        caption: &str,
    ) -> Result<ChannelMessage, BackendError> {
        let file = multipart::Part::bytes(content.to_vec())
            .file_name(filename.to_string())
            .mime_str("application/json")
            .map_err(transport)?;
        let form = multipart::Form::new()
            .text("payload_json", json!({ "content": caption }).to_string())
            .part("files[0]", file);

        let response = self
            .http
            .post(self.messages_url())
            .header("Authorization", self.auth())
            .multipart(form)
            .send()
            .map_err(transport)?;
        let wire: WireMessage = check(response)?
            .json()
            .map_err(|e| BackendError::Decode(e.to_string()))?;
        wire.into_message()
    }

    fn delete(&self, id: &str) -> Result<bool, BackendError> {
        let response = self
            .http
            .delete(format!("{}/{}", self.messages_url(), id))
            .header("Authorization", self.auth())
            .send()
            .map_err(transport)?;
        match check(response) {
            Ok(_) => Ok(true),
            Err(BackendError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}
