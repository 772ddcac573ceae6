//! Archived post record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::format::{render_message, MessageEntity};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Photo,
    Video,
}

/// One archived post. Optional fields are written as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    /// Sanitized HTML with `<br>` line breaks
    pub text: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub media_type: Option<MediaType>,
    /// Id of the message this post was built from
    #[serde(default)]
    pub message_id: Option<i64>,
}

impl Post {
    pub fn new(text: impl Into<String>, date: DateTime<Utc>) -> Self {
        Self {
            text: text.into(),
            date,
            media_url: None,
            media_type: None,
            message_id: None,
        }
    }

    /// Build a post from a raw source message, rendering its entities to HTML.
    pub fn from_message(message: &SourceMessage) -> Self {
        Self {
            text: render_message(&message.text, &message.entities),
            date: message.date,
            media_url: message.media_url.clone(),
            media_type: message.media_type,
            message_id: message.message_id,
        }
    }

    pub fn with_media(mut self, url: impl Into<String>, media_type: MediaType) -> Self {
        self.media_url = Some(url.into());
        self.media_type = Some(media_type);
        self
    }

    pub fn with_message_id(mut self, id: i64) -> Self {
        self.message_id = Some(id);
        self
    }

    pub fn has_media(&self) -> bool {
        self.media_url.is_some()
    }
}

/// Unrendered message as delivered by the ingestion tooling
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMessage {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub entities: Vec<MessageEntity>,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub media_url: Option<String>,
    #[serde(default)]
    pub media_type: Option<MediaType>,
    #[serde(default)]
    pub message_id: Option<i64>,
}

impl SourceMessage {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.media_url.is_none()
    }
}
