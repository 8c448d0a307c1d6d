//! Public channel message models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use chat_core::error::ChatResult;

use super::require_non_empty;
use super::wire::{self, MessageId};

/// A message posted to a public channel, as broadcast by the hub.
///
/// Only the text fields are required. `id` and `timestamp` are kept when the
/// hub sends something usable and left empty otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    #[serde(default)]
    pub id: Option<MessageId>,
    pub username: String,
    pub channel: String,
    pub content: String,
    #[serde(default, deserialize_with = "wire::timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Request body for the `SendMessage` hub method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendMessageRequest {
    pub username: String,
    pub channel: String,
    pub content: String,
}

impl SendMessageRequest {
    pub fn new(
        username: impl Into<String>,
        channel: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            channel: channel.into(),
            content: content.into(),
        }
    }

    /// Check that every field carries a value.
    pub fn validate(&self) -> ChatResult<()> {
        require_non_empty("username", &self.username)?;
        require_non_empty("channel", &self.channel)?;
        require_non_empty("content", &self.content)
    }
}
