//! Private (direct) message models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use chat_core::error::ChatResult;

use super::require_non_empty;
use super::wire::{self, MessageId};

/// A direct message between two users.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PrivateMessage {
    pub id: MessageId,
    pub sender_username: String,
    pub recipient_username: String,
    pub content: String,
    #[serde(default, deserialize_with = "wire::timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_read: bool,
}

/// Request body for the `SendPrivateMessage` hub method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendPrivateMessageRequest {
    pub recipient_username: String,
    pub content: String,
}

impl SendPrivateMessageRequest {
    pub fn new(recipient_username: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            recipient_username: recipient_username.into(),
            content: content.into(),
        }
    }

    pub fn validate(&self) -> ChatResult<()> {
        require_non_empty("recipient_username", &self.recipient_username)?;
        require_non_empty("content", &self.content)
    }
}
