//! Outbound hub commands.

use std::sync::{Arc, RwLock};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use chat_core::constants::methods;
use chat_core::error::{ChatError, ChatResult};
use chat_models::{require_non_empty, SendMessageRequest, SendPrivateMessageRequest};

use crate::channel::HubChannel;

/// Slot holding the live channel, shared with the connection manager.
pub(crate) type ChannelSlot = Arc<RwLock<Option<Arc<dyn HubChannel>>>>;

/// Validated pass-through from application calls to hub methods.
///
/// Commands issued while no channel exists are skipped and return `Ok`.
/// Send failures on a live channel are returned to the caller.
#[derive(Clone)]
pub struct OutboundCommandSender {
    channel: ChannelSlot,
}

impl OutboundCommandSender {
    pub(crate) fn new(channel: ChannelSlot) -> Self {
        Self { channel }
    }

    /// Join a public channel as `username`.
    pub async fn join_channel(&self, username: &str, channel: &str) -> ChatResult<()> {
        require_non_empty("username", username)?;
        require_non_empty("channel", channel)?;
        self.invoke(methods::JOIN_CHANNEL, vec![Value::from(username), Value::from(channel)])
            .await
    }

    pub async fn leave_channel(&self, channel: &str) -> ChatResult<()> {
        require_non_empty("channel", channel)?;
        self.invoke(methods::LEAVE_CHANNEL, vec![Value::from(channel)]).await
    }

    /// Post a message to a public channel.
    pub async fn send_message(&self, request: &SendMessageRequest) -> ChatResult<()> {
        request.validate()?;
        self.invoke(methods::SEND_MESSAGE, vec![to_argument(request)?])
            .await
    }

    /// Send a direct message.
    pub async fn send_private_message(&self, request: &SendPrivateMessageRequest) -> ChatResult<()> {
        request.validate()?;
        self.invoke(methods::SEND_PRIVATE_MESSAGE, vec![to_argument(request)?])
            .await
    }

    /// Mark every message received from `sender_username` as read.
    pub async fn mark_private_messages_as_read(&self, sender_username: &str) -> ChatResult<()> {
        require_non_empty("sender_username", sender_username)?;
        self.invoke(
            methods::MARK_PRIVATE_MESSAGES_AS_READ,
            vec![Value::from(sender_username)],
        )
        .await
    }

    async fn invoke(&self, method: &str, args: Vec<Value>) -> ChatResult<()> {
        let channel = self
            .channel
            .read()
            .map_err(|_| ChatError::Internal("channel slot poisoned".into()))?
            .clone();
        let Some(channel) = channel else {
            debug!("no hub channel, skipping {method}");
            return Ok(());
        };
        channel.send(method, args).await?;
        info!("sent {method}");
        Ok(())
    }
}

fn to_argument<T: Serialize>(value: &T) -> ChatResult<Value> {
    Ok(serde_json::to_value(value)?)
}
