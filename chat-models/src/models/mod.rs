//! Payload model definitions.

pub mod message;
pub mod private_message;
pub mod user;
pub mod wire;

use chat_core::error::{ChatError, ChatResult};

/// Reject empty or whitespace-only identifiers and content.
pub fn require_non_empty(field: &str, value: &str) -> ChatResult<()> {
    if value.trim().is_empty() {
        return Err(ChatError::InvalidArgument(format!("{field} must not be empty")));
    }
    Ok(())
}
