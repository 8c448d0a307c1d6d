//! ChatHub Models - Payload records exchanged with the chat hub.
//!
//! These are plain data records. The connection layer routes them by event
//! name and never inspects their fields; the only logic here is argument
//! validation for outbound requests.

pub mod models;

// Re-export key types
pub use models::message::{Message, SendMessageRequest};
pub use models::private_message::{PrivateMessage, SendPrivateMessageRequest};
pub use models::wire::MessageId;
pub use models::user::User;
pub use models::require_non_empty;
