//! Chat Hub - real-time connection manager for the chat hub.
//!
//! This crate owns the client side of the persistent hub connection:
//! - Channel abstraction with write-once inbound handler binding
//! - WebSocket transport speaking the JSON hub protocol
//! - Automatic reconnection with exponential backoff and jitter
//! - Typed routing of inbound events to local listeners
//! - Application heartbeat while the connection is up
//! - Outbound channel and private message commands

pub mod channel;
pub mod commands;
pub mod events;
pub mod heartbeat;
pub mod manager;
pub mod protocol;
pub mod reconnect;
pub mod router;
pub mod ws;

// Re-export key types
pub use channel::{ChannelFactory, ChannelOptions, HandlerRegistry, HubChannel, InboundHandler};
pub use commands::OutboundCommandSender;
pub use events::{ConnectionState, HubEventType};
pub use heartbeat::HeartbeatScheduler;
pub use manager::ConnectionManager;
pub use reconnect::ReconnectConfig;
pub use router::{EventRouter, Listeners, MembershipChange, MuteStatus, PrivateMessageSink};
pub use ws::{WebSocketChannel, WebSocketChannelFactory};
