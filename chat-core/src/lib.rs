//! ChatHub Core - Foundation types, error handling, configuration, and logging.
//!
//! This crate provides the shared foundation used by the other ChatHub crates:
//! - Client configuration (hub endpoint, reconnect policy, heartbeat)
//! - Global error type covering connection, send, and lifecycle failures
//! - Structured logging with tracing
//! - Platform directory lookup
//! - Hub method names and other constants

pub mod config;
pub mod error;
pub mod logging;
pub mod platform;
pub mod constants;

// Re-export commonly used items at the crate root
pub use config::{AppConfig, ConfigHandle, HubConfig};
pub use error::{ChatError, ChatResult};
pub use logging::init_logging;
pub use platform::Platform;
