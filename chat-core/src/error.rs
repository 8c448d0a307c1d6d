//! Global error types for the ChatHub client.
//!
//! All error categories across the client are unified into a single
//! `ChatError` enum with conversions from underlying library errors.

use thiserror::Error;

/// Convenience type alias for Results using ChatError.
pub type ChatResult<T> = Result<T, ChatError>;

/// Unified error type covering all error categories in ChatHub.
#[derive(Error, Debug)]
pub enum ChatError {
    // -- Configuration errors --
    /// Failed to load or parse client configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// A required configuration value is missing.
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    // -- Connection errors --
    /// The hub connection could not be established, or was lost for good.
    #[error("connection error: {0}")]
    Connection(String),

    /// The server closed the connection.
    #[error("connection closed: {0}")]
    ConnectionClosed(String),

    /// Connecting or handshaking took too long.
    #[error("timeout: {0}")]
    Timeout(String),

    /// The server rejected the bearer token.
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    // -- Send errors --
    /// A single outbound command could not be written to the transport.
    #[error("failed to send {method}: {reason}")]
    Send {
        /// Hub method that was being invoked.
        method: String,
        /// Why the send failed.
        reason: String,
    },

    // -- Lifecycle errors --
    /// `initialize` was called on a manager that already owns a channel.
    #[error("connection manager is already initialized")]
    AlreadyInitialized,

    /// The manager or channel has been disposed.
    #[error("connection manager has been disposed")]
    Disposed,

    /// A handler was bound after the channel started.
    #[error("handlers are sealed, cannot bind {0} after start")]
    HandlersSealed(String),

    /// A second handler was bound for the same inbound event.
    #[error("a handler is already bound for {0}")]
    DuplicateHandler(String),

    // -- Input errors --
    /// A caller-supplied argument failed validation.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    // -- Wire errors --
    /// A hub protocol frame was malformed or unexpected.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// File system operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    // -- Generic --
    /// An unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),

    /// Wrapping anyhow errors for interop.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ChatError {
    /// Build a send error for the given hub method.
    pub fn send(method: impl Into<String>, reason: impl Into<String>) -> Self {
        ChatError::Send {
            method: method.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error means the connection itself is unusable,
    /// as opposed to a single failed operation.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            ChatError::Connection(_)
                | ChatError::ConnectionClosed(_)
                | ChatError::Timeout(_)
                | ChatError::AuthFailed(_)
        )
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(e: serde_json::Error) -> Self {
        ChatError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for ChatError {
    fn from(e: toml::de::Error) -> Self {
        ChatError::Config(e.to_string())
    }
}
