//! Application-wide constants.

/// Application name.
pub const APP_NAME: &str = "ChatHub";

/// Application version.
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Path appended to the base URL when no explicit hub URL is configured.
pub const HUB_PATH: &str = "/chathub";

/// Interval between application heartbeats.
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;

/// Default limit on connect + handshake in milliseconds.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 15_000;

/// Silence from the server longer than this is treated as a dropped connection.
pub const DEFAULT_SERVER_TIMEOUT_MS: u64 = 30_000;

/// Interval between protocol-level pings sent by the client.
pub const DEFAULT_KEEP_ALIVE_INTERVAL_MS: u64 = 15_000;

/// Default reconnection attempts before giving up.
pub const DEFAULT_RECONNECT_ATTEMPTS: u32 = 4;

/// Outbound hub methods (client -> server).
pub mod methods {
    pub const JOIN_CHANNEL: &str = "JoinChannel";
    pub const LEAVE_CHANNEL: &str = "LeaveChannel";
    pub const SEND_MESSAGE: &str = "SendMessage";
    pub const SEND_PRIVATE_MESSAGE: &str = "SendPrivateMessage";
    pub const MARK_PRIVATE_MESSAGES_AS_READ: &str = "MarkPrivateMessagesAsRead";
    pub const PING: &str = "Ping";

    /// All outbound method names.
    pub const ALL: &[&str] = &[
        JOIN_CHANNEL,
        LEAVE_CHANNEL,
        SEND_MESSAGE,
        SEND_PRIVATE_MESSAGE,
        MARK_PRIVATE_MESSAGES_AS_READ,
        PING,
    ];
}
