//! Hub event names and connection state.
//!
//! Defines every inbound event the chat hub pushes to the client and the
//! lifecycle states of the hub connection.

/// All inbound events emitted by the chat hub.
///
/// These map 1:1 to the hub's invocation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HubEventType {
    /// A public channel message (`ReceiveMessage`).
    ReceiveMessage,
    /// A user joined a channel (`UserJoined`).
    UserJoined,
    /// A user left a channel (`UserLeft`).
    UserLeft,
    /// The member list of the current channel changed (`UpdateUserList`).
    UpdateUserList,
    /// A channel was muted or unmuted for this user (`ChannelMuteStatusChanged`).
    ChannelMuteStatusChanged,
    /// The server refused to relay a message (`MessageBlocked`).
    MessageBlocked,
    /// A private message addressed to this user (`ReceivePrivateMessage`).
    ReceivePrivateMessage,
    /// Echo of a private message this user sent (`PrivateMessageSent`).
    PrivateMessageSent,
    /// The recipient read some of this user's private messages (`PrivateMessagesRead`).
    PrivateMessagesRead,
}

impl HubEventType {
    /// Convert to the hub invocation target.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ReceiveMessage => "ReceiveMessage",
            Self::UserJoined => "UserJoined",
            Self::UserLeft => "UserLeft",
            Self::UpdateUserList => "UpdateUserList",
            Self::ChannelMuteStatusChanged => "ChannelMuteStatusChanged",
            Self::MessageBlocked => "MessageBlocked",
            Self::ReceivePrivateMessage => "ReceivePrivateMessage",
            Self::PrivateMessageSent => "PrivateMessageSent",
            Self::PrivateMessagesRead => "PrivateMessagesRead",
        }
    }

    /// Every event the client binds a handler for before starting the channel.
    pub fn all() -> [HubEventType; 9] {
        [
            Self::ReceiveMessage,
            Self::UserJoined,
            Self::UserLeft,
            Self::UpdateUserList,
            Self::ChannelMuteStatusChanged,
            Self::MessageBlocked,
            Self::ReceivePrivateMessage,
            Self::PrivateMessageSent,
            Self::PrivateMessagesRead,
        ]
    }
}

impl std::fmt::Display for HubEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Connection state of the hub channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Built but never started.
    Unstarted,
    /// Initial connect and handshake in progress.
    Connecting,
    /// Connected and receiving events.
    Connected,
    /// Connection lost, automatic reconnection in progress.
    Reconnecting,
    /// Connection lost for good; reconnection gave up or was not allowed.
    Disconnected,
    /// Torn down by its owner. Terminal.
    Disposed,
}

impl ConnectionState {
    /// Whether no further transition can happen without a new instance.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Disposed)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unstarted => write!(f, "unstarted"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Reconnecting => write!(f, "reconnecting"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::Disposed => write!(f, "disposed"),
        }
    }
}
