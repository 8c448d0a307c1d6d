//! Inbound event routing.
//!
//! The [`EventRouter`] binds one handler per inbound hub event on the
//! channel. Public channel events are decoded into typed payloads and
//! emitted to local [`Listeners`]; private message events are forwarded to
//! a single [`PrivateMessageSink`] that owns their storage and fan-out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace, warn};

use chat_core::error::{ChatError, ChatResult};
use chat_models::{Message, MessageId, PrivateMessage, User};

use crate::channel::HubChannel;
use crate::events::HubEventType;

/// Identifies a listener registered with [`Listeners::subscribe`].
pub type SubscriptionId = u64;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Ordered multicast listener list for one event kind.
///
/// Callbacks run in registration order on the channel's dispatch task, so
/// they should hand heavy work off rather than block.
pub struct Listeners<T> {
    next_id: AtomicU64,
    callbacks: RwLock<Vec<(SubscriptionId, Callback<T>)>>,
}

impl<T> Default for Listeners<T> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            callbacks: RwLock::new(Vec::new()),
        }
    }
}

impl<T> Listeners<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback. It receives every later emission.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut callbacks) = self.callbacks.write() {
            callbacks.push((id, Arc::new(callback)));
        }
        id
    }

    /// Remove a callback. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        match self.callbacks.write() {
            Ok(mut callbacks) => {
                let before = callbacks.len();
                callbacks.retain(|(existing, _)| *existing != id);
                callbacks.len() != before
            }
            Err(_) => false,
        }
    }

    /// Invoke every callback with `value`. Returns how many ran.
    pub fn emit(&self, value: &T) -> usize {
        // Snapshot so callbacks may subscribe or unsubscribe re-entrantly.
        let snapshot: Vec<Callback<T>> = match self.callbacks.read() {
            Ok(callbacks) => callbacks.iter().map(|(_, cb)| cb.clone()).collect(),
            Err(_) => return 0,
        };
        for callback in &snapshot {
            callback(value);
        }
        snapshot.len()
    }

    pub fn len(&self) -> usize {
        self.callbacks.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A user joined or left a channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipChange {
    pub username: String,
    pub channel: String,
}

/// Mute state of a channel changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MuteStatus {
    pub channel: String,
    pub is_muted: bool,
}

/// Receiver of private message events.
///
/// Implemented by the service that stores conversations and notifies the
/// rest of the application.
pub trait PrivateMessageSink: Send + Sync {
    /// A private message addressed to this user arrived.
    fn on_private_message_received(&self, message: PrivateMessage);

    /// The server confirmed a private message this user sent.
    fn on_private_message_sent(&self, message: PrivateMessage);

    /// `username` read the listed messages this user sent them.
    fn on_private_messages_read(&self, username: String, message_ids: Vec<MessageId>);
}

/// Dispatches inbound hub events to typed listeners.
pub struct EventRouter {
    message_received: Listeners<Message>,
    user_joined: Listeners<MembershipChange>,
    user_left: Listeners<MembershipChange>,
    user_list_updated: Listeners<Vec<User>>,
    channel_mute_status_changed: Listeners<MuteStatus>,
    message_blocked: Listeners<String>,
    private_sink: Option<Arc<dyn PrivateMessageSink>>,
}

impl Default for EventRouter {
    fn default() -> Self {
        Self::new(None)
    }
}

impl EventRouter {
    pub fn new(private_sink: Option<Arc<dyn PrivateMessageSink>>) -> Self {
        Self {
            message_received: Listeners::new(),
            user_joined: Listeners::new(),
            user_left: Listeners::new(),
            user_list_updated: Listeners::new(),
            channel_mute_status_changed: Listeners::new(),
            message_blocked: Listeners::new(),
            private_sink,
        }
    }

    pub fn on_message_received(&self) -> &Listeners<Message> {
        &self.message_received
    }

    pub fn on_user_joined(&self) -> &Listeners<MembershipChange> {
        &self.user_joined
    }

    pub fn on_user_left(&self) -> &Listeners<MembershipChange> {
        &self.user_left
    }

    pub fn on_user_list_updated(&self) -> &Listeners<Vec<User>> {
        &self.user_list_updated
    }

    pub fn on_channel_mute_status_changed(&self) -> &Listeners<MuteStatus> {
        &self.channel_mute_status_changed
    }

    pub fn on_message_blocked(&self) -> &Listeners<String> {
        &self.message_blocked
    }

    /// Bind a handler for every inbound event on `channel`.
    ///
    /// Must run before the channel starts; the channel rejects bindings
    /// afterwards.
    pub fn bind(self: &Arc<Self>, channel: &dyn HubChannel) -> ChatResult<()> {
        for event in HubEventType::all() {
            let router = Arc::clone(self);
            let target = event.as_str().to_string();
            channel.on(&target, Arc::new(move |args| router.route(&event, args)))?;
        }
        debug!("bound {} hub event handlers", HubEventType::all().len());
        Ok(())
    }

    /// Decode and dispatch one inbound event.
    ///
    /// Payloads that fail to decode are logged and dropped.
    pub fn route(&self, event: &HubEventType, args: Vec<Value>) {
        trace!("routing {event}");
        if let Err(e) = self.try_route(event, &args) {
            warn!("dropping {event} event: {e}");
        }
    }

    fn try_route(&self, event: &HubEventType, args: &[Value]) -> ChatResult<()> {
        match event {
            HubEventType::ReceiveMessage => {
                let message: Message = arg(event, args, 0)?;
                self.message_received.emit(&message);
            }
            HubEventType::UserJoined => {
                let change = MembershipChange {
                    username: arg(event, args, 0)?,
                    channel: arg(event, args, 1)?,
                };
                self.user_joined.emit(&change);
            }
            HubEventType::UserLeft => {
                let change = MembershipChange {
                    username: arg(event, args, 0)?,
                    channel: arg(event, args, 1)?,
                };
                self.user_left.emit(&change);
            }
            HubEventType::UpdateUserList => {
                let users: Vec<User> = arg(event, args, 0)?;
                self.user_list_updated.emit(&users);
            }
            HubEventType::ChannelMuteStatusChanged => {
                let status = MuteStatus {
                    channel: arg(event, args, 0)?,
                    is_muted: arg(event, args, 1)?,
                };
                self.channel_mute_status_changed.emit(&status);
            }
            HubEventType::MessageBlocked => {
                let reason: String = arg(event, args, 0)?;
                self.message_blocked.emit(&reason);
            }
            HubEventType::ReceivePrivateMessage => {
                let message: PrivateMessage = arg(event, args, 0)?;
                match &self.private_sink {
                    Some(sink) => sink.on_private_message_received(message),
                    None => debug!("no private message sink for {event}"),
                }
            }
            HubEventType::PrivateMessageSent => {
                let message: PrivateMessage = arg(event, args, 0)?;
                match &self.private_sink {
                    Some(sink) => sink.on_private_message_sent(message),
                    None => debug!("no private message sink for {event}"),
                }
            }
            HubEventType::PrivateMessagesRead => {
                let username: String = arg(event, args, 0)?;
                let message_ids: Vec<MessageId> = arg(event, args, 1)?;
                match &self.private_sink {
                    Some(sink) => sink.on_private_messages_read(username, message_ids),
                    None => debug!("no private message sink for {event}"),
                }
            }
        }
        Ok(())
    }
}

/// Decode positional argument `index` of `event`.
fn arg<T: DeserializeOwned>(event: &HubEventType, args: &[Value], index: usize) -> ChatResult<T> {
    let value = args.get(index).ok_or_else(|| {
        ChatError::Protocol(format!("{event} is missing argument {index}"))
    })?;
    T::deserialize(value)
        .map_err(|e| ChatError::Protocol(format!("{event} argument {index}: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn test_listeners_run_in_registration_order() {
        let listeners: Listeners<u32> = Listeners::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let seen = seen.clone();
            listeners.subscribe(move |v: &u32| seen.lock().unwrap().push((tag, *v)));
        }

        assert_eq!(listeners.emit(&7), 3);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![("first", 7), ("second", 7), ("third", 7)]
        );
    }

    #[test]
    fn test_listeners_unsubscribe() {
        let listeners: Listeners<u32> = Listeners::new();
        let id = listeners.subscribe(|_| {});
        listeners.subscribe(|_| {});
        assert_eq!(listeners.len(), 2);

        assert!(listeners.unsubscribe(id));
        assert!(!listeners.unsubscribe(id));
        assert_eq!(listeners.emit(&1), 1);
    }

    #[test]
    fn test_emit_without_listeners_is_noop() {
        let listeners: Listeners<String> = Listeners::new();
        assert!(listeners.is_empty());
        assert_eq!(listeners.emit(&"x".to_string()), 0);
    }

    #[test]
    fn test_route_mute_status() {
        let router = EventRouter::default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        router
            .on_channel_mute_status_changed()
            .subscribe(move |s: &MuteStatus| sink.lock().unwrap().push(s.clone()));

        router.route(
            &HubEventType::ChannelMuteStatusChanged,
            vec![json!("general"), json!(true)],
        );

        assert_eq!(
            *seen.lock().unwrap(),
            vec![MuteStatus {
                channel: "general".into(),
                is_muted: true
            }]
        );
    }

    #[test]
    fn test_route_bad_payload_is_dropped() {
        let router = EventRouter::default();
        let count = Arc::new(Mutex::new(0));
        let c = count.clone();
        router.on_user_joined().subscribe(move |_| *c.lock().unwrap() += 1);

        router.route(&HubEventType::UserJoined, vec![json!("alice")]);
        router.route(&HubEventType::UserJoined, vec![json!(1), json!(2)]);
        assert_eq!(*count.lock().unwrap(), 0);

        router.route(&HubEventType::UserJoined, vec![json!("alice"), json!("general")]);
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn test_route_private_events_without_sink() {
        let router = EventRouter::default();
        router.route(
            &HubEventType::PrivateMessagesRead,
            vec![json!("bob"), json!([1, 2, 3])],
        );
    }
}
