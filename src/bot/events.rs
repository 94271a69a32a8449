//! Bot-facing event vocabulary and its fan-out.
//!
//! Application code consumes [`BotEvent`]s through receivers obtained from
//! [`EventEmitter::subscribe`]. Each receiver has its own queue, so a slow or
//! failing consumer never holds up the others or the bot.

use std::fmt;

use log::{trace, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::BotError;

/// Events buffered per subscriber before the oldest ones are dropped.
const EVENT_CAPACITY: usize = 1024;

/// Membership of a user in a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Membership {
    Invite,
    Join,
    Leave,
    Ban,
}

impl fmt::Display for Membership {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Membership::Invite => "invite",
            Membership::Join => "join",
            Membership::Leave => "leave",
            Membership::Ban => "ban",
        };
        f.write_str(value)
    }
}

/// A membership change of `user_id` in `room_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomMembershipEvent {
    pub room_id: String,
    pub user_id: String,
    pub membership: Membership,
}

/// Content of a message event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContent {
    /// Text body, empty when the event carries none
    pub body: String,
    pub msgtype: String,
    /// The content object as sent, formatted body and relations included
    pub fields: serde_json::Value,
}

impl MessageContent {
    /// Reads `body` and `msgtype` out of a content object.
    ///
    /// Returns `None` when `msgtype` is missing or not a string.
    pub fn from_fields(fields: serde_json::Value) -> Option<Self> {
        let msgtype = fields.get("msgtype")?.as_str()?.to_owned();
        let body = fields
            .get("body")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_owned();

        Some(MessageContent {
            body,
            msgtype,
            fields,
        })
    }
}

/// Who sent a message, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sender {
    pub user_id: String,
    pub room_id: String,
}

/// A message surfaced to the application.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageEnvelope {
    pub content: MessageContent,
    pub sender: Sender,
    /// The event as received from the homeserver
    pub raw_event: serde_json::Value,
}

/// Events emitted by a [`crate::BasicBot`].
#[derive(Debug, Clone, PartialEq)]
pub enum BotEvent {
    /// The first sync completed and automatic actions are installed.
    Connected,
    /// A fault raised outside of a caller's request.
    Error(BotError),
    /// A room membership changed.
    Membership(RoomMembershipEvent),
    /// A message arrived in an unencrypted room.
    Message(MessageEnvelope),
    /// A message arrived in an encrypted room.
    E2eMessage(MessageEnvelope),
}

/// One-to-many publisher of [`BotEvent`]s.
#[derive(Debug, Clone)]
pub struct EventEmitter {
    sender: broadcast::Sender<BotEvent>,
}

impl Default for EventEmitter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventEmitter {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        EventEmitter { sender }
    }

    /// Returns a receiver for every event emitted from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<BotEvent> {
        self.sender.subscribe()
    }

    /// Delivers an event to every current subscriber.
    pub fn emit(&self, event: BotEvent) {
        trace!("emit {:?}", event);

        if let BotEvent::Error(err) = &event
            && self.sender.receiver_count() == 0
        {
            warn!("error event with no subscriber: {err}");
        }

        // Without subscribers the event is dropped
        let _ = self.sender.send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_subscriber_receives_events() {
        let emitter = EventEmitter::new();
        let mut first = emitter.subscribe();
        let mut second = emitter.subscribe();

        emitter.emit(BotEvent::Connected);

        assert_eq!(first.recv().await.unwrap(), BotEvent::Connected);
        assert_eq!(second.recv().await.unwrap(), BotEvent::Connected);
    }

    #[tokio::test]
    async fn test_dropped_subscriber_does_not_block_others() {
        let emitter = EventEmitter::new();
        let dropped = emitter.subscribe();
        let mut kept = emitter.subscribe();
        drop(dropped);

        emitter.emit(BotEvent::Error(BotError::Sync("timeout".to_owned())));

        assert_eq!(
            kept.recv().await.unwrap(),
            BotEvent::Error(BotError::Sync("timeout".to_owned()))
        );
    }

    #[test]
    fn test_emit_without_subscriber() {
        let emitter = EventEmitter::new();
        emitter.emit(BotEvent::Connected);
    }

    #[test]
    fn test_membership_display() {
        assert_eq!(Membership::Invite.to_string(), "invite");
        assert_eq!(Membership::Ban.to_string(), "ban");
    }

    #[test]
    fn test_message_content_keeps_every_field() {
        let fields = serde_json::json!({
            "body": "hello",
            "msgtype": "m.text",
            "format": "org.matrix.custom.html",
            "formatted_body": "<b>hello</b>",
        });
        let content = MessageContent::from_fields(fields.clone()).unwrap();

        assert_eq!(content.body, "hello");
        assert_eq!(content.msgtype, "m.text");
        assert_eq!(content.fields, fields);
    }

    #[test]
    fn test_message_content_without_body() {
        let content =
            MessageContent::from_fields(serde_json::json!({ "msgtype": "m.location" })).unwrap();
        assert_eq!(content.body, "");
        assert_eq!(content.msgtype, "m.location");

        assert_eq!(MessageContent::from_fields(serde_json::json!({ "body": "hi" })), None);
        assert_eq!(
            MessageContent::from_fields(serde_json::json!({ "msgtype": 3, "body": "hi" })),
            None
        );
    }
}
