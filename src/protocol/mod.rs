//! Narrow interface to the chat protocol client.
//!
//! The bot never talks to the homeserver directly. It drives a [`Connector`]
//! to log in and resume sessions, and a [`ProtocolClient`] for everything that
//! happens once a session exists. The client reports what it observes as
//! [`Notification`]s pushed into the channel handed to
//! [`ProtocolClient::start_sync`].
//!
//! # Architecture
//!
//! ```text
//! Connector ──login()──▶ Session ──resume()──▶ ProtocolClient
//!                                                  │
//!                                       start_sync(tx)
//!                                                  ▼
//!                                     Notification channel ──▶ EventAdapter
//! ```
//!
//! The [`matrix`] submodule implements both traits on top of `matrix-sdk`.

use std::fmt;

use async_trait::async_trait;
use mockall::automock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::{
    bot::{BotIdentity, RoomMembershipEvent},
    error::BotError,
};

pub mod matrix;

/// Sending half of the notification channel.
pub type NotificationSender = mpsc::UnboundedSender<Notification>;

/// Credentials of an authenticated device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub user_id: String,
    pub device_id: String,
}

/// Flavour of `m.room.message` to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Notice,
    Message,
    Emote,
}

impl MessageKind {
    /// The `msgtype` this kind is sent as.
    pub fn msgtype(self) -> &'static str {
        match self {
            MessageKind::Notice => "m.notice",
            MessageKind::Message => "m.text",
            MessageKind::Emote => "m.emote",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.msgtype())
    }
}

/// Room visibility in the public room directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoomVisibility {
    #[default]
    Private,
    Public,
}

/// Parameters of a room creation request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateRoomOptions {
    pub visibility: RoomVisibility,
    pub name: Option<String>,
    pub topic: Option<String>,
    /// User ids invited on creation
    pub invite: Vec<String>,
    /// Local part of the alias to publish, without `#` and server name
    pub room_alias_name: Option<String>,
}

/// Result of a room creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedRoom {
    pub room_id: String,
    pub room_alias: Option<String>,
}

/// A room known to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomHandle {
    pub room_id: String,
    pub name: Option<String>,
}

/// A room event as observed on the timeline or after decryption.
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEvent {
    /// Event type, for example `m.room.message`
    pub event_type: String,
    pub room_id: String,
    pub sender: String,
    /// Event content as sent on the wire
    pub content: serde_json::Value,
    /// Whole event as sent on the wire
    pub raw: serde_json::Value,
}

/// Low-level notification emitted by a [`ProtocolClient`].
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// The first sync completed and the client state is usable.
    SyncReady,
    /// A sync request failed. The loop keeps running.
    SyncError(String),
    /// A member of a known room changed membership.
    Membership(RoomMembershipEvent),
    /// A plaintext timeline event. `live` is false for back-paginated events.
    Timeline { event: TimelineEvent, live: bool },
    /// An encrypted event was decrypted.
    Decrypted(TimelineEvent),
}

/// Creates authenticated protocol clients.
#[automock(type Client = MockProtocolClient;)]
#[async_trait]
pub trait Connector: Send + Sync {
    type Client: ProtocolClient + 'static;

    /// Password login with a throwaway client. Fails with [`BotError::Auth`].
    async fn login(&self, identity: &BotIdentity) -> Result<Session, BotError>;

    /// Builds the long-lived client from stored credentials.
    async fn resume(
        &self,
        identity: &BotIdentity,
        session: &Session,
    ) -> Result<Self::Client, BotError>;
}

/// Operations on an authenticated session.
#[automock]
#[async_trait]
pub trait ProtocolClient: Send + Sync {
    /// Fully qualified user id the session belongs to.
    fn user_id(&self) -> String;

    /// Prepares end-to-end encryption before the first sync.
    async fn init_crypto(&self) -> Result<(), BotError>;

    /// Spawns the sync loop. Notifications are pushed into `notifications`
    /// until [`ProtocolClient::stop_sync`] is called.
    async fn start_sync(&self, notifications: NotificationSender) -> Result<(), BotError>;

    /// Halts the sync loop abruptly.
    async fn stop_sync(&self);

    async fn join(&self, room_id: &str) -> Result<(), BotError>;
    async fn leave(&self, room_id: &str) -> Result<(), BotError>;
    async fn forget(&self, room_id: &str) -> Result<(), BotError>;
    async fn invite(&self, user_id: &str, room_id: &str) -> Result<(), BotError>;
    async fn create_room(&self, options: CreateRoomOptions) -> Result<CreatedRoom, BotError>;
    async fn list_rooms(&self) -> Result<Vec<RoomHandle>, BotError>;
    async fn joined_member_count(&self, room_id: &str) -> Result<u64, BotError>;

    /// Sends a plain text message. Unknown recipient devices surface as
    /// [`BotError::UnknownDevices`].
    async fn send_plain(&self, room_id: &str, body: &str, kind: MessageKind)
    -> Result<(), BotError>;

    /// Sends a message with an HTML formatted body.
    async fn send_html(
        &self,
        room_id: &str,
        body: &str,
        html_body: &str,
        kind: MessageKind,
    ) -> Result<(), BotError>;

    /// Marks a device as known and locally verified.
    async fn mark_device_verified(&self, user_id: &str, device_id: &str) -> Result<(), BotError>;

    /// Lets room keys be shared with a device that blocked an encrypted send.
    async fn allow_key_sharing(&self, user_id: &str, device_id: &str) -> Result<(), BotError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_kind_msgtype() {
        assert_eq!(MessageKind::Notice.msgtype(), "m.notice");
        assert_eq!(MessageKind::Message.msgtype(), "m.text");
        assert_eq!(MessageKind::Emote.msgtype(), "m.emote");
        assert_eq!(MessageKind::Emote.to_string(), "m.emote");
    }

    #[test]
    fn test_room_visibility_deserialization() {
        let visibility: RoomVisibility = serde_json::from_str("\"public\"").unwrap();
        assert_eq!(visibility, RoomVisibility::Public);
        assert_eq!(RoomVisibility::default(), RoomVisibility::Private);
    }

    #[test]
    fn test_session_serialization() {
        let session = Session {
            access_token: "token".to_owned(),
            user_id: "@bot:example.com".to_owned(),
            device_id: "DEVICE".to_owned(),
        };
        let serialized = serde_json::to_string(&session).unwrap();
        let deserialized: Session = serde_json::from_str(&serialized).unwrap();
        assert_eq!(deserialized, session);
    }
}
