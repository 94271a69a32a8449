//! Bridge between protocol notifications and bot events.
//!
//! The [`EventAdapter`] consumes [`Notification`]s one at a time, applies the
//! automatic room policies configured in [`BotOptions`], and re-emits what is
//! left as [`BotEvent`]s:
//!
//! | Notification    | Policy                                  | Event          |
//! |-----------------|-----------------------------------------|----------------|
//! | `SyncReady`     | installs the adapter                    | `Connected`    |
//! | `SyncError`     |                                         | `Error`        |
//! | `Membership`    | auto-join on invite, auto-leave cleanup | `Membership`   |
//! | `Timeline`      | live `m.room.message` with known type   | `Message`      |
//! | `Decrypted`     | `m.room.message` with known type        | `E2eMessage`   |
//!
//! No failure inside a handler ever leaves the adapter: errors and panics are
//! turned into [`BotEvent::Error`].

use std::{any::Any, future::Future, panic::AssertUnwindSafe, sync::Arc};

use futures::FutureExt;
use log::{debug, error, info, trace};
use tokio::sync::mpsc;

use crate::{
    bot::{
        BotOptions,
        events::{
            BotEvent, EventEmitter, Membership, MessageContent, MessageEnvelope,
            RoomMembershipEvent, Sender,
        },
    },
    error::BotError,
    protocol::{Notification, ProtocolClient, TimelineEvent},
};

/// Event type carrying chat messages.
const ROOM_MESSAGE_TYPE: &str = "m.room.message";

/// Applies the automatic actions and re-emits notifications as bot events.
pub struct EventAdapter<P: ProtocolClient> {
    client: Arc<P>,
    options: Arc<BotOptions>,
    emitter: EventEmitter,
    /// User id of the bot, target of the invites it accepts
    own_user_id: String,
    /// Set by the first `SyncReady`. Room notifications are dropped before.
    installed: bool,
}

impl<P: ProtocolClient> EventAdapter<P> {
    pub fn new(client: Arc<P>, options: Arc<BotOptions>, emitter: EventEmitter) -> Self {
        let own_user_id = client.user_id();
        EventAdapter {
            client,
            options,
            emitter,
            own_user_id,
            installed: false,
        }
    }

    /// Processes notifications until the channel closes.
    ///
    /// Each notification is handled to completion before the next one is read.
    pub async fn run(mut self, mut notifications: mpsc::UnboundedReceiver<Notification>) {
        debug!("event adapter waiting for notifications");

        while let Some(notification) = notifications.recv().await {
            self.dispatch(notification).await;
        }

        debug!("notification channel closed, event adapter stopped");
    }

    /// Handles one notification, converting any panic into an error event.
    pub async fn dispatch(&mut self, notification: Notification) {
        trace!("dispatch {:?}", notification);

        let result = AssertUnwindSafe(self.handle(notification))
            .catch_unwind()
            .await;

        if let Err(panic) = result {
            let message = panic_message(panic);
            error!("notification handler panicked: {message}");
            self.emitter
                .emit(BotEvent::Error(BotError::Handler(message)));
        }
    }

    async fn handle(&mut self, notification: Notification) {
        match notification {
            Notification::SyncReady => {
                if self.installed {
                    return;
                }
                self.installed = true;
                info!("sync ready, automatic actions installed");
                self.emitter.emit(BotEvent::Connected);
            }
            Notification::SyncError(err) => {
                error!("sync error: {err}");
                self.emitter.emit(BotEvent::Error(BotError::Sync(err)));
            }
            Notification::Membership(event) if self.installed => {
                self.on_membership(event).await;
            }
            Notification::Timeline { event, live } if self.installed => {
                // Back-paginated events are history, not news
                if !live {
                    return;
                }
                self.emit_message(event, BotEvent::Message);
            }
            Notification::Decrypted(event) if self.installed => {
                self.emit_message(event, BotEvent::E2eMessage);
            }
            other => trace!("adapter not installed yet, dropping {:?}", other),
        }
    }

    async fn on_membership(&self, event: RoomMembershipEvent) {
        if self.options.automatically_join_rooms
            && event.membership == Membership::Invite
            && event.user_id == self.own_user_id
        {
            self.run_policy(self.auto_join(&event.room_id)).await;
        }

        if self.options.automatically_leave_rooms
            && matches!(event.membership, Membership::Leave | Membership::Ban)
        {
            self.run_policy(self.leave_empty_rooms()).await;
        }

        self.emitter.emit(BotEvent::Membership(event));
    }

    /// Runs one automatic policy. Its failure or panic becomes an error event.
    async fn run_policy<F>(&self, policy: F)
    where
        F: Future<Output = Result<(), BotError>>,
    {
        let result = match AssertUnwindSafe(policy).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => {
                let message = panic_message(panic);
                error!("automatic room policy panicked: {message}");
                Err(BotError::Handler(message))
            }
        };

        if let Err(err) = result {
            self.emitter.emit(BotEvent::Error(err));
        }
    }

    async fn auto_join(&self, room_id: &str) -> Result<(), BotError> {
        info!("auto joining room {room_id}");
        self.client.join(room_id).await?;
        info!("successfully joined room {room_id}");
        Ok(())
    }

    /// Leaves and forgets every known room where the bot is the only joined member.
    async fn leave_empty_rooms(&self) -> Result<(), BotError> {
        let rooms = self.client.list_rooms().await?;

        for room in rooms {
            let members = self.client.joined_member_count(&room.room_id).await?;
            if members == 1 {
                info!("last member in room {}, leaving", room.room_id);
                self.client.leave(&room.room_id).await?;
                self.client.forget(&room.room_id).await?;
            }
        }

        Ok(())
    }

    fn emit_message<F>(&self, event: TimelineEvent, to_event: F)
    where
        F: FnOnce(MessageEnvelope) -> BotEvent,
    {
        if let Some(envelope) = self.filter_message(event) {
            self.emitter.emit(to_event(envelope));
        }
    }

    /// Keeps `m.room.message` events whose `msgtype` is configured.
    fn filter_message(&self, event: TimelineEvent) -> Option<MessageEnvelope> {
        if event.event_type != ROOM_MESSAGE_TYPE {
            return None;
        }

        let content = MessageContent::from_fields(event.content)?;
        if !self.options.accepts(&content.msgtype) {
            trace!("ignoring message of type {}", content.msgtype);
            return None;
        }

        Some(MessageEnvelope {
            content,
            sender: Sender {
                user_id: event.sender,
                room_id: event.room_id,
            },
            raw_event: event.raw,
        })
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| (*s).to_owned())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "handler panicked".to_owned())
}
