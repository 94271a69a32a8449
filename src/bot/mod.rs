//! The bot: session bootstrap, automatic actions and the public operations.
//!
//! A [`BasicBot`] owns one protocol client, one credential store and its
//! options. Nothing is shared between two bots, so several of them can run in
//! the same process.
//!
//! # Lifecycle
//!
//! 1. [`BasicBot::new`] records identity, options and collaborators
//! 2. [`BasicBot::subscribe`] hands out event receivers, before or after start
//! 3. [`BasicBot::start`] logs in (first run) or resumes (later runs), prepares
//!    encryption and starts syncing
//! 4. [`BotEvent::Connected`] is emitted once the first sync completes
//! 5. [`BasicBot::stop`] halts syncing and event dispatch
//!
//! # Examples
//!
//! ```no_run
//! use matrix_basic_bot::{BotEvent, BotIdentity, BotOptions, MatrixBot};
//!
//! # async fn example() -> Result<(), matrix_basic_bot::BotError> {
//! let identity = BotIdentity::new("@bot:example.com", "secret", "https://example.com", "./data")?;
//! let mut bot = MatrixBot::with_matrix(identity, BotOptions::default()).await?;
//! let mut events = bot.subscribe();
//!
//! bot.start().await?;
//!
//! while let Ok(event) = events.recv().await {
//!     if let BotEvent::Message(message) = event {
//!         bot.send_notice(&message.sender.room_id, "pong", None).await?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use log::{debug, info};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};

use crate::{
    error::BotError,
    protocol::{Connector, CreateRoomOptions, CreatedRoom, MessageKind, ProtocolClient, RoomHandle},
    store::{self, CredentialStore},
};

mod adapter;
mod events;
mod identity;
mod outbound;

pub use crate::bot::{
    adapter::EventAdapter,
    events::{
        BotEvent, EventEmitter, Membership, MessageContent, MessageEnvelope, RoomMembershipEvent,
        Sender,
    },
    identity::{BotIdentity, BotOptions, MessageTypes},
    outbound::{SendPayload, send_with_retry},
};

/// A running session: the long-lived client and the task feeding the adapter.
struct Running<P> {
    client: Arc<P>,
    dispatch: JoinHandle<()>,
}

/// Simplified bot over a protocol client.
pub struct BasicBot<C: Connector, S: CredentialStore> {
    identity: BotIdentity,
    options: Arc<BotOptions>,
    connector: C,
    store: Arc<S>,
    emitter: EventEmitter,
    running: Option<Running<C::Client>>,
}

impl<C: Connector, S: CredentialStore + 'static> BasicBot<C, S> {
    /// Creates a stopped bot.
    ///
    /// # Arguments
    ///
    /// * `identity` - Account and storage of the bot
    /// * `options` - Automatic actions and message filtering
    /// * `connector` - Logs in and builds protocol clients
    /// * `store` - Credential store dedicated to this bot
    pub fn new(identity: BotIdentity, options: BotOptions, connector: C, store: S) -> Self {
        BasicBot {
            identity,
            options: Arc::new(options),
            connector,
            store: Arc::new(store),
            emitter: EventEmitter::new(),
            running: None,
        }
    }

    /// Account and storage the bot was created with.
    pub fn identity(&self) -> &BotIdentity {
        &self.identity
    }

    /// Automatic actions and message filtering in effect.
    pub fn options(&self) -> &BotOptions {
        &self.options
    }

    /// Returns a receiver for the events emitted from now on.
    ///
    /// Subscribe to errors before calling [`BasicBot::start`]: faults raised
    /// while nobody listens are only logged.
    pub fn subscribe(&self) -> broadcast::Receiver<BotEvent> {
        self.emitter.subscribe()
    }

    /// User id of the running session, as resolved by the homeserver.
    pub fn user_id(&self) -> Option<String> {
        self.running.as_ref().map(|running| running.client.user_id())
    }

    /// Starts the bot.
    ///
    /// Logs in with the password only when the credential store holds no
    /// access token, and stores the resulting session. Otherwise the stored
    /// session is resumed. Encryption is prepared before the sync loop starts.
    /// [`BotEvent::Connected`] follows once the first sync completes; later
    /// sync failures are delivered as [`BotEvent::Error`].
    ///
    /// # Errors
    ///
    /// Returns [`BotError::Auth`] if the login is rejected. Login is not
    /// retried. Store, resume, encryption and sync start failures are returned
    /// as well.
    pub async fn start(&mut self) -> Result<(), BotError> {
        if self.running.is_some() {
            return Err(BotError::InvalidArgument("bot is already started".to_owned()));
        }

        info!("starting bot {}", self.identity.user_id());

        let session = match store::load_session(self.store.as_ref()).await? {
            Some(session) => {
                debug!("resuming stored session of {}", session.user_id);
                session
            }
            None => {
                info!("no stored session, logging in");
                let session = self.connector.login(&self.identity).await?;
                store::store_session(self.store.as_ref(), &session).await?;
                info!("logged in as {} on device {}", session.user_id, session.device_id);
                session
            }
        };

        let client = Arc::new(self.connector.resume(&self.identity, &session).await?);
        client.init_crypto().await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let adapter = EventAdapter::new(
            Arc::clone(&client),
            Arc::clone(&self.options),
            self.emitter.clone(),
        );
        let dispatch = tokio::spawn(adapter.run(rx));

        if let Err(err) = client.start_sync(tx).await {
            dispatch.abort();
            return Err(err);
        }

        self.running = Some(Running { client, dispatch });
        info!("bot {} started", self.identity.user_id());
        Ok(())
    }

    /// Halts the sync loop and the event dispatch.
    ///
    /// In-flight operations are not awaited.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };

        running.client.stop_sync().await;
        running.dispatch.abort();
        info!("bot {} stopped", self.identity.user_id());
    }

    fn client(&self) -> Result<&C::Client, BotError> {
        self.running
            .as_ref()
            .map(|running| running.client.as_ref())
            .ok_or_else(|| BotError::InvalidArgument("bot is not started".to_owned()))
    }

    async fn send(
        &self,
        room_id: &str,
        body: &str,
        html_body: Option<&str>,
        kind: MessageKind,
    ) -> Result<(), BotError> {
        let payload = SendPayload::new(room_id, body, html_body)?;
        send_with_retry(
            self.client()?,
            room_id,
            payload,
            kind,
            self.options.automatically_verify_devices,
        )
        .await
    }

    /// Sends an `m.notice`, the preferred message type for bots.
    ///
    /// With `html_body`, the notice carries an HTML formatted body as well.
    /// When unknown devices block the send and automatic verification is on,
    /// the devices are trusted and the send is retried once.
    ///
    /// # Errors
    ///
    /// [`BotError::InvalidArgument`] for empty arguments, otherwise the fault
    /// of the last attempt.
    pub async fn send_notice(
        &self,
        room_id: &str,
        body: &str,
        html_body: Option<&str>,
    ) -> Result<(), BotError> {
        self.send(room_id, body, html_body, MessageKind::Notice).await
    }

    /// Sends an `m.text` message. Same contract as [`BasicBot::send_notice`].
    pub async fn send_message(
        &self,
        room_id: &str,
        body: &str,
        html_body: Option<&str>,
    ) -> Result<(), BotError> {
        self.send(room_id, body, html_body, MessageKind::Message).await
    }

    /// Sends an `m.emote`. Same contract as [`BasicBot::send_notice`].
    pub async fn send_emote(
        &self,
        room_id: &str,
        body: &str,
        html_body: Option<&str>,
    ) -> Result<(), BotError> {
        self.send(room_id, body, html_body, MessageKind::Emote).await
    }

    /// Trusts a device of another user for end-to-end encryption.
    ///
    /// # Arguments
    ///
    /// * `user_id` - Owner of the device
    /// * `device_id` - Device to mark as known and verified
    ///
    /// # Errors
    ///
    /// [`BotError::InvalidArgument`] for empty arguments or before start,
    /// [`BotError::Protocol`] if the device is unknown or cannot be updated.
    pub async fn verify_device(&self, user_id: &str, device_id: &str) -> Result<(), BotError> {
        BotError::require("userId", user_id)?;
        BotError::require("deviceId", device_id)?;

        self.client()?.mark_device_verified(user_id, device_id).await
    }

    /// Creates a room and returns its id and alias.
    ///
    /// # Errors
    ///
    /// [`BotError::InvalidArgument`] for an empty invitee or before start,
    /// [`BotError::Protocol`] if the homeserver refuses the creation.
    pub async fn create_room(&self, options: CreateRoomOptions) -> Result<CreatedRoom, BotError> {
        for user_id in &options.invite {
            BotError::require("invite", user_id)?;
        }

        self.client()?.create_room(options).await
    }

    /// Lists the rooms the bot is invited to or has joined.
    ///
    /// # Errors
    ///
    /// [`BotError::InvalidArgument`] before start.
    pub async fn list_known_rooms(&self) -> Result<Vec<RoomHandle>, BotError> {
        self.client()?.list_rooms().await
    }

    /// Joins a room the bot is invited to, or a public one.
    ///
    /// # Errors
    ///
    /// [`BotError::InvalidArgument`] for an empty `room_id` or before start,
    /// [`BotError::Protocol`] if the homeserver refuses the join.
    pub async fn join_room(&self, room_id: &str) -> Result<(), BotError> {
        BotError::require("roomId", room_id)?;

        self.client()?.join(room_id).await
    }

    /// Invites a user to a room the bot has joined.
    ///
    /// # Arguments
    ///
    /// * `user_id` - User to invite
    /// * `room_id` - Room to invite the user to
    ///
    /// # Errors
    ///
    /// [`BotError::InvalidArgument`] for empty arguments or before start,
    /// [`BotError::Protocol`] if the room is unknown or the invite is refused.
    pub async fn invite_user_to_room(&self, user_id: &str, room_id: &str) -> Result<(), BotError> {
        BotError::require("userId", user_id)?;
        BotError::require("roomId", room_id)?;

        self.client()?.invite(user_id, room_id).await
    }

    /// Leaves a room and forgets it.
    ///
    /// Invitations are forgotten by the homeserver as soon as they are
    /// declined, so leaving an invited room succeeds as well.
    ///
    /// # Errors
    ///
    /// [`BotError::InvalidArgument`] for an empty `room_id` or before start,
    /// [`BotError::Protocol`] if the leave or the forget fails.
    pub async fn leave_room(&self, room_id: &str) -> Result<(), BotError> {
        BotError::require("roomId", room_id)?;

        let client = self.client()?;
        client.leave(room_id).await?;
        client.forget(room_id).await
    }
}
