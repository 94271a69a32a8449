//! `matrix-sdk` implementation of the protocol interface.
//!
//! [`MatrixConnector`] logs in and restores sessions backed by a SQLite store
//! under `<storage>/sqlite`. [`MatrixProtocolClient`] wraps the restored
//! [`Client`]: it registers event handlers that forward membership changes
//! and room messages as [`Notification`]s, runs the sync loop in a background
//! task, and persists the sync token after every response.
//!
//! Room keys are shared with [`CollectStrategy::ErrorOnVerifiedUserProblem`]:
//! a send to a verified user owning unsigned devices fails with
//! [`BotError::UnknownDevices`] instead of silently encrypting for them.
//!
//! Encrypted messages whose room key has not arrived yet are kept until the
//! key shows up, then decrypted and forwarded as [`Notification::Decrypted`].

use std::{
    borrow::Borrow,
    collections::HashMap,
    path::PathBuf,
    sync::{
        Arc, Mutex as StdMutex, PoisonError,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use futures::StreamExt;
use log::{debug, error, info, trace, warn};
use matrix_sdk::{
    Client, LoopCtrl, Room, RoomState, SessionMeta, SessionTokens,
    authentication::matrix::MatrixSession,
    config::SyncSettings,
    deserialized_responses::EncryptionInfo,
    encryption::{LocalTrust, OlmError},
    event_handler::{EventHandlerHandle, RawEvent},
    ruma::{
        OwnedDeviceId, OwnedRoomId, OwnedUserId, RoomId, UserId,
        api::client::{
            filter::FilterDefinition,
            room::{Visibility, create_room::v3::Request as CreateRoomRequest},
            uiaa,
        },
        events::{
            AnySyncMessageLikeEvent, AnySyncTimelineEvent, SyncMessageLikeEvent,
            room::{
                encrypted::{EncryptedEventScheme, OriginalSyncRoomEncryptedEvent},
                member::{MembershipState, OriginalSyncRoomMemberEvent, StrippedRoomMemberEvent},
                message::{OriginalSyncRoomMessageEvent, RoomMessageEventContent},
            },
        },
        serde::Raw,
    },
    sync::SyncResponse,
};
use matrix_sdk_base::crypto::{CollectStrategy, SessionRecipientCollectionError};
use serde_json::json;
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{Duration, sleep},
};

use crate::{
    bot::{BasicBot, BotIdentity, BotOptions, Membership, RoomMembershipEvent},
    error::{BotError, UnknownDeviceFault},
    protocol::{
        Connector, CreateRoomOptions, CreatedRoom, MessageKind, Notification, NotificationSender,
        ProtocolClient, RoomHandle, RoomVisibility, Session, TimelineEvent,
    },
    store::{CredentialStore, FileCredentialStore, SYNC_TOKEN_KEY},
};

/// Display name of the devices created at login.
const DEVICE_DISPLAY_NAME: &str = "matrix basic bot";

/// Pause after a failed sync request before the next one.
const SYNC_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Megolm sessions for which undecryptable events are kept.
const PENDING_SESSIONS_LIMIT: usize = 256;

/// How room key recipients are picked. Unsigned devices of verified users
/// fail the send so the bot can decide to trust them.
const ROOM_KEY_RECIPIENT_STRATEGY: CollectStrategy = CollectStrategy::ErrorOnVerifiedUserProblem;

/// Encrypted events waiting for their room key, by room and megolm session.
type PendingEvents = Arc<StdMutex<HashMap<(OwnedRoomId, String), Vec<Raw<OriginalSyncRoomEncryptedEvent>>>>>;

/// A bot running on `matrix-sdk` with a file credential store.
pub type MatrixBot = BasicBot<MatrixConnector, Arc<FileCredentialStore>>;

impl MatrixBot {
    /// Creates a bot whose credentials and encryption state live in the
    /// identity's storage directory.
    ///
    /// # Errors
    ///
    /// Returns [`BotError::Store`] if the storage directory cannot be opened.
    pub async fn with_matrix(identity: BotIdentity, options: BotOptions) -> Result<Self, BotError> {
        let store = Arc::new(FileCredentialStore::open(identity.storage_handle()).await?);
        let connector = MatrixConnector::new(identity.storage_handle(), store.clone());

        Ok(BasicBot::new(identity, options, connector, store))
    }
}

/// Logs in and restores `matrix-sdk` clients.
pub struct MatrixConnector {
    /// Path to the sqlite stores. Value is `storage/sqlite`
    sqlite_path: PathBuf,
    /// Store the sync token is persisted to
    store: Arc<dyn CredentialStore>,
}

impl MatrixConnector {
    pub fn new(storage_handle: &str, store: Arc<dyn CredentialStore>) -> Self {
        let sqlite_path: PathBuf = [storage_handle, "sqlite"].iter().collect();
        debug!("sql path {}", sqlite_path.display());

        MatrixConnector { sqlite_path, store }
    }

    async fn build_client(&self, homeserver_url: &str) -> Result<Client, BotError> {
        Client::builder()
            .homeserver_url(homeserver_url)
            .sqlite_store(&self.sqlite_path, None)
            .with_room_key_recipient_strategy(ROOM_KEY_RECIPIENT_STRATEGY)
            .build()
            .await
            .map_err(|e| BotError::Protocol(format!("cannot build client: {e}")))
    }
}

#[async_trait]
impl Connector for MatrixConnector {
    type Client = MatrixProtocolClient;

    async fn login(&self, identity: &BotIdentity) -> Result<Session, BotError> {
        info!("logging in {} on {}", identity.user_id(), identity.homeserver_url());

        // The login client shares the sqlite store so the device keys it
        // creates are the ones the resumed client uses
        let client = self.build_client(identity.homeserver_url()).await?;
        let response = client
            .matrix_auth()
            .login_username(identity.user_id(), identity.password())
            .initial_device_display_name(DEVICE_DISPLAY_NAME)
            .send()
            .await
            .map_err(|e| BotError::Auth(e.to_string()))?;

        debug!("login client done, dropping it");

        Ok(Session {
            access_token: response.access_token,
            user_id: response.user_id.to_string(),
            device_id: response.device_id.to_string(),
        })
    }

    async fn resume(
        &self,
        identity: &BotIdentity,
        session: &Session,
    ) -> Result<MatrixProtocolClient, BotError> {
        info!("restoring matrix session of {}", session.user_id);

        let user_id = UserId::parse(&session.user_id)
            .map_err(|e| BotError::Store(format!("invalid stored user id: {e}")))?;
        let device_id: OwnedDeviceId = session.device_id.as_str().into();

        let client = self.build_client(identity.homeserver_url()).await?;
        client
            .restore_session(MatrixSession {
                meta: SessionMeta {
                    user_id: user_id.clone(),
                    device_id,
                },
                tokens: SessionTokens {
                    access_token: session.access_token.clone(),
                    refresh_token: None,
                },
            })
            .await
            .map_err(|e| BotError::Protocol(format!("cannot restore session: {e}")))?;

        info!("matrix session restored successfully");

        Ok(MatrixProtocolClient {
            client,
            user_id,
            password: identity.password().to_owned(),
            store: Arc::clone(&self.store),
            tasks: Mutex::new(Vec::new()),
            handlers: Mutex::new(Vec::new()),
            pending: PendingEvents::default(),
        })
    }
}

/// Protocol client over a restored `matrix-sdk` [`Client`].
pub struct MatrixProtocolClient {
    client: Client,
    user_id: OwnedUserId,
    /// Needed when the server asks for authentication to upload cross-signing keys
    password: String,
    store: Arc<dyn CredentialStore>,
    /// Sync loop and late decryption tasks
    tasks: Mutex<Vec<JoinHandle<()>>>,
    handlers: Mutex<Vec<EventHandlerHandle>>,
    pending: PendingEvents,
}

impl MatrixProtocolClient {
    fn room(&self, room_id: &str) -> Result<Room, BotError> {
        let parsed = RoomId::parse(room_id)
            .map_err(|e| BotError::InvalidArgument(format!("invalid room id {room_id}: {e}")))?;

        self.client
            .get_room(&parsed)
            .ok_or_else(|| BotError::Protocol(format!("unknown room {room_id}")))
    }

    async fn send(&self, room_id: &str, content: RoomMessageEventContent) -> Result<(), BotError> {
        let room = self.room(room_id).map_err(|e| match e {
            BotError::Protocol(message) => BotError::Send(message),
            other => other,
        })?;

        room.send(content).await.map_err(send_fault)?;
        Ok(())
    }

    /// Registers the handlers forwarding room events to `tx`.
    fn register_handlers(&self, tx: &NotificationSender) -> Vec<EventHandlerHandle> {
        let members = self.client.add_event_handler({
            let tx = tx.clone();
            move |event: OriginalSyncRoomMemberEvent, room: Room| {
                let tx = tx.clone();
                async move {
                    forward_membership(&tx, room.room_id(), &event.state_key, &event.content.membership);
                }
            }
        });

        let invites = self.client.add_event_handler({
            let tx = tx.clone();
            move |event: StrippedRoomMemberEvent, room: Room| {
                let tx = tx.clone();
                async move {
                    forward_membership(&tx, room.room_id(), &event.state_key, &event.content.membership);
                }
            }
        });

        let messages = self.client.add_event_handler({
            let tx = tx.clone();
            move |event: OriginalSyncRoomMessageEvent,
                  room: Room,
                  encryption_info: Option<EncryptionInfo>| {
                let tx = tx.clone();
                async move {
                    let Some(event) = timeline_event(&event, &room) else {
                        return;
                    };

                    let notification = if encryption_info.is_some() {
                        Notification::Decrypted(event)
                    } else {
                        Notification::Timeline { event, live: true }
                    };
                    let _ = tx.send(notification);
                }
            }
        });

        let undecrypted = self.client.add_event_handler({
            let pending = Arc::clone(&self.pending);
            move |event: OriginalSyncRoomEncryptedEvent, room: Room, raw: RawEvent| {
                let pending = Arc::clone(&pending);
                async move {
                    queue_undecrypted(&pending, room.room_id(), &event, raw);
                }
            }
        });

        vec![members, invites, messages, undecrypted]
    }

    /// Decrypts the kept events of every room key received from now on.
    async fn spawn_late_decryption(&self, tx: NotificationSender) -> Option<JoinHandle<()>> {
        let Some(keys) = self.client.encryption().room_keys_received_stream().await else {
            warn!("encryption is not ready, late decryption disabled");
            return None;
        };

        let client = self.client.clone();
        let pending = Arc::clone(&self.pending);

        Some(tokio::spawn(async move {
            let mut keys = Box::pin(keys);

            while let Some(received) = keys.next().await {
                let infos = match received {
                    Ok(infos) => infos,
                    Err(err) => {
                        warn!("missed room keys: {err}");
                        continue;
                    }
                };

                for info in infos {
                    let events = take_pending(&pending, &info.room_id, &info.session_id);
                    if events.is_empty() {
                        continue;
                    }
                    let Some(room) = client.get_room(&info.room_id) else {
                        continue;
                    };

                    debug!("retrying {} event(s) in {}", events.len(), info.room_id);
                    for raw in events {
                        match room.decrypt_event(&raw, None).await {
                            Ok(decrypted) if decrypted.encryption_info().is_some() => {
                                if let Some(event) = decrypted_message(decrypted.raw(), &room) {
                                    let _ = tx.send(Notification::Decrypted(event));
                                }
                            }
                            Ok(_) => debug!("event in {} still undecryptable", info.room_id),
                            Err(err) => warn!("late decryption in {} failed: {err}", info.room_id),
                        }
                    }
                }
            }
        }))
    }

    /// Bootstraps cross-signing, authenticating with the password when asked.
    async fn bootstrap_cross_signing(&self) -> Result<(), BotError> {
        debug!("setting up cross signing");

        let Err(err) = self
            .client
            .encryption()
            .bootstrap_cross_signing_if_needed(None)
            .await
        else {
            debug!("cross signing already set up");
            return Ok(());
        };

        let Some(response) = err.as_uiaa_response() else {
            return Err(BotError::Protocol(format!(
                "cannot bootstrap cross signing: {err}"
            )));
        };

        let mut password = uiaa::Password::new(
            uiaa::UserIdentifier::UserIdOrLocalpart(self.user_id.to_string()),
            self.password.clone(),
        );
        password.session = response.session.clone();

        self.client
            .encryption()
            .bootstrap_cross_signing(Some(uiaa::AuthData::Password(password)))
            .await
            .map_err(|e| BotError::Protocol(format!("cannot bootstrap cross signing: {e}")))?;

        debug!("cross signing set up");
        Ok(())
    }
}

#[async_trait]
impl ProtocolClient for MatrixProtocolClient {
    fn user_id(&self) -> String {
        self.user_id.to_string()
    }

    async fn init_crypto(&self) -> Result<(), BotError> {
        self.bootstrap_cross_signing().await
    }

    async fn start_sync(&self, notifications: NotificationSender) -> Result<(), BotError> {
        let mut tasks = self.tasks.lock().await;
        if !tasks.is_empty() {
            return Err(BotError::InvalidArgument("sync already started".to_owned()));
        }

        // Enable room members lazy-loading
        let filter = FilterDefinition::with_lazy_loading();
        let mut sync_settings = SyncSettings::default().filter(filter.into());
        if let Some(token) = self.store.get(SYNC_TOKEN_KEY).await? {
            debug!("resuming sync from stored token");
            sync_settings = sync_settings.token(token);
        }

        *self.handlers.lock().await = self.register_handlers(&notifications);
        tasks.extend(self.spawn_late_decryption(notifications.clone()).await);

        let client = self.client.clone();
        let store = Arc::clone(&self.store);

        tasks.push(tokio::spawn(async move {
            info!("start syncing");

            let ready = AtomicBool::new(false);
            let (tx, ready, store) = (&notifications, &ready, &store);

            let result = client
                .sync_with_result_callback(
                    sync_settings,
                    move |sync_result: Result<SyncResponse, matrix_sdk::Error>| async move {
                        if tx.is_closed() {
                            return Ok(LoopCtrl::Break);
                        }

                        match sync_result {
                            Ok(response) => {
                                // We persist the token each time to be able to resume
                                if let Err(err) = store.set(SYNC_TOKEN_KEY, &response.next_batch).await {
                                    error!("failed to persist sync token: {err}");
                                }
                                if !ready.swap(true, Ordering::SeqCst) {
                                    let _ = tx.send(Notification::SyncReady);
                                }
                            }
                            Err(err) => {
                                warn!("sync failed: {err}");
                                let _ = tx.send(Notification::SyncError(err.to_string()));
                                sleep(SYNC_RETRY_DELAY).await;
                            }
                        }

                        Ok(LoopCtrl::Continue)
                    },
                )
                .await;

            match result {
                Ok(()) => info!("matrix sync ended successfully"),
                Err(err) => error!("matrix sync ended with error: {err}"),
            }
        }));

        Ok(())
    }

    async fn stop_sync(&self) {
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        for handle in self.handlers.lock().await.drain(..) {
            self.client.remove_event_handler(handle);
        }
        info!("matrix sync stopped");
    }

    async fn join(&self, room_id: &str) -> Result<(), BotError> {
        let parsed = RoomId::parse(room_id)
            .map_err(|e| BotError::InvalidArgument(format!("invalid room id {room_id}: {e}")))?;

        self.client
            .join_room_by_id(&parsed)
            .await
            .map_err(|e| BotError::Protocol(format!("cannot join {room_id}: {e}")))?;
        Ok(())
    }

    async fn leave(&self, room_id: &str) -> Result<(), BotError> {
        self.room(room_id)?
            .leave()
            .await
            .map_err(|e| BotError::Protocol(format!("cannot leave {room_id}: {e}")))
    }

    async fn forget(&self, room_id: &str) -> Result<(), BotError> {
        let parsed = RoomId::parse(room_id)
            .map_err(|e| BotError::InvalidArgument(format!("invalid room id {room_id}: {e}")))?;

        // Declining an invite already forgets the room
        let Some(room) = self.client.get_room(&parsed) else {
            debug!("room {room_id} already forgotten");
            return Ok(());
        };

        room.forget()
            .await
            .map_err(|e| BotError::Protocol(format!("cannot forget {room_id}: {e}")))
    }

    async fn invite(&self, user_id: &str, room_id: &str) -> Result<(), BotError> {
        let invitee = UserId::parse(user_id)
            .map_err(|e| BotError::InvalidArgument(format!("invalid user id {user_id}: {e}")))?;

        self.room(room_id)?
            .invite_user_by_id(&invitee)
            .await
            .map_err(|e| BotError::Protocol(format!("cannot invite {user_id} to {room_id}: {e}")))
    }

    async fn create_room(&self, options: CreateRoomOptions) -> Result<CreatedRoom, BotError> {
        let invite = options
            .invite
            .iter()
            .map(|user_id| {
                UserId::parse(user_id).map_err(|e| {
                    BotError::InvalidArgument(format!("invalid user id {user_id}: {e}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let mut request = CreateRoomRequest::new();
        request.visibility = match options.visibility {
            RoomVisibility::Private => Visibility::Private,
            RoomVisibility::Public => Visibility::Public,
        };
        request.name = options.name;
        request.topic = options.topic;
        request.invite = invite;
        request.room_alias_name = options.room_alias_name.clone();

        let room = self
            .client
            .create_room(request)
            .await
            .map_err(|e| BotError::Protocol(format!("cannot create room: {e}")))?;
        info!("created room {}", room.room_id());

        Ok(CreatedRoom {
            room_id: room.room_id().to_string(),
            room_alias: options
                .room_alias_name
                .map(|name| format!("#{name}:{}", self.user_id.server_name())),
        })
    }

    async fn list_rooms(&self) -> Result<Vec<RoomHandle>, BotError> {
        Ok(self
            .client
            .rooms()
            .into_iter()
            .filter(|room| room.state() != RoomState::Left)
            .map(|room| RoomHandle {
                room_id: room.room_id().to_string(),
                name: room.name(),
            })
            .collect())
    }

    async fn joined_member_count(&self, room_id: &str) -> Result<u64, BotError> {
        Ok(self.room(room_id)?.joined_members_count())
    }

    async fn send_plain(
        &self,
        room_id: &str,
        body: &str,
        kind: MessageKind,
    ) -> Result<(), BotError> {
        self.send(room_id, plain_content(body, kind)).await
    }

    async fn send_html(
        &self,
        room_id: &str,
        body: &str,
        html_body: &str,
        kind: MessageKind,
    ) -> Result<(), BotError> {
        self.send(room_id, html_content(body, html_body, kind)).await
    }

    async fn mark_device_verified(&self, user_id: &str, device_id: &str) -> Result<(), BotError> {
        let owner = UserId::parse(user_id)
            .map_err(|e| BotError::InvalidArgument(format!("invalid user id {user_id}: {e}")))?;
        let device_id: OwnedDeviceId = device_id.into();

        let device = self
            .client
            .encryption()
            .get_device(&owner, &device_id)
            .await
            .map_err(|e| BotError::Protocol(e.to_string()))?
            .ok_or_else(|| {
                BotError::Protocol(format!("unknown device {device_id} of {user_id}"))
            })?;

        device
            .set_local_trust(LocalTrust::Verified)
            .await
            .map_err(|e| BotError::Protocol(e.to_string()))?;

        debug!("device {device_id} of {user_id} verified");
        Ok(())
    }

    async fn allow_key_sharing(&self, user_id: &str, device_id: &str) -> Result<(), BotError> {
        let owner = UserId::parse(user_id)
            .map_err(|e| BotError::InvalidArgument(format!("invalid user id {user_id}: {e}")))?;
        let device_id: OwnedDeviceId = device_id.into();

        let device = self
            .client
            .encryption()
            .get_device(&owner, &device_id)
            .await
            .map_err(|e| BotError::Protocol(e.to_string()))?
            .ok_or_else(|| {
                BotError::Protocol(format!("unknown device {device_id} of {user_id}"))
            })?;

        // The only trust level the recipient strategy accepts for an
        // unsigned device of a verified user
        device
            .set_local_trust(LocalTrust::Ignored)
            .await
            .map_err(|e| BotError::Protocol(e.to_string()))?;

        debug!("room keys may now be shared with device {device_id} of {user_id}");
        Ok(())
    }
}

fn plain_content(body: &str, kind: MessageKind) -> RoomMessageEventContent {
    match kind {
        MessageKind::Notice => RoomMessageEventContent::notice_plain(body),
        MessageKind::Message => RoomMessageEventContent::text_plain(body),
        MessageKind::Emote => RoomMessageEventContent::emote_plain(body),
    }
}

fn html_content(body: &str, html_body: &str, kind: MessageKind) -> RoomMessageEventContent {
    match kind {
        MessageKind::Notice => RoomMessageEventContent::notice_html(body, html_body),
        MessageKind::Message => RoomMessageEventContent::text_html(body, html_body),
        MessageKind::Emote => RoomMessageEventContent::emote_html(body, html_body),
    }
}

fn membership(state: &MembershipState) -> Option<Membership> {
    match state {
        MembershipState::Invite => Some(Membership::Invite),
        MembershipState::Join => Some(Membership::Join),
        MembershipState::Leave => Some(Membership::Leave),
        MembershipState::Ban => Some(Membership::Ban),
        _ => None,
    }
}

fn forward_membership(
    tx: &NotificationSender,
    room_id: &RoomId,
    user_id: &UserId,
    state: &MembershipState,
) {
    let Some(membership) = membership(state) else {
        return;
    };

    let _ = tx.send(Notification::Membership(RoomMembershipEvent {
        room_id: room_id.to_string(),
        user_id: user_id.to_string(),
        membership,
    }));
}

fn timeline_event(event: &OriginalSyncRoomMessageEvent, room: &Room) -> Option<TimelineEvent> {
    let content = match serde_json::to_value(&event.content) {
        Ok(content) => content,
        Err(err) => {
            error!("cannot serialize message {}: {err}", event.event_id);
            return None;
        }
    };

    let raw = json!({
        "type": "m.room.message",
        "event_id": event.event_id.to_string(),
        "sender": event.sender.to_string(),
        "origin_server_ts": event.origin_server_ts,
        "room_id": room.room_id().to_string(),
        "content": content.clone(),
    });

    Some(TimelineEvent {
        event_type: "m.room.message".to_owned(),
        room_id: room.room_id().to_string(),
        sender: event.sender.to_string(),
        content,
        raw,
    })
}

fn decrypted_message(raw: &Raw<AnySyncTimelineEvent>, room: &Room) -> Option<TimelineEvent> {
    match raw.deserialize() {
        Ok(AnySyncTimelineEvent::MessageLike(AnySyncMessageLikeEvent::RoomMessage(
            SyncMessageLikeEvent::Original(event),
        ))) => timeline_event(&event, room),
        Ok(_) => None,
        Err(err) => {
            warn!("cannot deserialize decrypted event: {err}");
            None
        }
    }
}

/// Keeps an event that could not be decrypted until its room key arrives.
fn queue_undecrypted(
    pending: &PendingEvents,
    room_id: &RoomId,
    event: &OriginalSyncRoomEncryptedEvent,
    raw: RawEvent,
) {
    let EncryptedEventScheme::MegolmV1AesSha2(content) = &event.content.scheme else {
        return;
    };

    let mut events = pending.lock().unwrap_or_else(PoisonError::into_inner);
    let key = (room_id.to_owned(), content.session_id.clone());
    if !events.contains_key(&key) && events.len() >= PENDING_SESSIONS_LIMIT {
        warn!("too many missing room keys, dropping event {}", event.event_id);
        return;
    }

    trace!("waiting for room key {} in {room_id}", content.session_id);
    events.entry(key).or_default().push(Raw::from_json(raw.0));
}

fn take_pending(
    pending: &PendingEvents,
    room_id: &RoomId,
    session_id: &str,
) -> Vec<Raw<OriginalSyncRoomEncryptedEvent>> {
    pending
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .remove(&(room_id.to_owned(), session_id.to_owned()))
        .unwrap_or_default()
}

/// Maps a send failure, recognising devices that block room key sharing.
fn send_fault(err: matrix_sdk::Error) -> BotError {
    if let matrix_sdk::Error::OlmError(olm) = &err
        && let Some(fault) = unknown_devices(olm)
    {
        return BotError::UnknownDevices(fault);
    }

    BotError::Send(err.to_string())
}

fn unknown_devices<E: Borrow<OlmError>>(err: &E) -> Option<UnknownDeviceFault> {
    match err.borrow() {
        OlmError::SessionRecipientCollectionError(
            SessionRecipientCollectionError::VerifiedUserHasUnsignedDevice(devices),
        ) => Some(
            devices
                .iter()
                .map(|(user_id, device_ids)| {
                    (
                        user_id.to_string(),
                        device_ids.iter().map(ToString::to_string),
                    )
                })
                .collect(),
        ),
        _ => None,
    }
}
