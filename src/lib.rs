//! Matrix Basic Bot - A small library to write Matrix bots.
//!
//! The library hides session management, end-to-end encryption setup and
//! room housekeeping behind a [`BasicBot`] that emits [`BotEvent`]s and sends
//! messages.
//!
//! # Features
//!
//! - **Session Persistence**: Logs in once, then resumes the stored session
//! - **Automatic Join**: Accepts invitations addressed to the bot
//! - **Automatic Leave**: Leaves and forgets rooms where nobody else remains
//! - **Message Filtering**: Surfaces only the configured `msgtype`s
//! - **Device Trust**: Trusts unknown devices and retries a blocked send once
//!
//! # Architecture
//!
//! - [`bot`] - The bot, its options, the event vocabulary and the automatic actions
//! - [`config`] - YAML configuration with environment variable overrides
//! - [`error`] - Error taxonomy shared by every operation
//! - [`protocol`] - Narrow interface to the protocol client and its `matrix-sdk` implementation
//! - [`store`] - Credential persistence
//!
//! # Example
//!
//! ```no_run
//! use matrix_basic_bot::{BotEvent, BotIdentity, BotOptions, MatrixBot};
//!
//! # async fn example() -> Result<(), matrix_basic_bot::BotError> {
//! let identity = BotIdentity::new("@bot:example.com", "secret", "https://example.com", "./data")?;
//! let mut bot = MatrixBot::with_matrix(identity, BotOptions::default()).await?;
//! let mut events = bot.subscribe();
//! bot.start().await?;
//!
//! while let Ok(event) = events.recv().await {
//!     match event {
//!         BotEvent::Connected => println!("connected"),
//!         BotEvent::Error(err) => eprintln!("{err}"),
//!         _ => {}
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod bot;
pub mod config;
pub mod error;
pub mod protocol;
pub mod store;

pub use crate::{
    bot::{
        BasicBot, BotEvent, BotIdentity, BotOptions, Membership, MessageContent, MessageEnvelope,
        MessageTypes, RoomMembershipEvent, Sender,
    },
    error::{BotError, UnknownDeviceFault},
    protocol::{
        CreateRoomOptions, CreatedRoom, RoomHandle, RoomVisibility,
        matrix::{MatrixBot, MatrixConnector, MatrixProtocolClient},
    },
    store::{CredentialStore, FileCredentialStore},
};
