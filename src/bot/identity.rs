//! Construction-time configuration of a bot.

use std::collections::BTreeSet;

use serde::Deserialize;

use crate::error::BotError;

/// Account and storage a bot runs with.
///
/// Built once with [`BotIdentity::new`], which rejects empty values, and never
/// modified afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BotIdentity {
    user_id: String,
    password: String,
    homeserver_url: String,
    storage_handle: String,
}

impl BotIdentity {
    /// Creates an identity.
    ///
    /// # Arguments
    ///
    /// * `user_id` - Matrix user id or localpart used to log in
    /// * `password` - Account password
    /// * `homeserver_url` - Base URL of the homeserver
    /// * `storage_handle` - Directory holding credentials and encryption state.
    ///   Must not be shared between two bots.
    ///
    /// # Errors
    ///
    /// Returns [`BotError::InvalidArgument`] if any value is empty.
    pub fn new(
        user_id: impl Into<String>,
        password: impl Into<String>,
        homeserver_url: impl Into<String>,
        storage_handle: impl Into<String>,
    ) -> Result<Self, BotError> {
        let identity = BotIdentity {
            user_id: user_id.into(),
            password: password.into(),
            homeserver_url: homeserver_url.into(),
            storage_handle: storage_handle.into(),
        };

        BotError::require("userId", &identity.user_id)?;
        BotError::require("password", &identity.password)?;
        BotError::require("url", &identity.homeserver_url)?;
        BotError::require("storagePath", &identity.storage_handle)?;

        Ok(identity)
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn homeserver_url(&self) -> &str {
        &self.homeserver_url
    }

    pub fn storage_handle(&self) -> &str {
        &self.storage_handle
    }
}

/// Message types to surface, given either as a single string or a list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum MessageTypes {
    One(String),
    Many(Vec<String>),
}

impl From<MessageTypes> for BTreeSet<String> {
    fn from(types: MessageTypes) -> Self {
        match types {
            MessageTypes::One(msgtype) => BTreeSet::from([msgtype]),
            MessageTypes::Many(msgtypes) => msgtypes.into_iter().collect(),
        }
    }
}

/// Behaviour switches of a bot.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BotOptions {
    /// `msgtype`s that produce message events
    #[serde(deserialize_with = "deserialize_message_types")]
    pub message_types: BTreeSet<String>,
    /// Join rooms the bot is invited to
    pub automatically_join_rooms: bool,
    /// Leave and forget rooms where the bot is the last joined member
    pub automatically_leave_rooms: bool,
    /// Trust unknown devices and retry once when an encrypted send fails
    pub automatically_verify_devices: bool,
}

impl Default for BotOptions {
    fn default() -> Self {
        BotOptions {
            message_types: BTreeSet::from(["m.text".to_owned()]),
            automatically_join_rooms: true,
            automatically_leave_rooms: true,
            automatically_verify_devices: true,
        }
    }
}

impl BotOptions {
    /// Replaces the surfaced message types.
    pub fn with_message_types<I, S>(mut self, message_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.message_types = message_types.into_iter().map(Into::into).collect();
        self
    }

    pub fn accepts(&self, msgtype: &str) -> bool {
        self.message_types.contains(msgtype)
    }
}

fn deserialize_message_types<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    MessageTypes::deserialize(deserializer).map(Into::into)
}
