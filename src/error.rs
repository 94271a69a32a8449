//! Error taxonomy for the bot.
//!
//! Every fault the bot can report is a [`BotError`]. Errors raised by the
//! underlying SDK are rendered to strings at the protocol boundary so the enum
//! stays `Clone` and can be delivered to any number of event subscribers.

use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

/// Devices that blocked an encrypted send, grouped by user id.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnknownDeviceFault {
    pub devices: BTreeMap<String, BTreeSet<String>>,
}

impl UnknownDeviceFault {
    /// Iterates every `(user_id, device_id)` pair named by the fault.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.devices.iter().flat_map(|(user_id, devices)| {
            devices
                .iter()
                .map(move |device_id| (user_id.as_str(), device_id.as_str()))
        })
    }

    /// Number of devices across all users.
    pub fn len(&self) -> usize {
        self.devices.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<U, D, I> FromIterator<(U, I)> for UnknownDeviceFault
where
    U: Into<String>,
    D: Into<String>,
    I: IntoIterator<Item = D>,
{
    fn from_iter<T: IntoIterator<Item = (U, I)>>(iter: T) -> Self {
        let mut devices: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for (user_id, device_ids) in iter {
            devices
                .entry(user_id.into())
                .or_default()
                .extend(device_ids.into_iter().map(Into::into));
        }
        UnknownDeviceFault { devices }
    }
}

/// Errors reported by the bot, either returned from a call or delivered as a
/// [`crate::BotEvent::Error`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BotError {
    /// The caller passed a missing or empty argument. No network call was made.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The homeserver rejected the password login.
    #[error("login rejected: {0}")]
    Auth(String),

    /// The sync loop failed. Reported as an event, never fatal.
    #[error("sync failed: {0}")]
    Sync(String),

    /// An encrypted send was refused because of untrusted recipient devices.
    #[error("unknown devices in room: {} device(s)", .0.len())]
    UnknownDevices(UnknownDeviceFault),

    /// Any other send failure.
    #[error("send failed: {0}")]
    Send(String),

    /// A notification handler failed while processing an event.
    #[error("event handler failed: {0}")]
    Handler(String),

    /// A room or device operation failed in the protocol client.
    #[error("protocol client error: {0}")]
    Protocol(String),

    /// The credential store could not be read or written.
    #[error("credential store error: {0}")]
    Store(String),
}

impl BotError {
    /// Validates that a required string argument is present.
    pub(crate) fn require(name: &str, value: &str) -> Result<(), BotError> {
        if value.trim().is_empty() {
            return Err(BotError::InvalidArgument(format!(
                "\"{name}\" is required and must be a non-empty string"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_rejects_empty_and_blank() {
        assert!(matches!(
            BotError::require("roomId", ""),
            Err(BotError::InvalidArgument(_))
        ));
        assert!(matches!(
            BotError::require("roomId", "   "),
            Err(BotError::InvalidArgument(_))
        ));
        assert!(BotError::require("roomId", "!room:example.com").is_ok());
    }

    #[test]
    fn test_require_names_the_argument() {
        let err = BotError::require("body", "").unwrap_err();
        assert!(err.to_string().contains("\"body\""));
    }

    #[test]
    fn test_unknown_device_fault_pairs_are_ordered() {
        let fault: UnknownDeviceFault = [
            ("@b:example.com", vec!["DEV3"]),
            ("@a:example.com", vec!["DEV2", "DEV1"]),
        ]
        .into_iter()
        .collect();

        let pairs: Vec<_> = fault.pairs().collect();
        assert_eq!(
            pairs,
            vec![
                ("@a:example.com", "DEV1"),
                ("@a:example.com", "DEV2"),
                ("@b:example.com", "DEV3"),
            ]
        );
        assert_eq!(fault.len(), 3);
        assert!(!fault.is_empty());
    }

    #[test]
    fn test_unknown_device_fault_merges_duplicate_users() {
        let fault: UnknownDeviceFault = [
            ("@a:example.com", vec!["DEV1"]),
            ("@a:example.com", vec!["DEV1", "DEV2"]),
        ]
        .into_iter()
        .collect();

        assert_eq!(fault.devices.len(), 1);
        assert_eq!(fault.len(), 2);
    }

    #[test]
    fn test_unknown_devices_display() {
        let fault: UnknownDeviceFault = [("@a:example.com", vec!["DEV1", "DEV2"])]
            .into_iter()
            .collect();
        assert_eq!(
            BotError::UnknownDevices(fault).to_string(),
            "unknown devices in room: 2 device(s)"
        );
    }
}
