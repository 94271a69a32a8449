//! Outbound messaging with a single device-trust repair.
//!
//! A send walks through these states:
//!
//! ```text
//! Idle ─▶ Sending ─┬─▶ Delivered
//!                  ├─▶ Failed                        (other fault, or verification disabled)
//!                  └─▶ VerifyingDevices ─▶ Retrying ─┬─▶ Delivered
//!                                                    └─▶ Failed
//! ```
//!
//! The retry happens at most once. Devices that still block the send after
//! being trusted point at a problem the caller has to look at.

use log::{debug, info, warn};

use crate::{
    error::{BotError, UnknownDeviceFault},
    protocol::{MessageKind, ProtocolClient},
};

/// What to send, resolved once per call from the presence of an HTML body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendPayload<'a> {
    Plain { body: &'a str },
    Html { body: &'a str, html_body: &'a str },
}

impl<'a> SendPayload<'a> {
    /// Validates the arguments and picks the payload variant.
    ///
    /// # Errors
    ///
    /// Returns [`BotError::InvalidArgument`] if `room_id` or `body` is empty,
    /// or if `html_body` is given but empty.
    pub fn new(room_id: &str, body: &'a str, html_body: Option<&'a str>) -> Result<Self, BotError> {
        BotError::require("roomId", room_id)?;
        BotError::require("body", body)?;

        match html_body {
            None => Ok(SendPayload::Plain { body }),
            Some(html_body) => {
                BotError::require("htmlBody", html_body)?;
                Ok(SendPayload::Html { body, html_body })
            }
        }
    }

    async fn send<P: ProtocolClient + ?Sized>(
        &self,
        client: &P,
        room_id: &str,
        kind: MessageKind,
    ) -> Result<(), BotError> {
        match *self {
            SendPayload::Plain { body } => client.send_plain(room_id, body, kind).await,
            SendPayload::Html { body, html_body } => {
                client.send_html(room_id, body, html_body, kind).await
            }
        }
    }
}

/// Sends a message, trusting unknown devices and retrying once if allowed.
///
/// # Errors
///
/// Returns the fault of the last attempt unchanged.
pub async fn send_with_retry<P: ProtocolClient + ?Sized>(
    client: &P,
    room_id: &str,
    payload: SendPayload<'_>,
    kind: MessageKind,
    verify_devices: bool,
) -> Result<(), BotError> {
    debug!("sending {kind} to {room_id}");

    let fault = match payload.send(client, room_id, kind).await {
        Ok(()) => {
            debug!("{kind} delivered to {room_id}");
            return Ok(());
        }
        Err(BotError::UnknownDevices(fault)) if verify_devices => fault,
        Err(err) => {
            debug!("{kind} to {room_id} failed: {err}");
            return Err(err);
        }
    };

    info!(
        "{} unknown device(s) in {room_id}, verifying before retry",
        fault.len()
    );
    verify_devices_of(client, &fault).await;

    debug!("retrying {kind} to {room_id}");
    payload.send(client, room_id, kind).await.inspect_err(|err| {
        warn!("{kind} to {room_id} failed after verifying devices: {err}");
    })
}

/// Trusts every device named by the fault for key sharing.
///
/// A device that cannot be trusted is logged and skipped. The retry that
/// follows reports whether the room is still blocked.
async fn verify_devices_of<P: ProtocolClient + ?Sized>(client: &P, fault: &UnknownDeviceFault) {
    for (user_id, device_id) in fault.pairs() {
        debug!("trusting device {device_id} of {user_id}");
        if let Err(err) = client.allow_key_sharing(user_id, device_id).await {
            warn!("failed to trust device {device_id} of {user_id}: {err}");
        }
    }
}
