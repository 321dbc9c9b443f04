//! Async message transport for non-blocking guest calls.
//!
//! Each message carries the tuple `(guest instance id, method, args)`.
//! `ChannelTransport` puts every message on one unbounded tokio channel,
//! which keeps send order per sender.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;

use guestview_core::{EngineError, GuestInstanceId};

use crate::service::GuestMessageSink;

/// Channel name the host-side router listens on.
pub const ASYNC_CALL_CHANNEL: &str = "guest-view:async-call";

/// A one-way call addressed to a guest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestMessage {
    pub guest_instance_id: GuestInstanceId,
    pub method: String,
    pub args: Vec<Value>,
}

/// `GuestMessageSink` backed by a tokio unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    tx: mpsc::UnboundedSender<GuestMessage>,
}

impl ChannelTransport {
    /// Create a transport and the receiver that drains it.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<GuestMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl GuestMessageSink for ChannelTransport {
    fn send(&self, message: GuestMessage) -> Result<(), EngineError> {
        tracing::trace!(
            channel = ASYNC_CALL_CHANNEL,
            guest = %message.guest_instance_id,
            method = %message.method,
            "Sending async guest call"
        );
        self.tx
            .send(message)
            .map_err(|e| EngineError::Channel(format!("{} closed: {}", ASYNC_CALL_CHANNEL, e)))
    }
}
