//! Bidirectional JSON message transports.
//!
//! A transport is split into a sender half ([`Transport`]) and a receiver
//! half ([`TransportReceiver`]). The receiver's `run` loop decodes inbound
//! frames and forwards each message, in receipt order, to the unbounded
//! channel returned alongside it. Two implementations exist:
//!
//! - [`PacketTransport`]: `<length>:<json>` framing over any byte stream,
//!   used for the front-end side.
//! - [`WebSocketTransport`]: one JSON document per text frame, used for the
//!   debug target.

mod packet;
mod websocket;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

pub use packet::{PacketTransport, PacketTransportReceiver, PacketTransportSender};
pub use websocket::{WebSocketTransport, WebSocketTransportReceiver, WebSocketTransportSender};

use crate::error::Result;

/// Sender half of a transport.
#[async_trait]
pub trait Transport: Send {
	/// Serializes and writes one message.
	async fn send(&mut self, message: Value) -> Result<()>;

	/// Flushes and closes the outbound side.
	async fn close(&mut self) -> Result<()> {
		Ok(())
	}
}

/// Receiver half of a transport.
#[async_trait]
pub trait TransportReceiver: Send {
	/// Reads messages until the peer closes or the message channel is dropped.
	async fn run(&mut self) -> Result<()>;
}

/// Both halves of a transport plus the channel its receiver feeds.
pub struct TransportParts {
	pub sender: Box<dyn Transport>,
	pub receiver: Box<dyn TransportReceiver>,
	pub message_rx: mpsc::UnboundedReceiver<Value>,
}

impl std::fmt::Debug for TransportParts {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TransportParts").finish_non_exhaustive()
	}
}
