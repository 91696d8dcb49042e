//! The actor abstraction shared by every front-end addressable object.

use std::sync::Arc;

use async_trait::async_trait;
use bridge_protocol::Packet;
use downcast_rs::{DowncastSync, impl_downcast};
use serde_json::Value;

use crate::connection::Connection;
use crate::error::Result;

/// Static description of an actor type: its name and the packet types it
/// answers and emits.
///
/// Each actor type declares exactly one `ActorSpec` constant. The
/// connection checks `requests` before calling [`Actor::handle`], and the
/// root actor builds `protocolDescription` from the registered specs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorSpec {
	pub type_name: &'static str,
	pub requests: &'static [&'static str],
	pub events: &'static [&'static str],
}

impl ActorSpec {
	pub fn handles(&self, kind: &str) -> bool {
		self.requests.contains(&kind)
	}
}

/// A front-end addressable object.
///
/// `handle` receives only packets whose `type` is listed in the actor's
/// [`ActorSpec`]; implementations deserialize their own request enum from
/// the packet and return the reply body (without `from`).
#[async_trait]
pub trait Actor: DowncastSync {
	fn actor_id(&self) -> &str;

	fn spec(&self) -> &'static ActorSpec;

	async fn handle(&self, conn: &Arc<Connection>, packet: Packet) -> Result<Value>;

	/// Called after the reply to a packet of type `kind` has been queued.
	/// Events sent from here are ordered after that reply.
	fn on_replied(&self, _conn: &Arc<Connection>, _kind: &str) {}

	/// Called once after the actor leaves the registry.
	fn on_unmanaged(&self) {}
}

impl_downcast!(sync Actor);

/// Parses a packet into an actor's request enum, mapping serde failures to
/// `badParameterType`.
pub fn parse_request<T: serde::de::DeserializeOwned>(packet: &Packet) -> Result<T> {
	packet.parse().map_err(crate::error::Error::bad_packet)
}
