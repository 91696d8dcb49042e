//! Front-end packet envelope.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Inbound request addressed to an actor.
///
/// The raw JSON is kept alongside the routing fields so each actor can
/// deserialize its own typed request enum from the same object.
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
	/// Actor id the packet is addressed to.
	pub to: String,
	/// Request type, e.g. `listTabs` or `querySelector`.
	pub kind: String,
	/// The complete packet as received.
	pub raw: Value,
}

impl Packet {
	/// Extracts the routing fields from a raw packet.
	///
	/// Returns `None` when `to` or `type` is missing or not a string.
	pub fn from_value(raw: Value) -> Option<Self> {
		let to = raw.get("to")?.as_str()?.to_string();
		let kind = raw.get("type")?.as_str()?.to_string();
		Some(Self { to, kind, raw })
	}

	/// Deserializes the packet into a typed request.
	pub fn parse<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
		serde_json::from_value(self.raw.clone())
	}

	/// Returns the packet's fields without `to`, used by `echo`.
	pub fn body(&self) -> Map<String, Value> {
		let mut body = self.raw.as_object().cloned().unwrap_or_default();
		body.remove("to");
		body
	}
}

/// Outbound failure reply: `{from, error, message}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReply {
	pub from: String,
	pub error: String,
	pub message: String,
}

/// Builds an outbound packet from an actor id and a JSON object body.
///
/// Non-object bodies are wrapped as `{"value": body}`.
pub fn reply(from: &str, body: Value) -> Value {
	let mut map = match body {
		Value::Object(map) => map,
		Value::Null => Map::new(),
		other => {
			let mut map = Map::new();
			map.insert("value".to_string(), other);
			map
		}
	};
	map.insert("from".to_string(), Value::String(from.to_string()));
	Value::Object(map)
}

/// Builds an unsolicited event packet `{from, type, ...body}`.
pub fn event(from: &str, kind: &str, body: Value) -> Value {
	let mut packet = reply(from, body);
	if let Some(map) = packet.as_object_mut() {
		map.insert("type".to_string(), Value::String(kind.to_string()));
	}
	packet
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_packet_routing_fields() {
		let packet = Packet::from_value(json!({"to": "root", "type": "listTabs"})).unwrap();
		assert_eq!(packet.to, "root");
		assert_eq!(packet.kind, "listTabs");
	}

	#[test]
	fn test_packet_missing_to() {
		assert!(Packet::from_value(json!({"type": "listTabs"})).is_none());
		assert!(Packet::from_value(json!({"to": 3, "type": "listTabs"})).is_none());
	}

	#[test]
	fn test_body_strips_to() {
		let packet = Packet::from_value(json!({"to": "root", "type": "echo", "text": "hi"})).unwrap();
		let body = packet.body();
		assert!(!body.contains_key("to"));
		assert_eq!(body["text"], "hi");
		assert_eq!(body["type"], "echo");
	}

	#[test]
	fn test_event_envelope() {
		let packet = event("conn0.tab1", "tabNavigated", json!({"state": "start"}));
		assert_eq!(packet["from"], "conn0.tab1");
		assert_eq!(packet["type"], "tabNavigated");
		assert_eq!(packet["state"], "start");
	}

	#[test]
	fn test_reply_wraps_scalars() {
		let packet = reply("root", json!(5));
		assert_eq!(packet["value"], 5);
		assert_eq!(packet["from"], "root");
	}
}
