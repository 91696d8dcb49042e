//! Actor serving slices of a string too long to inline.

use std::sync::Arc;

use async_trait::async_trait;
use bridge_protocol::Packet;
use bridge_runtime::{Actor, ActorSpec, Connection, Result, parse_request};
use serde::Deserialize;
use serde_json::{Value, json};

use super::LONG_STRING_INITIAL_LENGTH;

pub static LONG_STRING_SPEC: ActorSpec = ActorSpec {
	type_name: "longstractor",
	requests: &["substring", "release"],
	events: &[],
};

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum LongStringRequest {
	Substring { start: usize, end: usize },
	Release,
}

#[derive(Debug)]
pub struct LongStringActor {
	id: String,
	text: String,
}

impl LongStringActor {
	pub fn new(id: String, text: String) -> Self {
		Self { id, text }
	}

	pub fn form(&self) -> Value {
		json!({
			"type": "longString",
			"actor": self.id,
			"length": self.text.chars().count(),
			"initial": self.slice(0, LONG_STRING_INITIAL_LENGTH),
		})
	}

	/// Characters `[start, end)`, clamped to the string.
	fn slice(&self, start: usize, end: usize) -> String {
		self.text.chars().skip(start).take(end.saturating_sub(start)).collect()
	}
}

#[async_trait]
impl Actor for LongStringActor {
	fn actor_id(&self) -> &str {
		&self.id
	}

	fn spec(&self) -> &'static ActorSpec {
		&LONG_STRING_SPEC
	}

	async fn handle(&self, conn: &Arc<Connection>, packet: Packet) -> Result<Value> {
		match parse_request::<LongStringRequest>(&packet)? {
			LongStringRequest::Substring { start, end } => Ok(json!({ "substring": self.slice(start, end) })),
			LongStringRequest::Release => {
				conn.unmanage(&self.id);
				Ok(json!({}))
			}
		}
	}
}
