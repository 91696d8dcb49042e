//! Call frame actors and their scope environments.

use std::sync::Arc;

use async_trait::async_trait;
use bridge_protocol::Packet;
use bridge_protocol::target::{CallFrame, Scope};
use bridge_runtime::{Actor, ActorSpec, Connection, Result, parse_request};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::context::TabContext;
use crate::grips::preview::descriptor_form;
use crate::grips::{GripScope, own_properties};

pub static FRAME_SPEC: ActorSpec = ActorSpec {
	type_name: "frame",
	requests: &["getEnvironment"],
	events: &[],
};

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum FrameRequest {
	GetEnvironment,
}

struct FrameState {
	frame: CallFrame,
	depth: usize,
	/// Pause actor owning grips made for this frame.
	pool: String,
	source: Option<String>,
}

/// One frame of the paused stack. Frames surviving a resume/pause cycle
/// keep their actor and are refreshed with the new native frame.
pub struct FrameActor {
	id: String,
	tab: Arc<TabContext>,
	state: Mutex<FrameState>,
}

impl std::fmt::Debug for FrameActor {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		let state = self.state.lock();
		f.debug_struct("FrameActor")
			.field("id", &self.id)
			.field("call_frame_id", &state.frame.call_frame_id)
			.field("depth", &state.depth)
			.finish()
	}
}

impl FrameActor {
	pub fn new(id: String, tab: Arc<TabContext>, frame: CallFrame, pool: String) -> Self {
		Self {
			id,
			tab,
			state: Mutex::new(FrameState {
				frame,
				depth: 0,
				pool,
				source: None,
			}),
		}
	}

	pub fn update(&self, frame: CallFrame, depth: usize, pool: &str, source: Option<String>) {
		let mut state = self.state.lock();
		state.frame = frame;
		state.depth = depth;
		state.pool = pool.to_string();
		state.source = source;
	}

	pub fn call_frame_id(&self) -> String {
		self.state.lock().frame.call_frame_id.clone()
	}

	pub fn depth(&self) -> usize {
		self.state.lock().depth
	}

	/// Grip scope of the pause this frame currently belongs to.
	pub fn scope(&self) -> GripScope {
		GripScope::new(Arc::clone(&self.tab), self.state.lock().pool.clone())
	}

	pub fn form(&self) -> Value {
		let state = self.state.lock();
		let scope = GripScope::new(Arc::clone(&self.tab), state.pool.clone());
		let this = state
			.frame
			.this
			.as_ref()
			.map_or_else(|| json!({ "type": "undefined" }), |this| scope.grip(this));
		let location = &state.frame.location;
		json!({
			"actor": self.id,
			"depth": state.depth,
			"type": "call",
			"displayName": state.frame.function_name,
			"this": this,
			"where": {
				"source": state.source,
				"line": location.line_number + 1,
				"column": location.column_number.unwrap_or(0),
			},
		})
	}

	async fn environment(&self) -> Result<Value> {
		let (chain, function_name) = {
			let state = self.state.lock();
			(state.frame.scope_chain.clone(), state.frame.function_name.clone())
		};
		let scope = self.scope();

		// Build outermost first so each scope can nest its parent.
		let mut parent = Value::Null;
		for entry in chain.iter().rev() {
			let mut form = scope_form(&scope, entry, &function_name).await?;
			if !parent.is_null() {
				form["parent"] = parent;
			}
			parent = form;
		}
		Ok(if parent.is_null() { json!({}) } else { parent })
	}
}

async fn scope_form(scope: &GripScope, entry: &Scope, function_name: &str) -> Result<Value> {
	let kind = match entry.kind.as_str() {
		"global" | "with" => "object",
		"local" | "closure" => "function",
		_ => "block",
	};
	let mut form = json!({ "type": kind, "scopeKind": entry.kind });
	if kind == "object" {
		form["object"] = scope.grip(&entry.object);
		return Ok(form);
	}
	if entry.kind == "local" {
		form["function"] = json!({ "displayName": function_name });
	}

	let mut variables = Map::new();
	if let Some(object_id) = entry.object.object_id.as_deref() {
		let properties = own_properties(scope.rpc(), object_id).await?;
		for property in properties.result.iter().filter(|p| !p.is_getter_only()) {
			variables.insert(property.name.clone(), descriptor_form(scope, property));
		}
	}
	form["bindings"] = json!({ "arguments": [], "variables": variables });
	Ok(form)
}

#[async_trait]
impl Actor for FrameActor {
	fn actor_id(&self) -> &str {
		&self.id
	}

	fn spec(&self) -> &'static ActorSpec {
		&FRAME_SPEC
	}

	async fn handle(&self, _conn: &Arc<Connection>, packet: Packet) -> Result<Value> {
		match parse_request::<FrameRequest>(&packet)? {
			FrameRequest::GetEnvironment => self.environment().await,
		}
	}
}

#[cfg(test)]
mod tests {
	use bridge_runtime::testing::{MockReply, MockTarget};

	use super::*;
	use crate::test_support::tab_fixture;

	fn call_frame() -> CallFrame {
		serde_json::from_value(json!({
			"callFrameId": "cf0",
			"functionName": "tick",
			"location": {"scriptId": "7", "lineNumber": 4, "columnNumber": 2},
			"scopeChain": [
				{"type": "local", "object": {"type": "object", "objectId": "scope-local"}},
				{"type": "global", "object": {"type": "object", "className": "Window", "objectId": "scope-global"}},
			],
			"this": {"type": "object", "className": "Window", "objectId": "win"},
		}))
		.unwrap()
	}

	#[tokio::test]
	async fn test_frame_form() {
		let target = MockTarget::new();
		let (conn, tab) = tab_fixture(&target);
		let frame = Arc::new(FrameActor::new("conn0.frame1".into(), tab, call_frame(), "conn0.pause1".into()));
		frame.update(call_frame(), 2, "conn0.pause1", Some("conn0.source3".into()));
		conn.manage("conn0.thread1", frame.clone());

		let form = frame.form();
		assert_eq!(form["depth"], 2);
		assert_eq!(form["displayName"], "tick");
		assert_eq!(form["where"], json!({"source": "conn0.source3", "line": 5, "column": 2}));
		assert_eq!(form["this"]["class"], "Window");
		assert_eq!(conn.pool_of("conn0.pause1").len(), 1);
	}

	#[tokio::test]
	async fn test_get_environment_nests_scopes() {
		let target = MockTarget::with_responder(|method, params| match (method, params["objectId"].as_str()) {
			("Runtime.getProperties", Some("scope-local")) => json!({"result": [
				{"name": "count", "value": {"type": "number", "value": 3}, "writable": true, "configurable": true, "enumerable": true},
			]})
			.into(),
			_ => MockReply::ok(),
		});
		let (conn, tab) = tab_fixture(&target);
		conn.manage(
			"conn0.thread1",
			Arc::new(FrameActor::new("conn0.frame1".into(), tab, call_frame(), "conn0.pause1".into())),
		);

		let reply = conn.dispatch(json!({"to": "conn0.frame1", "type": "getEnvironment"})).await;
		assert_eq!(reply["type"], "function");
		assert_eq!(reply["function"]["displayName"], "tick");
		assert_eq!(reply["bindings"]["variables"]["count"]["value"], 3);
		assert_eq!(reply["parent"]["type"], "object");
		assert_eq!(reply["parent"]["object"]["class"], "Window");
	}
}
