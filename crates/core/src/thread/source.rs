//! Script sources and the breakpoints set in them.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bridge_protocol::Packet;
use bridge_protocol::target::{Location, ScriptParsed, SetBreakpointResult};
use bridge_runtime::{Actor, ActorSpec, Connection, Result, parse_request};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::context::TabContext;
use crate::grips::GripScope;

pub static SOURCE_SPEC: ActorSpec = ActorSpec {
	type_name: "source",
	requests: &["source", "setBreakpoint"],
	events: &[],
};

pub static BREAKPOINT_SPEC: ActorSpec = ActorSpec {
	type_name: "breakpoint",
	requests: &["delete"],
	events: &[],
};

/// Target breakpoint id to breakpoint actor id, shared by every source of a
/// thread so pauses can name the breakpoints they hit.
#[derive(Debug, Default)]
pub struct Breakpoints {
	actors: Mutex<HashMap<String, String>>,
}

impl Breakpoints {
	pub fn actor_for(&self, breakpoint_id: &str) -> Option<String> {
		self.actors.lock().get(breakpoint_id).cloned()
	}

	fn insert(&self, breakpoint_id: String, actor_id: String) {
		self.actors.lock().insert(breakpoint_id, actor_id);
	}

	fn remove(&self, breakpoint_id: &str) {
		self.actors.lock().remove(breakpoint_id);
	}
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum SourceRequest {
	Source,
	SetBreakpoint {
		location: BreakpointLocation,
		#[serde(default)]
		condition: Option<String>,
	},
}

#[derive(Deserialize)]
struct BreakpointLocation {
	line: u32,
	#[serde(default)]
	column: Option<u32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScriptSource {
	script_source: String,
}

/// `Debugger.setBreakpoint` reports a single resolved location.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SetBreakpointByIdResult {
	breakpoint_id: String,
	actual_location: Location,
}

pub struct SourceActor {
	id: String,
	tab: Arc<TabContext>,
	script: ScriptParsed,
	breakpoints: Arc<Breakpoints>,
}

impl std::fmt::Debug for SourceActor {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SourceActor")
			.field("id", &self.id)
			.field("url", &self.script.url)
			.finish()
	}
}

impl SourceActor {
	pub fn new(id: String, tab: Arc<TabContext>, script: ScriptParsed, breakpoints: Arc<Breakpoints>) -> Self {
		Self {
			id,
			tab,
			script,
			breakpoints,
		}
	}

	pub fn script_id(&self) -> &str {
		&self.script.script_id
	}

	pub fn form(&self) -> Value {
		json!({
			"actor": self.id,
			"url": self.script.url,
			"isBlackBoxed": false,
		})
	}

	async fn set_breakpoint(
		&self,
		conn: &Arc<Connection>,
		location: BreakpointLocation,
		condition: Option<String>,
	) -> Result<Value> {
		let line = location.line.saturating_sub(1);
		let condition = condition.unwrap_or_default();
		let rpc = &self.tab.rpc;

		let (breakpoint_id, actual) = if self.script.url.is_empty() {
			let mut target = json!({ "scriptId": self.script.script_id, "lineNumber": line });
			if let Some(column) = location.column {
				target["columnNumber"] = json!(column);
			}
			let result: SetBreakpointByIdResult = rpc
				.request_as("Debugger.setBreakpoint", json!({ "location": target, "condition": condition }))
				.await?;
			(result.breakpoint_id, Some(result.actual_location))
		} else {
			let mut params = json!({ "url": self.script.url, "lineNumber": line, "condition": condition });
			if let Some(column) = location.column {
				params["columnNumber"] = json!(column);
			}
			let result: SetBreakpointResult = rpc.request_as("Debugger.setBreakpointByUrl", params).await?;
			let actual = result.locations.into_iter().next();
			(result.breakpoint_id, actual)
		};

		let actor_id = conn.alloc_id("breakpoint");
		conn.manage(
			&self.id,
			Arc::new(BreakpointActor {
				id: actor_id.clone(),
				tab: Arc::clone(&self.tab),
				breakpoint_id: breakpoint_id.clone(),
				breakpoints: Arc::clone(&self.breakpoints),
			}),
		);
		self.breakpoints.insert(breakpoint_id, actor_id.clone());

		let mut reply = json!({ "actor": actor_id });
		if let Some(actual) = actual.filter(|actual| actual.line_number != line) {
			reply["actualLocation"] = json!({
				"source": self.form(),
				"line": actual.line_number + 1,
				"column": actual.column_number,
			});
		}
		Ok(reply)
	}
}

#[async_trait]
impl Actor for SourceActor {
	fn actor_id(&self) -> &str {
		&self.id
	}

	fn spec(&self) -> &'static ActorSpec {
		&SOURCE_SPEC
	}

	async fn handle(&self, conn: &Arc<Connection>, packet: Packet) -> Result<Value> {
		match parse_request::<SourceRequest>(&packet)? {
			SourceRequest::Source => {
				let source: ScriptSource = self
					.tab
					.rpc
					.request_as("Debugger.getScriptSource", json!({ "scriptId": self.script.script_id }))
					.await?;
				let scope = GripScope::new(Arc::clone(&self.tab), self.id.clone());
				Ok(json!({
					"source": scope.string(&source.script_source),
					"contentType": "text/javascript",
				}))
			}
			SourceRequest::SetBreakpoint { location, condition } => {
				self.set_breakpoint(conn, location, condition).await
			}
		}
	}
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum BreakpointRequest {
	Delete,
}

#[derive(Debug)]
pub struct BreakpointActor {
	id: String,
	tab: Arc<TabContext>,
	breakpoint_id: String,
	breakpoints: Arc<Breakpoints>,
}

#[async_trait]
impl Actor for BreakpointActor {
	fn actor_id(&self) -> &str {
		&self.id
	}

	fn spec(&self) -> &'static ActorSpec {
		&BREAKPOINT_SPEC
	}

	async fn handle(&self, conn: &Arc<Connection>, packet: Packet) -> Result<Value> {
		match parse_request::<BreakpointRequest>(&packet)? {
			BreakpointRequest::Delete => {
				self.tab
					.rpc
					.request("Debugger.removeBreakpoint", json!({ "breakpointId": self.breakpoint_id }))
					.await?;
				conn.unmanage(&self.id);
				Ok(json!({}))
			}
		}
	}

	fn on_unmanaged(&self) {
		self.breakpoints.remove(&self.breakpoint_id);
	}
}

#[cfg(test)]
mod tests {
	use bridge_runtime::testing::{MockReply, MockTarget};

	use super::*;
	use crate::test_support::tab_fixture;

	fn script(url: &str) -> ScriptParsed {
		ScriptParsed {
			script_id: "7".into(),
			url: url.into(),
			..Default::default()
		}
	}

	fn target() -> MockTarget {
		MockTarget::with_responder(|method, params| match method {
			"Debugger.getScriptSource" => json!({"scriptSource": "let x = 1;"}).into(),
			"Debugger.setBreakpointByUrl" => json!({"breakpointId": "bp-url",
				"locations": [{"scriptId": "7", "lineNumber": params["lineNumber"].as_u64().unwrap() + 1, "columnNumber": 0}]})
			.into(),
			"Debugger.setBreakpoint" => json!({"breakpointId": "bp-script",
				"actualLocation": {"scriptId": "7", "lineNumber": params["location"]["lineNumber"], "columnNumber": 0}})
			.into(),
			_ => MockReply::ok(),
		})
	}

	#[tokio::test]
	async fn test_source_text() {
		let target = target();
		let (conn, tab) = tab_fixture(&target);
		let breakpoints = Arc::new(Breakpoints::default());
		conn.manage(
			"conn0.thread1",
			Arc::new(SourceActor::new("conn0.source1".into(), tab, script("http://a/app.js"), breakpoints)),
		);

		let reply = conn.dispatch(json!({"to": "conn0.source1", "type": "source"})).await;
		assert_eq!(reply["source"], "let x = 1;");
		assert_eq!(target.last_params("Debugger.getScriptSource"), Some(json!({"scriptId": "7"})));
	}

	#[tokio::test]
	async fn test_set_and_delete_breakpoint_by_url() {
		let target = target();
		let (conn, tab) = tab_fixture(&target);
		let breakpoints = Arc::new(Breakpoints::default());
		conn.manage(
			"conn0.thread1",
			Arc::new(SourceActor::new(
				"conn0.source1".into(),
				tab,
				script("http://a/app.js"),
				Arc::clone(&breakpoints),
			)),
		);

		let reply = conn
			.dispatch(json!({"to": "conn0.source1", "type": "setBreakpoint", "location": {"line": 3}}))
			.await;
		let actor = reply["actor"].as_str().unwrap().to_string();
		assert_eq!(reply["actualLocation"]["line"], 4);
		assert_eq!(
			target.last_params("Debugger.setBreakpointByUrl").unwrap()["lineNumber"],
			2
		);
		assert_eq!(breakpoints.actor_for("bp-url").as_deref(), Some(actor.as_str()));

		conn.dispatch(json!({"to": actor, "type": "delete"})).await;
		assert_eq!(
			target.last_params("Debugger.removeBreakpoint"),
			Some(json!({"breakpointId": "bp-url"}))
		);
		assert!(breakpoints.actor_for("bp-url").is_none());
		assert!(!conn.has_actor(&actor));
	}

	#[tokio::test]
	async fn test_breakpoint_in_anonymous_script() {
		let target = target();
		let (conn, tab) = tab_fixture(&target);
		conn.manage(
			"conn0.thread1",
			Arc::new(SourceActor::new("conn0.source1".into(), tab, script(""), Arc::default())),
		);

		let reply = conn
			.dispatch(json!({"to": "conn0.source1", "type": "setBreakpoint", "location": {"line": 1, "column": 4}}))
			.await;
		assert!(reply["actor"].is_string());
		assert!(reply.get("actualLocation").is_none());
		let params = target.last_params("Debugger.setBreakpoint").unwrap();
		assert_eq!(params["location"], json!({"scriptId": "7", "lineNumber": 0, "columnNumber": 4}));
	}
}
