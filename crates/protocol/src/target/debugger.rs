//! `Debugger` domain shapes: call frames, scripts and pause notifications.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::RemoteObject;

/// Zero-based script position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
	pub script_id: String,
	pub line_number: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub column_number: Option<u32>,
}

/// One scope of a call frame's scope chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scope {
	#[serde(rename = "type")]
	pub kind: String,
	pub object: RemoteObject,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
}

/// Native call frame reported by `Debugger.paused`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFrame {
	pub call_frame_id: String,
	#[serde(default)]
	pub function_name: String,
	pub location: Location,
	#[serde(default)]
	pub url: String,
	#[serde(default)]
	pub scope_chain: Vec<Scope>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub this: Option<RemoteObject>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub return_value: Option<RemoteObject>,
}

/// `Debugger.paused` event. `call_frames` is youngest first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PausedEvent {
	#[serde(default)]
	pub call_frames: Vec<CallFrame>,
	#[serde(default)]
	pub reason: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<Value>,
	#[serde(default)]
	pub hit_breakpoints: Vec<String>,
}

/// `Debugger.scriptParsed` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptParsed {
	pub script_id: String,
	#[serde(default)]
	pub url: String,
	#[serde(default)]
	pub start_line: u32,
	#[serde(default)]
	pub start_column: u32,
	#[serde(default)]
	pub end_line: u32,
	#[serde(default)]
	pub end_column: u32,
	#[serde(rename = "sourceMapURL", default, skip_serializing_if = "Option::is_none")]
	pub source_map_url: Option<String>,
}

/// Result of `Debugger.setBreakpointByUrl`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointResult {
	pub breakpoint_id: String,
	#[serde(default)]
	pub locations: Vec<Location>,
}
