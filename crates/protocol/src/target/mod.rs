//! Payloads of the target debugging protocol.
//!
//! Only the fields the bridge reads are modelled; everything else on the
//! wire is ignored during deserialization. Every optional field defaults so
//! partial payloads from older targets still parse.

pub mod css;
pub mod debugger;
pub mod dom;
pub mod runtime;

pub use css::*;
pub use debugger::*;
pub use dom::*;
pub use runtime::*;

use serde::{Deserialize, Serialize};

/// One entry of the target listing served at `GET /json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDescriptor {
	pub id: String,
	#[serde(default)]
	pub title: String,
	#[serde(default)]
	pub url: String,
	#[serde(rename = "type", default)]
	pub kind: String,
	/// Present only when no other client is attached to the target.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub web_socket_debugger_url: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub devtools_frontend_url: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub favicon_url: Option<String>,
}

/// Error object of a failed JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseError {
	#[serde(default)]
	pub code: i64,
	#[serde(default)]
	pub message: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub data: Option<String>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_target_descriptor_without_socket() {
		let json = r#"{"id": "A1", "title": "Blank", "url": "about:blank", "type": "page"}"#;
		let target: TargetDescriptor = serde_json::from_str(json).unwrap();
		assert_eq!(target.kind, "page");
		assert!(target.web_socket_debugger_url.is_none());
	}

	#[test]
	fn test_target_descriptor_with_socket() {
		let json = r#"{
			"id": "B2",
			"title": "Example",
			"url": "https://example.com/",
			"type": "page",
			"webSocketDebuggerUrl": "ws://127.0.0.1:9222/devtools/page/B2",
			"devtoolsFrontendUrl": "/devtools/inspector.html?ws=127.0.0.1:9222/devtools/page/B2"
		}"#;
		let target: TargetDescriptor = serde_json::from_str(json).unwrap();
		assert_eq!(
			target.web_socket_debugger_url.as_deref(),
			Some("ws://127.0.0.1:9222/devtools/page/B2")
		);
	}
}
