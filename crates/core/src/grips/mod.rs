//! Wire representations of remote values.
//!
//! Primitives marshal as literals (or typed grips for the values JSON cannot
//! carry). Objects and functions become [`ObjectGripActor`]s, cached per
//! `(pool, objectId)` so the front-end sees one actor per remote object for
//! as long as the owning pool lives.

pub mod long_string;
pub mod object;
pub mod preview;
pub mod stringify;

use std::sync::Arc;

use bridge_protocol::target::{EvaluateResult, GetPropertiesResult, RemoteObject};
use bridge_runtime::{Error, Result, RpcClient};
use serde_json::{Value, json};

use crate::context::TabContext;
pub use long_string::LongStringActor;
pub use object::ObjectGripActor;

/// Strings longer than this are sent as `longString` grips.
pub const LONG_STRING_LENGTH: usize = 10_000;

/// Characters inlined in a `longString` grip's `initial` field.
pub const LONG_STRING_INITIAL_LENGTH: usize = 1_000;

/// Grip for a value that needs no actor, or `None` for objects, functions
/// and long strings.
pub fn primitive_grip(object: &RemoteObject) -> Option<Value> {
	match object.kind.as_str() {
		"undefined" => Some(json!({ "type": "undefined" })),
		"object" if object.subtype.as_deref() == Some("null") => Some(json!({ "type": "null" })),
		"number" => Some(match object.unserializable_value.as_deref() {
			Some(special @ ("NaN" | "Infinity" | "-Infinity" | "-0")) => json!({ "type": special }),
			Some(other) => other.parse::<f64>().map(Value::from).unwrap_or(Value::Null),
			None => object.value.clone().unwrap_or(Value::Null),
		}),
		"bigint" => {
			let text = object
				.unserializable_value
				.as_deref()
				.or(object.description.as_deref())
				.unwrap_or_default()
				.trim_end_matches('n');
			Some(json!({ "type": "BigInt", "text": text }))
		}
		"boolean" => Some(object.value.clone().unwrap_or(Value::Bool(false))),
		"string" => match object.value.as_ref() {
			Some(Value::String(text)) if is_long(text) => None,
			Some(value) => Some(value.clone()),
			None => Some(Value::String(String::new())),
		},
		"symbol" => Some(json!({
			"type": "symbol",
			"name": symbol_name(object.description.as_deref().unwrap_or_default()),
		})),
		_ => None,
	}
}

fn is_long(text: &str) -> bool {
	text.chars().count() > LONG_STRING_LENGTH
}

/// `Symbol(foo)` to `foo`.
fn symbol_name(description: &str) -> &str {
	description
		.strip_prefix("Symbol(")
		.and_then(|rest| rest.strip_suffix(')'))
		.unwrap_or(description)
}

/// Marshalling context: grips created through a scope are owned by its pool.
#[derive(Clone)]
pub struct GripScope {
	tab: Arc<TabContext>,
	pool: String,
}

impl std::fmt::Debug for GripScope {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("GripScope").field("pool", &self.pool).finish()
	}
}

impl GripScope {
	pub fn new(tab: Arc<TabContext>, pool: impl Into<String>) -> Self {
		Self {
			tab,
			pool: pool.into(),
		}
	}

	pub fn tab(&self) -> &Arc<TabContext> {
		&self.tab
	}

	pub fn rpc(&self) -> &RpcClient {
		&self.tab.rpc
	}

	pub fn pool(&self) -> &str {
		&self.pool
	}

	/// Grip without a preview.
	pub fn grip(&self, object: &RemoteObject) -> Value {
		if let Some(grip) = primitive_grip(object) {
			return grip;
		}
		if object.kind == "string" {
			let text = object.value.as_ref().and_then(Value::as_str).unwrap_or_default();
			return self.long_string(text);
		}
		match self.object_actor(object) {
			Some(actor) => actor.base_form(),
			// Objects without an id arrive by value.
			None => object.value.clone().unwrap_or_else(|| json!({ "type": "undefined" })),
		}
	}

	/// Grip with the preview loaded from the target.
	pub async fn grip_with_preview(&self, object: &RemoteObject) -> Value {
		match self.object_actor(object) {
			Some(actor) => actor.form().await,
			None => self.grip(object),
		}
	}

	/// The grip actor for an object or function, created on first reference.
	pub fn object_actor(&self, object: &RemoteObject) -> Option<Arc<ObjectGripActor>> {
		if !matches!(object.kind.as_str(), "object" | "function") {
			return None;
		}
		let object_id = object.object_id.as_deref()?;
		let conn = self.tab.conn().ok()?;

		if let Some(id) = self.tab.cached_grip(&self.pool, object_id) {
			if let Some(actor) = conn.get_typed::<ObjectGripActor>(&id) {
				return Some(actor);
			}
			self.tab.forget_grip(&id);
		}

		let id = conn.alloc_id("obj");
		let actor = Arc::new(ObjectGripActor::new(id.clone(), self.clone(), object.clone()));
		conn.manage(&self.pool, actor.clone());
		self.tab.remember_grip(&self.pool, object_id, id);
		Some(actor)
	}

	/// `text` as a plain string, or a `longString` grip when it is too long.
	pub fn string(&self, text: &str) -> Value {
		if is_long(text) {
			self.long_string(text)
		} else {
			Value::String(text.to_string())
		}
	}

	fn long_string(&self, text: &str) -> Value {
		let Ok(conn) = self.tab.conn() else {
			return Value::String(text.to_string());
		};
		let actor = Arc::new(LongStringActor::new(conn.alloc_id("longString"), text.to_string()));
		let form = actor.form();
		conn.manage(&self.pool, actor);
		form
	}
}

/// `Runtime.getProperties` for own properties.
pub(crate) async fn own_properties(rpc: &RpcClient, object_id: &str) -> Result<GetPropertiesResult> {
	rpc.request_as(
		"Runtime.getProperties",
		json!({ "objectId": object_id, "ownProperties": true, "generatePreview": false }),
	)
	.await
}

/// Calls `declaration` with `this` bound to the remote object.
///
/// A thrown exception becomes [`Error::Evaluation`].
pub(crate) async fn call_function_on(
	rpc: &RpcClient,
	object_id: &str,
	declaration: &str,
	by_value: bool,
) -> Result<RemoteObject> {
	let result: EvaluateResult = rpc
		.request_as(
			"Runtime.callFunctionOn",
			json!({
				"objectId": object_id,
				"functionDeclaration": declaration,
				"returnByValue": by_value,
				"silent": true,
			}),
		)
		.await?;
	if result.threw() {
		let message = result
			.exception_details
			.map(|details| details.message())
			.unwrap_or_else(|| "function threw".to_string());
		return Err(Error::Evaluation(message));
	}
	Ok(result.result)
}

#[cfg(test)]
mod tests {
	use bridge_runtime::testing::MockTarget;

	use super::*;
	use crate::test_support::tab_fixture;

	fn remote(value: Value) -> RemoteObject {
		serde_json::from_value(value).unwrap()
	}

	#[test]
	fn test_special_number_grips() {
		for special in ["NaN", "Infinity", "-Infinity", "-0"] {
			let object = remote(json!({"type": "number", "unserializableValue": special}));
			assert_eq!(primitive_grip(&object), Some(json!({"type": special})));
		}
		let object = remote(json!({"type": "number", "value": 4.5}));
		assert_eq!(primitive_grip(&object), Some(json!(4.5)));
	}

	#[test]
	fn test_typed_primitive_grips() {
		let undefined = remote(json!({"type": "undefined"}));
		assert_eq!(primitive_grip(&undefined), Some(json!({"type": "undefined"})));

		let null = remote(json!({"type": "object", "subtype": "null", "value": null}));
		assert_eq!(primitive_grip(&null), Some(json!({"type": "null"})));

		let big = remote(json!({"type": "bigint", "unserializableValue": "12345678901234567890n"}));
		assert_eq!(
			primitive_grip(&big),
			Some(json!({"type": "BigInt", "text": "12345678901234567890"}))
		);

		let symbol = remote(json!({"type": "symbol", "description": "Symbol(tag)", "objectId": "s1"}));
		assert_eq!(primitive_grip(&symbol), Some(json!({"type": "symbol", "name": "tag"})));

		let object = remote(json!({"type": "object", "className": "Object", "objectId": "o1"}));
		assert_eq!(primitive_grip(&object), None);
	}

	#[tokio::test]
	async fn test_object_grip_identity_per_pool() {
		let target = MockTarget::new();
		let (conn, tab) = tab_fixture(&target);
		let object = remote(json!({"type": "object", "className": "Object", "objectId": "{\"id\":7}"}));

		let scope = GripScope::new(tab.clone(), "conn0.pause1");
		let first = scope.grip(&object);
		let second = scope.grip(&object);
		assert_eq!(first["actor"], second["actor"]);
		assert_eq!(first["type"], "object");
		assert_eq!(first["class"], "Object");

		let other = GripScope::new(tab, "conn0.pause2");
		assert_ne!(other.grip(&object)["actor"], first["actor"]);

		let id = first["actor"].as_str().unwrap();
		assert!(conn.has_actor(id));
		assert_eq!(conn.pool_of("conn0.pause1"), vec![id.to_string()]);
	}

	#[tokio::test]
	async fn test_grip_recreated_after_release() {
		let target = MockTarget::new();
		let (conn, tab) = tab_fixture(&target);
		let object = remote(json!({"type": "object", "className": "Object", "objectId": "o"}));
		let scope = GripScope::new(tab, "conn0.pool");

		let first = scope.grip(&object)["actor"].as_str().unwrap().to_string();
		conn.unmanage(&first);
		let second = scope.grip(&object)["actor"].as_str().unwrap().to_string();
		assert_ne!(first, second);
	}

	#[tokio::test]
	async fn test_long_string_grip() {
		let target = MockTarget::new();
		let (conn, tab) = tab_fixture(&target);
		let scope = GripScope::new(tab, "conn0.pool");

		let text = "a".repeat(LONG_STRING_LENGTH + 5);
		let grip = scope.grip(&RemoteObject::primitive(Value::String(text)));
		assert_eq!(grip["type"], "longString");
		assert_eq!(grip["length"], LONG_STRING_LENGTH + 5);
		assert_eq!(grip["initial"].as_str().unwrap().len(), LONG_STRING_INITIAL_LENGTH);
		assert!(conn.has_actor(grip["actor"].as_str().unwrap()));

		assert_eq!(scope.string("short"), json!("short"));
	}
}
