//! Human-readable strings for remote values.

use std::collections::HashSet;

use bridge_protocol::target::RemoteObject;
use bridge_runtime::RpcClient;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;

use super::own_properties;
use super::preview::ERROR_CLASSES;

/// Elements joined beyond this index are ignored.
const MAX_JOINED: usize = 10_000;

/// Renders `object` the way `String(value)` would, without running page code.
pub async fn stringify(rpc: &RpcClient, object: &RemoteObject) -> String {
	let mut seen = HashSet::new();
	stringify_value(rpc, object, &mut seen).await
}

fn stringify_value<'a>(
	rpc: &'a RpcClient,
	object: &'a RemoteObject,
	seen: &'a mut HashSet<String>,
) -> BoxFuture<'a, String> {
	async move {
		match object.kind.as_str() {
			"undefined" => "undefined".to_string(),
			"string" => object
				.value
				.as_ref()
				.and_then(|v| v.as_str())
				.unwrap_or_default()
				.to_string(),
			"number" | "boolean" => match (&object.unserializable_value, &object.value) {
				(Some(special), _) => special.clone(),
				(None, Some(value)) => value.to_string(),
				(None, None) => String::new(),
			},
			"bigint" => object
				.unserializable_value
				.as_deref()
				.unwrap_or_default()
				.trim_end_matches('n')
				.to_string(),
			"symbol" | "function" => object.description.clone().unwrap_or_default(),
			"object" if object.subtype.as_deref() == Some("null") => "null".to_string(),
			_ => stringify_object(rpc, object, seen).await,
		}
	}
	.boxed()
}

async fn stringify_object(rpc: &RpcClient, object: &RemoteObject, seen: &mut HashSet<String>) -> String {
	let class = object.class();
	if object.subtype.as_deref() == Some("array") || class == "Array" {
		return stringify_array(rpc, object, seen).await;
	}
	match class {
		"Date" | "RegExp" | "String" | "Number" | "Boolean" => object.description.clone().unwrap_or_default(),
		class if ERROR_CLASSES.contains(&class) => {
			let description = object.description.as_deref().unwrap_or(class);
			description.lines().next().unwrap_or(class).to_string()
		}
		"" => "[object Object]".to_string(),
		class => format!("[object {class}]"),
	}
}

async fn stringify_array(rpc: &RpcClient, object: &RemoteObject, seen: &mut HashSet<String>) -> String {
	let Some(object_id) = object.object_id.as_deref() else {
		return String::new();
	};
	if !seen.insert(object_id.to_string()) {
		return String::new();
	}
	let properties = match own_properties(rpc, object_id).await {
		Ok(loaded) => loaded.result,
		Err(e) => {
			tracing::debug!(error = %e, "array stringify failed");
			return String::new();
		}
	};

	let length = properties
		.iter()
		.find(|p| p.name == "length")
		.and_then(|p| p.value.as_ref()?.value.as_ref()?.as_u64())
		.unwrap_or(0) as usize;

	let mut parts = Vec::with_capacity(length.min(MAX_JOINED));
	for index in 0..length.min(MAX_JOINED) {
		let name = index.to_string();
		let element = properties.iter().find(|p| p.name == name).and_then(|p| p.value.as_ref());
		let part = match element {
			None => String::new(),
			Some(e) if e.kind == "undefined" || e.subtype.as_deref() == Some("null") => String::new(),
			Some(e) => stringify_value(rpc, e, seen).await,
		};
		parts.push(part);
	}
	parts.join(",")
}

#[cfg(test)]
mod tests {
	use bridge_runtime::testing::MockTarget;
	use serde_json::{Value, json};

	use super::*;

	fn remote(value: Value) -> RemoteObject {
		serde_json::from_value(value).unwrap()
	}

	#[tokio::test]
	async fn test_class_dispatch() {
		let rpc = MockTarget::new().client();
		let cases = [
			(json!({"type": "object", "className": "HTMLDivElement", "objectId": "1"}), "[object HTMLDivElement]"),
			(json!({"type": "object", "className": "Date", "description": "Tue Jan 02 2024", "objectId": "2"}), "Tue Jan 02 2024"),
			(json!({"type": "object", "subtype": "regexp", "className": "RegExp", "description": "/a+/g", "objectId": "3"}), "/a+/g"),
			(json!({"type": "object", "className": "TypeError", "description": "TypeError: bad\n    at f (a.js:1:1)", "objectId": "4"}), "TypeError: bad"),
			(json!({"type": "object", "subtype": "null", "value": null}), "null"),
			(json!({"type": "number", "unserializableValue": "-Infinity"}), "-Infinity"),
			(json!({"type": "boolean", "value": true}), "true"),
			(json!({"type": "undefined"}), "undefined"),
		];
		for (object, expected) in cases {
			assert_eq!(stringify(&rpc, &remote(object)).await, expected);
		}
	}

	#[tokio::test]
	async fn test_array_joins_and_breaks_cycles() {
		// [1, <self>, "x", null]
		let target = MockTarget::with_responder(|_, _| {
			json!({"result": [
				{"name": "0", "value": {"type": "number", "value": 1}},
				{"name": "1", "value": {"type": "object", "subtype": "array", "className": "Array", "objectId": "self"}},
				{"name": "2", "value": {"type": "string", "value": "x"}},
				{"name": "3", "value": {"type": "object", "subtype": "null", "value": null}},
				{"name": "length", "value": {"type": "number", "value": 4}},
			]})
			.into()
		});
		let rpc = target.client();
		let array = remote(json!({"type": "object", "subtype": "array", "className": "Array", "objectId": "self"}));
		assert_eq!(stringify(&rpc, &array).await, "1,,x,");
		assert_eq!(target.methods(), ["Runtime.getProperties"]);
	}
}
