//! Two-phase object previews.
//!
//! [`Handle::load`] runs the loader selected for a value and keeps whatever
//! it fetched. [`Handle::generate`] turns that into the wire preview, making
//! nested grips through the [`GripScope`] it is given, so one loaded handle
//! can be rendered into several pools.
//!
//! Loaders are chosen by [`loader_for`]: first by `type`, then by
//! `(object, subtype)`, then by `className`, falling back to the plain
//! object loader.

use std::sync::LazyLock;

use bridge_protocol::target::{PropertyDescriptor, RemoteObject};
use bridge_runtime::{Result, RpcClient};
use regex::Regex;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::{GripScope, call_function_on, own_properties};

/// Class names handled by the error loader.
pub const ERROR_CLASSES: &[&str] = &[
	"Error",
	"EvalError",
	"RangeError",
	"ReferenceError",
	"SyntaxError",
	"TypeError",
	"URIError",
	"AggregateError",
	"InternalError",
	"DOMException",
];

const SET_TO_ARRAY: &str = "function() { return Array.from(this); }";

const MAP_TO_OBJECT: &str = "function() { \
	const out = Object.create(null); \
	for (const [k, v] of this) out[String(k)] = v; \
	return out; }";

const ERROR_FIELDS: &str = "function() { return { \
	name: this.name, message: String(this.message), stack: this.stack, \
	fileName: this.fileName, lineNumber: this.lineNumber, columnNumber: this.columnNumber }; }";

const NODE_FIELDS: &str = "function() { return { \
	nodeType: this.nodeType, nodeName: this.nodeName, isConnected: this.isConnected, \
	attributes: this.attributes ? Array.from(this.attributes, a => [a.name, a.value]) : [] }; }";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoaderKind {
	Function,
	ArrayLike,
	Map,
	Set,
	Error,
	DomNode,
	Promise,
	Object,
}

/// Chooses the preview loader for a value.
pub fn loader_for(object: &RemoteObject) -> LoaderKind {
	by_type(&object.kind)
		.or_else(|| {
			(object.kind == "object")
				.then(|| object.subtype.as_deref().and_then(by_subtype))
				.flatten()
		})
		.or_else(|| by_class(object.class()))
		.unwrap_or(LoaderKind::Object)
}

fn by_type(kind: &str) -> Option<LoaderKind> {
	match kind {
		"function" => Some(LoaderKind::Function),
		_ => None,
	}
}

fn by_subtype(subtype: &str) -> Option<LoaderKind> {
	match subtype {
		"array" | "typedarray" => Some(LoaderKind::ArrayLike),
		"error" => Some(LoaderKind::Error),
		"node" => Some(LoaderKind::DomNode),
		"promise" => Some(LoaderKind::Promise),
		"map" => Some(LoaderKind::Map),
		"set" => Some(LoaderKind::Set),
		_ => None,
	}
}

fn by_class(class: &str) -> Option<LoaderKind> {
	match class {
		"Map" => Some(LoaderKind::Map),
		"Set" => Some(LoaderKind::Set),
		"NodeList" | "HTMLCollection" | "StyleSheetList" | "CSSRuleList" | "Arguments" => Some(LoaderKind::ArrayLike),
		"Promise" => Some(LoaderKind::Promise),
		class if ERROR_CLASSES.contains(&class) => Some(LoaderKind::Error),
		_ => None,
	}
}

/// Name and parameters recovered from a function's source text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionInfo {
	pub name: String,
	pub parameter_names: Vec<String>,
}

static FUNCTION_RE: LazyLock<Regex> = LazyLock::new(|| {
	Regex::new(r"^\s*(?:async\s+)?function\s*\*?\s*([A-Za-z_$][\w$]*)?\s*\(([^)]*)\)").unwrap()
});

static CLASS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\s*class\s+([A-Za-z_$][\w$]*)").unwrap());

static ARROW_RE: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"^\s*(?:async\s+)?(?:\(([^)]*)\)|([A-Za-z_$][\w$]*))\s*=>").unwrap());

static METHOD_RE: LazyLock<Regex> =
	LazyLock::new(|| Regex::new(r"^\s*(?:async\s+)?\*?\s*([A-Za-z_$][\w$]*)\s*\(([^)]*)\)\s*\{").unwrap());

impl FunctionInfo {
	pub fn parse(source: &str) -> Self {
		if let Some(caps) = FUNCTION_RE.captures(source) {
			return Self::new(caps.get(1).map_or("", |m| m.as_str()), &caps[2]);
		}
		if let Some(caps) = CLASS_RE.captures(source) {
			return Self::new(&caps[1], "");
		}
		if let Some(caps) = ARROW_RE.captures(source) {
			let params = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
			return Self::new("", params);
		}
		if let Some(caps) = METHOD_RE.captures(source) {
			return Self::new(&caps[1], &caps[2]);
		}
		Self::default()
	}

	fn new(name: &str, params: &str) -> Self {
		let parameter_names = params
			.split(',')
			.map(|param| {
				let param = param.split('=').next().unwrap_or_default().trim();
				param.trim_start_matches("...").to_string()
			})
			.filter(|param| !param.is_empty())
			.collect();
		Self {
			name: name.to_string(),
			parameter_names,
		}
	}
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
	#[serde(default)]
	pub name: Option<String>,
	#[serde(default)]
	pub message: Option<String>,
	#[serde(default)]
	pub stack: Option<String>,
	#[serde(default)]
	pub file_name: Option<String>,
	#[serde(default)]
	pub line_number: Option<u32>,
	#[serde(default)]
	pub column_number: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeInfo {
	#[serde(default)]
	pub node_type: u32,
	#[serde(default)]
	pub node_name: String,
	#[serde(default)]
	pub is_connected: bool,
	#[serde(default)]
	pub attributes: Vec<(String, String)>,
}

/// Data fetched by a loader, waiting for the generate phase.
#[derive(Debug, Clone, PartialEq)]
pub enum Loaded {
	Function(FunctionInfo),
	ArrayLike { length: usize, items: Vec<RemoteObject> },
	Object { length: usize, properties: Vec<PropertyDescriptor> },
	Error(ErrorInfo),
	DomNode(NodeInfo),
	Promise { state: String, result: Option<RemoteObject> },
	None,
}

/// A remote value together with its loaded preview data.
#[derive(Debug, Clone)]
pub struct Handle {
	pub object: RemoteObject,
	pub loaded: Loaded,
}

impl Handle {
	/// Runs the selected loader, fetching at most `max_items` entries.
	///
	/// Failures degrade to an empty preview.
	pub async fn load(rpc: &RpcClient, object: RemoteObject, max_items: usize) -> Self {
		let loaded = match load(rpc, &object, max_items).await {
			Ok(loaded) => loaded,
			Err(e) => {
				tracing::debug!(error = %e, class = object.class(), "preview load failed");
				Loaded::None
			}
		};
		Self { object, loaded }
	}

	/// Adds the preview (and function or promise fields) to `form`.
	pub fn generate(&self, scope: &GripScope, form: &mut Map<String, Value>) {
		match &self.loaded {
			Loaded::Function(info) => {
				form.insert("name".into(), json!(info.name));
				form.insert("displayName".into(), json!(info.name));
				form.insert("parameterNames".into(), json!(info.parameter_names));
			}
			Loaded::ArrayLike { length, items } => {
				let items: Vec<Value> = items.iter().map(|item| scope.grip(item)).collect();
				form.insert("preview".into(), json!({ "kind": "ArrayLike", "length": length, "items": items }));
			}
			Loaded::Object { length, properties } => {
				let mut own = Map::new();
				for property in properties {
					own.insert(property.name.clone(), descriptor_form(scope, property));
				}
				form.insert("ownPropertyLength".into(), json!(length));
				form.insert(
					"preview".into(),
					json!({ "kind": "Object", "ownProperties": own, "ownPropertiesLength": length }),
				);
			}
			Loaded::Error(info) => {
				form.insert(
					"preview".into(),
					json!({
						"kind": "Error",
						"name": info.name.clone().unwrap_or_else(|| self.object.class().to_string()),
						"message": info.message.clone().unwrap_or_default(),
						"stack": info.stack.clone().unwrap_or_default(),
						"fileName": info.file_name,
						"lineNumber": info.line_number,
						"columnNumber": info.column_number,
					}),
				);
			}
			Loaded::DomNode(info) => {
				let attributes: Map<String, Value> = info
					.attributes
					.iter()
					.map(|(name, value)| (name.clone(), Value::String(value.clone())))
					.collect();
				form.insert(
					"preview".into(),
					json!({
						"kind": "DOMNode",
						"nodeType": info.node_type,
						"nodeName": info.node_name.to_lowercase(),
						"isConnected": info.is_connected,
						"attributesLength": attributes.len(),
						"attributes": attributes,
					}),
				);
			}
			Loaded::Promise { state, result } => {
				let mut promise = Map::new();
				promise.insert("state".into(), json!(state));
				if let Some(result) = result {
					match state.as_str() {
						"fulfilled" => {
							promise.insert("value".into(), scope.grip(result));
						}
						"rejected" => {
							promise.insert("reason".into(), scope.grip(result));
						}
						_ => {}
					}
				}
				form.insert("promiseState".into(), Value::Object(promise));
			}
			Loaded::None => {}
		}
	}
}

/// Property descriptor as sent to the front-end.
pub fn descriptor_form(scope: &GripScope, property: &PropertyDescriptor) -> Value {
	let mut form = Map::new();
	form.insert("configurable".into(), json!(property.configurable));
	form.insert("enumerable".into(), json!(property.enumerable));
	match &property.value {
		Some(value) => {
			form.insert("writable".into(), json!(property.writable.unwrap_or(false)));
			form.insert("value".into(), scope.grip(value));
		}
		None => {
			let undefined = json!({ "type": "undefined" });
			form.insert("get".into(), property.get.as_ref().map_or(undefined.clone(), |g| scope.grip(g)));
			form.insert("set".into(), property.set.as_ref().map_or(undefined, |s| scope.grip(s)));
		}
	}
	Value::Object(form)
}

async fn load(rpc: &RpcClient, object: &RemoteObject, max_items: usize) -> Result<Loaded> {
	let kind = loader_for(object);
	if kind == LoaderKind::Function {
		return Ok(Loaded::Function(FunctionInfo::parse(
			object.description.as_deref().unwrap_or_default(),
		)));
	}
	let Some(object_id) = object.object_id.as_deref() else {
		return Ok(Loaded::None);
	};

	match kind {
		LoaderKind::ArrayLike => load_array_like(rpc, object_id, max_items).await,
		LoaderKind::Set => {
			let array = call_function_on(rpc, object_id, SET_TO_ARRAY, false).await?;
			match array.object_id.as_deref() {
				Some(id) => load_array_like(rpc, id, max_items).await,
				None => Ok(Loaded::None),
			}
		}
		LoaderKind::Map => {
			let entries = call_function_on(rpc, object_id, MAP_TO_OBJECT, false).await?;
			match entries.object_id.as_deref() {
				Some(id) => load_object(rpc, id, max_items).await,
				None => Ok(Loaded::None),
			}
		}
		LoaderKind::Error => {
			let fields = call_function_on(rpc, object_id, ERROR_FIELDS, true).await?;
			Ok(Loaded::Error(from_by_value(fields)?))
		}
		LoaderKind::DomNode => {
			let fields = call_function_on(rpc, object_id, NODE_FIELDS, true).await?;
			Ok(Loaded::DomNode(from_by_value(fields)?))
		}
		LoaderKind::Promise => load_promise(rpc, object_id).await,
		LoaderKind::Object | LoaderKind::Function => load_object(rpc, object_id, max_items).await,
	}
}

fn from_by_value<T: serde::de::DeserializeOwned + Default>(object: RemoteObject) -> Result<T> {
	match object.value {
		Some(value) => Ok(serde_json::from_value(value)?),
		None => Ok(T::default()),
	}
}

async fn load_array_like(rpc: &RpcClient, object_id: &str, max_items: usize) -> Result<Loaded> {
	let properties = own_properties(rpc, object_id).await?.result;

	let mut indexed: Vec<(usize, RemoteObject)> = properties
		.iter()
		.filter_map(|p| Some((p.name.parse::<usize>().ok()?, p.value.clone()?)))
		.collect();
	indexed.sort_by_key(|(index, _)| *index);

	let length = properties
		.iter()
		.find(|p| p.name == "length")
		.and_then(|p| p.value.as_ref()?.value.as_ref()?.as_u64())
		.map_or(indexed.len(), |n| n as usize);

	let items = indexed.into_iter().take(max_items).map(|(_, value)| value).collect();
	Ok(Loaded::ArrayLike { length, items })
}

async fn load_object(rpc: &RpcClient, object_id: &str, max_items: usize) -> Result<Loaded> {
	let properties: Vec<PropertyDescriptor> = own_properties(rpc, object_id)
		.await?
		.result
		.into_iter()
		.filter(|p| p.name != "__proto__")
		.collect();
	let length = properties.len();
	let properties = properties
		.into_iter()
		.filter(|p| !p.is_getter_only())
		.take(max_items)
		.collect();
	Ok(Loaded::Object { length, properties })
}

async fn load_promise(rpc: &RpcClient, object_id: &str) -> Result<Loaded> {
	let internal = own_properties(rpc, object_id).await?.internal_properties;
	let state = internal
		.iter()
		.find(|p| p.name == "[[PromiseState]]")
		.and_then(|p| p.value.as_ref()?.value.as_ref()?.as_str().map(str::to_string))
		.unwrap_or_else(|| "pending".to_string());
	let result = internal
		.iter()
		.find(|p| p.name == "[[PromiseResult]]" || p.name == "[[PromiseValue]]")
		.and_then(|p| p.value.clone());
	Ok(Loaded::Promise { state, result })
}

#[cfg(test)]
mod tests {
	use bridge_runtime::testing::{MockReply, MockTarget};

	use super::*;
	use crate::test_support::tab_fixture;

	fn remote(value: Value) -> RemoteObject {
		serde_json::from_value(value).unwrap()
	}

	#[test]
	fn test_type_takes_precedence() {
		let object = remote(json!({"type": "function", "className": "Map"}));
		assert_eq!(loader_for(&object), LoaderKind::Function);
	}

	#[test]
	fn test_subtype_takes_precedence_over_class() {
		let object = remote(json!({"type": "object", "subtype": "array", "className": "Map"}));
		assert_eq!(loader_for(&object), LoaderKind::ArrayLike);

		let object = remote(json!({"type": "object", "subtype": "error", "className": "Set"}));
		assert_eq!(loader_for(&object), LoaderKind::Error);
	}

	#[test]
	fn test_class_name_dispatch() {
		let cases = [
			("Map", LoaderKind::Map),
			("Set", LoaderKind::Set),
			("NodeList", LoaderKind::ArrayLike),
			("StyleSheetList", LoaderKind::ArrayLike),
			("TypeError", LoaderKind::Error),
			("DOMException", LoaderKind::Error),
			("Promise", LoaderKind::Promise),
		];
		for (class, expected) in cases {
			let object = remote(json!({"type": "object", "className": class}));
			assert_eq!(loader_for(&object), expected, "{class}");
		}
	}

	#[test]
	fn test_unknown_subtype_falls_through_to_class() {
		let object = remote(json!({"type": "object", "subtype": "proxy", "className": "Map"}));
		assert_eq!(loader_for(&object), LoaderKind::Map);
	}

	#[test]
	fn test_default_loader() {
		let object = remote(json!({"type": "object", "className": "Window"}));
		assert_eq!(loader_for(&object), LoaderKind::Object);
	}

	#[test]
	fn test_function_info_parse() {
		let info = FunctionInfo::parse("function add(a, b = 2, ...rest) { return a + b; }");
		assert_eq!(info.name, "add");
		assert_eq!(info.parameter_names, ["a", "b", "rest"]);

		let info = FunctionInfo::parse("async (x, y) => x + y");
		assert_eq!(info.name, "");
		assert_eq!(info.parameter_names, ["x", "y"]);

		let info = FunctionInfo::parse("value => value");
		assert_eq!(info.parameter_names, ["value"]);

		let info = FunctionInfo::parse("class Widget { constructor(a) {} }");
		assert_eq!(info.name, "Widget");
		assert!(info.parameter_names.is_empty());

		let info = FunctionInfo::parse("render(props) { }");
		assert_eq!(info.name, "render");
		assert_eq!(info.parameter_names, ["props"]);
	}

	fn index_props(values: &[i64]) -> Value {
		let mut result: Vec<Value> = values
			.iter()
			.enumerate()
			.map(|(i, v)| {
				json!({"name": i.to_string(), "value": {"type": "number", "value": v},
					"configurable": true, "enumerable": true, "writable": true})
			})
			.collect();
		result.push(json!({"name": "length", "value": {"type": "number", "value": values.len()}}));
		json!({ "result": result })
	}

	#[tokio::test]
	async fn test_array_preview_bounded_by_max_items() {
		let values: Vec<i64> = (0..15).collect();
		let target = MockTarget::with_responder(move |_, _| index_props(&values).into());
		let (_conn, tab) = tab_fixture(&target);
		let scope = GripScope::new(tab.clone(), "conn0.pool");

		let object = remote(json!({"type": "object", "subtype": "array", "className": "Array", "objectId": "arr"}));
		let handle = Handle::load(&tab.rpc, object, 10).await;
		let mut form = Map::new();
		handle.generate(&scope, &mut form);

		assert_eq!(form["preview"]["kind"], "ArrayLike");
		assert_eq!(form["preview"]["length"], 15);
		assert_eq!(form["preview"]["items"].as_array().unwrap().len(), 10);
		assert_eq!(form["preview"]["items"][3], 3);
	}

	#[tokio::test]
	async fn test_set_materialized_before_array_preview() {
		let target = MockTarget::with_responder(|method, params| match method {
			"Runtime.callFunctionOn" => {
				json!({"result": {"type": "object", "subtype": "array", "objectId": "materialized"}}).into()
			}
			"Runtime.getProperties" if params["objectId"] == "materialized" => index_props(&[7, 8]).into(),
			_ => MockReply::error("unexpected"),
		});
		let (_conn, tab) = tab_fixture(&target);
		let object = remote(json!({"type": "object", "subtype": "set", "className": "Set", "objectId": "s"}));

		let handle = Handle::load(&tab.rpc, object, 10).await;
		assert_eq!(
			handle.loaded,
			Loaded::ArrayLike {
				length: 2,
				items: vec![
					remote(json!({"type": "number", "value": 7})),
					remote(json!({"type": "number", "value": 8}))
				],
			}
		);
		let call = target.last_params("Runtime.callFunctionOn").unwrap();
		assert_eq!(call["objectId"], "s");
	}

	#[tokio::test]
	async fn test_object_preview_skips_getters() {
		let target = MockTarget::with_responder(|_, _| {
			json!({"result": [
				{"name": "a", "value": {"type": "number", "value": 1}, "configurable": true, "enumerable": true, "writable": true},
				{"name": "computed", "get": {"type": "function", "objectId": "g"}, "configurable": true, "enumerable": true},
				{"name": "__proto__", "value": {"type": "object", "objectId": "p"}},
			]})
			.into()
		});
		let (_conn, tab) = tab_fixture(&target);
		let scope = GripScope::new(tab.clone(), "conn0.pool");
		let object = remote(json!({"type": "object", "className": "Object", "objectId": "o"}));

		let handle = Handle::load(&tab.rpc, object, 10).await;
		let mut form = Map::new();
		handle.generate(&scope, &mut form);

		let preview = &form["preview"];
		assert_eq!(preview["ownPropertiesLength"], 2);
		assert_eq!(preview["ownProperties"]["a"]["value"], 1);
		assert!(preview["ownProperties"].get("computed").is_none());
	}

	#[tokio::test]
	async fn test_error_preview() {
		let target = MockTarget::with_responder(|_, _| {
			json!({"result": {"type": "object", "value": {
				"name": "TypeError", "message": "x is not a function",
				"stack": "TypeError: x is not a function\n    at go (app.js:3:5)",
				"fileName": null, "lineNumber": null, "columnNumber": null}}})
			.into()
		});
		let (_conn, tab) = tab_fixture(&target);
		let scope = GripScope::new(tab.clone(), "conn0.pool");
		let object = remote(json!({"type": "object", "subtype": "error", "className": "TypeError", "objectId": "e"}));

		let handle = Handle::load(&tab.rpc, object, 10).await;
		let mut form = Map::new();
		handle.generate(&scope, &mut form);
		assert_eq!(form["preview"]["kind"], "Error");
		assert_eq!(form["preview"]["name"], "TypeError");
		assert_eq!(form["preview"]["message"], "x is not a function");
	}

	#[tokio::test]
	async fn test_promise_state() {
		let target = MockTarget::with_responder(|_, _| {
			json!({"result": [], "internalProperties": [
				{"name": "[[PromiseState]]", "value": {"type": "string", "value": "fulfilled"}},
				{"name": "[[PromiseResult]]", "value": {"type": "number", "value": 42}},
			]})
			.into()
		});
		let (_conn, tab) = tab_fixture(&target);
		let scope = GripScope::new(tab.clone(), "conn0.pool");
		let object = remote(json!({"type": "object", "subtype": "promise", "className": "Promise", "objectId": "p"}));

		let handle = Handle::load(&tab.rpc, object, 10).await;
		let mut form = Map::new();
		handle.generate(&scope, &mut form);
		assert_eq!(form["promiseState"], json!({"state": "fulfilled", "value": 42}));
	}

	#[tokio::test]
	async fn test_failed_load_degrades_to_no_preview() {
		let target = MockTarget::with_responder(|_, _| MockReply::error("Could not find object"));
		let (_conn, tab) = tab_fixture(&target);
		let scope = GripScope::new(tab.clone(), "conn0.pool");
		let object = remote(json!({"type": "object", "className": "Object", "objectId": "gone"}));

		let handle = Handle::load(&tab.rpc, object, 10).await;
		assert_eq!(handle.loaded, Loaded::None);
		let mut form = Map::new();
		handle.generate(&scope, &mut form);
		assert!(form.is_empty());
	}
}
