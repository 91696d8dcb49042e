//! `Runtime` domain shapes: remote values and their properties.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Mirror of a value living in the target.
///
/// Primitives arrive inline in `value` (or `unserializable_value` for
/// `NaN`, `-0`, `Infinity` and BigInt); objects and functions carry an
/// `object_id` that stays valid until released on the target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub subtype: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub class_name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub value: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub unserializable_value: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub description: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub object_id: Option<String>,
}

impl RemoteObject {
	/// Builds a primitive mirror of `value` with the matching `type`.
	pub fn primitive(value: Value) -> Self {
		let kind = match &value {
			Value::Null => "object",
			Value::Bool(_) => "boolean",
			Value::Number(_) => "number",
			Value::String(_) => "string",
			Value::Array(_) | Value::Object(_) => "object",
		};
		Self {
			kind: kind.to_string(),
			subtype: value.is_null().then(|| "null".to_string()),
			value: Some(value),
			..Default::default()
		}
	}

	/// Returns the class name, or an empty string.
	pub fn class(&self) -> &str {
		self.class_name.as_deref().unwrap_or_default()
	}
}

/// An own or inherited property as reported by `Runtime.getProperties`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDescriptor {
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub value: Option<RemoteObject>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub writable: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub get: Option<RemoteObject>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub set: Option<RemoteObject>,
	#[serde(default)]
	pub configurable: bool,
	#[serde(default)]
	pub enumerable: bool,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub is_own: Option<bool>,
}

impl PropertyDescriptor {
	/// Accessor property whose getter exists and that has no plain value.
	pub fn is_getter_only(&self) -> bool {
		self.value.is_none()
			&& self
				.get
				.as_ref()
				.is_some_and(|get| get.kind != "undefined")
	}
}

/// Engine-internal slot such as `[[PromiseState]]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InternalPropertyDescriptor {
	pub name: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub value: Option<RemoteObject>,
}

/// Result of `Runtime.getProperties`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetPropertiesResult {
	#[serde(default)]
	pub result: Vec<PropertyDescriptor>,
	#[serde(default)]
	pub internal_properties: Vec<InternalPropertyDescriptor>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub exception_details: Option<ExceptionDetails>,
}

/// Result of `Runtime.evaluate`, `Runtime.callFunctionOn` and
/// `Debugger.evaluateOnCallFrame`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResult {
	pub result: RemoteObject,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub exception_details: Option<ExceptionDetails>,
	/// Present on targets that still report `wasThrown`.
	#[serde(default)]
	pub was_thrown: bool,
}

impl EvaluateResult {
	pub fn threw(&self) -> bool {
		self.was_thrown || self.exception_details.is_some()
	}
}

/// Details of an exception thrown in the target.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionDetails {
	#[serde(default)]
	pub exception_id: i64,
	#[serde(default)]
	pub text: String,
	#[serde(default)]
	pub line_number: u32,
	#[serde(default)]
	pub column_number: u32,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub url: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub script_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub exception: Option<RemoteObject>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stack_trace: Option<StackTrace>,
}

impl ExceptionDetails {
	/// Message shown for the exception: the thrown value's description
	/// when available, else the summary text.
	pub fn message(&self) -> String {
		self.exception
			.as_ref()
			.and_then(|e| e.description.clone())
			.unwrap_or_else(|| self.text.clone())
	}
}

/// Async-agnostic stack as attached to console calls and exceptions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTrace {
	#[serde(default)]
	pub call_frames: Vec<RuntimeCallFrame>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeCallFrame {
	#[serde(default)]
	pub function_name: String,
	#[serde(default)]
	pub script_id: String,
	#[serde(default)]
	pub url: String,
	#[serde(default)]
	pub line_number: u32,
	#[serde(default)]
	pub column_number: u32,
}

/// `Runtime.consoleAPICalled` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleApiCalled {
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(default)]
	pub args: Vec<RemoteObject>,
	#[serde(default)]
	pub execution_context_id: i64,
	#[serde(default)]
	pub timestamp: f64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub stack_trace: Option<StackTrace>,
}

/// `Runtime.exceptionThrown` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionThrown {
	#[serde(default)]
	pub timestamp: f64,
	pub exception_details: ExceptionDetails,
}
