//! Actor standing for one remote object.

use std::sync::Arc;

use async_trait::async_trait;
use bridge_protocol::Packet;
use bridge_protocol::target::{PropertyDescriptor, RemoteObject};
use bridge_runtime::{Actor, ActorSpec, Connection, Result, parse_request};
use futures_util::future::join_all;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::preview::{Handle, descriptor_form};
use super::{GripScope, own_properties, stringify};

pub static OBJECT_SPEC: ActorSpec = ActorSpec {
	type_name: "obj",
	requests: &[
		"prototypeAndProperties",
		"prototype",
		"property",
		"ownPropertyNames",
		"displayString",
		"release",
	],
	events: &[],
};

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ObjectRequest {
	PrototypeAndProperties,
	Prototype,
	Property { name: String },
	OwnPropertyNames,
	DisplayString,
	Release,
}

pub struct ObjectGripActor {
	id: String,
	scope: GripScope,
	object: RemoteObject,
}

impl std::fmt::Debug for ObjectGripActor {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ObjectGripActor")
			.field("id", &self.id)
			.field("class", &self.object.class())
			.finish()
	}
}

impl ObjectGripActor {
	pub fn new(id: String, scope: GripScope, object: RemoteObject) -> Self {
		Self { id, scope, object }
	}

	pub fn object(&self) -> &RemoteObject {
		&self.object
	}

	fn object_id(&self) -> &str {
		self.object.object_id.as_deref().unwrap_or_default()
	}

	/// Shallow grip, no round trips.
	pub fn base_form(&self) -> Value {
		let class = match self.object.class() {
			"" if self.object.kind == "function" => "Function",
			"" => "Object",
			class => class,
		};
		json!({
			"type": "object",
			"actor": self.id,
			"class": class,
			"extensible": true,
			"frozen": false,
			"sealed": false,
		})
	}

	/// Grip with its preview.
	pub async fn form(&self) -> Value {
		let max_items = self.scope.tab().options.preview_max_items;
		let handle = Handle::load(self.scope.rpc(), self.object.clone(), max_items).await;
		let mut form = match self.base_form() {
			Value::Object(map) => map,
			_ => Map::new(),
		};
		handle.generate(&self.scope, &mut form);
		Value::Object(form)
	}

	async fn properties(&self) -> Result<(Vec<PropertyDescriptor>, Option<RemoteObject>)> {
		let loaded = own_properties(self.scope.rpc(), self.object_id()).await?;
		let mut prototype = loaded
			.internal_properties
			.into_iter()
			.find(|p| p.name == "[[Prototype]]")
			.and_then(|p| p.value);
		let mut own = Vec::with_capacity(loaded.result.len());
		for property in loaded.result {
			if property.name == "__proto__" {
				prototype = prototype.or(property.value);
			} else {
				own.push(property);
			}
		}
		Ok((own, prototype))
	}

	async fn prototype_grip(&self, prototype: Option<&RemoteObject>) -> Value {
		match prototype {
			Some(prototype) => self.scope.grip_with_preview(prototype).await,
			None => json!({ "type": "null" }),
		}
	}

	async fn prototype_and_properties(&self) -> Result<Value> {
		let (own, prototype) = self.properties().await?;
		let forms = join_all(own.iter().map(|property| self.full_descriptor(property))).await;
		let own_properties: Map<String, Value> = own
			.iter()
			.map(|property| property.name.clone())
			.zip(forms)
			.collect();
		Ok(json!({
			"prototype": self.prototype_grip(prototype.as_ref()).await,
			"ownProperties": own_properties,
			"safeGetterValues": {},
		}))
	}

	/// Descriptor whose object values carry previews.
	async fn full_descriptor(&self, property: &PropertyDescriptor) -> Value {
		let mut form = descriptor_form(&self.scope, property);
		if let (Some(value), Value::Object(map)) = (&property.value, &mut form) {
			if value.object_id.is_some() {
				map.insert("value".into(), self.scope.grip_with_preview(value).await);
			}
		}
		form
	}
}

#[async_trait]
impl Actor for ObjectGripActor {
	fn actor_id(&self) -> &str {
		&self.id
	}

	fn spec(&self) -> &'static ActorSpec {
		&OBJECT_SPEC
	}

	async fn handle(&self, conn: &Arc<Connection>, packet: Packet) -> Result<Value> {
		match parse_request::<ObjectRequest>(&packet)? {
			ObjectRequest::PrototypeAndProperties => self.prototype_and_properties().await,
			ObjectRequest::Prototype => {
				let (_, prototype) = self.properties().await?;
				Ok(json!({ "prototype": self.prototype_grip(prototype.as_ref()).await }))
			}
			ObjectRequest::Property { name } => {
				let (own, _) = self.properties().await?;
				match own.iter().find(|property| property.name == name) {
					Some(property) => Ok(json!({ "descriptor": self.full_descriptor(property).await })),
					None => Ok(json!({})),
				}
			}
			ObjectRequest::OwnPropertyNames => {
				let (own, _) = self.properties().await?;
				let names: Vec<&str> = own.iter().map(|property| property.name.as_str()).collect();
				Ok(json!({ "ownPropertyNames": names }))
			}
			ObjectRequest::DisplayString => {
				let text = stringify::stringify(self.scope.rpc(), &self.object).await;
				Ok(json!({ "displayString": self.scope.string(&text) }))
			}
			ObjectRequest::Release => {
				conn.unmanage(&self.id);
				Ok(json!({}))
			}
		}
	}

	fn on_unmanaged(&self) {
		self.scope.tab().forget_grip(&self.id);
		let Ok(handle) = tokio::runtime::Handle::try_current() else {
			return;
		};
		let rpc = self.scope.rpc().clone();
		let object_id = self.object_id().to_string();
		handle.spawn(async move {
			if let Err(e) = rpc.request("Runtime.releaseObject", json!({ "objectId": object_id })).await {
				tracing::debug!(error = %e, object_id, "releaseObject failed");
			}
		});
	}
}
