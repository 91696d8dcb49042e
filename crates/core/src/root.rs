//! The root actor: greeting, tab listing and the protocol description.

use std::sync::Arc;

use async_trait::async_trait;
use bridge_protocol::Packet;
use bridge_protocol::target::TargetDescriptor;
use bridge_runtime::{Actor, ActorSpec, Connection, Dialer, ROOT_ID, Result, RpcClient, WebSocketDialer, parse_request};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use crate::console::CONSOLE_SPEC;
use crate::grips::long_string::LONG_STRING_SPEC;
use crate::grips::object::OBJECT_SPEC;
use crate::inspector::walker::{NODE_SPEC, WALKER_SPEC};
use crate::inspector::{HIGHLIGHTER_SPEC, INSPECTOR_SPEC};
use crate::options::BridgeOptions;
use crate::styles::page_style::PAGE_STYLE_SPEC;
use crate::styles::rule::RULE_SPEC;
use crate::styles::sheets::{STYLESHEET_SPEC, STYLESHEETS_SPEC};
use crate::tab::{TAB_SPEC, TabActor};
use crate::thread::frame::FRAME_SPEC;
use crate::thread::source::{BREAKPOINT_SPEC, SOURCE_SPEC};
use crate::thread::{PAUSE_SPEC, THREAD_SPEC};

pub static ROOT_SPEC: ActorSpec = ActorSpec {
	type_name: "root",
	requests: &["listTabs", "echo", "protocolDescription"],
	events: &[],
};

/// Every actor type the bridge can hand out.
static ACTOR_SPECS: &[&ActorSpec] = &[
	&ROOT_SPEC,
	&TAB_SPEC,
	&CONSOLE_SPEC,
	&INSPECTOR_SPEC,
	&HIGHLIGHTER_SPEC,
	&WALKER_SPEC,
	&NODE_SPEC,
	&PAGE_STYLE_SPEC,
	&RULE_SPEC,
	&STYLESHEETS_SPEC,
	&STYLESHEET_SPEC,
	&THREAD_SPEC,
	&PAUSE_SPEC,
	&FRAME_SPEC,
	&SOURCE_SPEC,
	&BREAKPOINT_SPEC,
	&OBJECT_SPEC,
	&LONG_STRING_SPEC,
];

/// Where the root actor finds debuggable targets.
#[async_trait]
pub trait TabSource: Send + Sync {
	async fn list(&self) -> Result<Vec<TargetDescriptor>>;
}

/// A fixed target list.
#[derive(Debug, Clone, Default)]
pub struct StaticTabSource {
	targets: Vec<TargetDescriptor>,
}

impl StaticTabSource {
	pub fn new(targets: Vec<TargetDescriptor>) -> Self {
		Self { targets }
	}
}

#[async_trait]
impl TabSource for StaticTabSource {
	async fn list(&self) -> Result<Vec<TargetDescriptor>> {
		Ok(self.targets.clone())
	}
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum RootRequest {
	ListTabs,
	Echo,
	ProtocolDescription,
}

pub struct RootActor {
	source: Arc<dyn TabSource>,
	dialer: Arc<dyn Dialer>,
	options: BridgeOptions,
	/// Target id to tab actor, in listing order.
	tabs: Mutex<IndexMap<String, Arc<TabActor>>>,
}

impl std::fmt::Debug for RootActor {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RootActor")
			.field("tabs", &self.tabs.lock().len())
			.field("options", &self.options)
			.finish_non_exhaustive()
	}
}

impl RootActor {
	pub fn new(source: Arc<dyn TabSource>, options: BridgeOptions) -> Self {
		Self::with_dialer(source, Arc::new(WebSocketDialer), options)
	}

	/// Root whose tabs open their target sockets through `dialer`.
	pub fn with_dialer(source: Arc<dyn TabSource>, dialer: Arc<dyn Dialer>, options: BridgeOptions) -> Self {
		Self {
			source,
			dialer,
			options,
			tabs: Mutex::new(IndexMap::new()),
		}
	}

	/// First packet sent on a new front-end connection.
	pub fn greeting() -> Value {
		json!({
			"from": ROOT_ID,
			"applicationType": "browser",
			"traits": {
				"sources": true,
				"highlightable": true,
				"customHighlighters": false,
				"networkMonitor": false,
				"bulk": false,
			},
		})
	}

	async fn list_tabs(&self, conn: &Arc<Connection>) -> Result<Value> {
		let listing = self.source.list().await?;
		let mut tabs = self.tabs.lock();
		let mut next = IndexMap::with_capacity(listing.len());
		for descriptor in listing {
			if let Some(tab) = tabs.shift_remove(&descriptor.id) {
				tab.update_descriptor(descriptor.clone());
				next.insert(descriptor.id, tab);
				continue;
			}
			// Targets another client holds have no socket URL.
			let Some(socket) = descriptor.web_socket_debugger_url.clone() else {
				tracing::debug!(target_id = %descriptor.id, "skipping target without debugger socket");
				continue;
			};
			let rpc = RpcClient::with_dialer(socket, Arc::clone(&self.dialer), self.options.request_timeout);
			let tab = TabActor::new(conn.alloc_id("tab"), descriptor.clone(), rpc, self.options.clone(), conn);
			conn.manage(ROOT_ID, Arc::clone(&tab) as Arc<dyn Actor>);
			next.insert(descriptor.id, tab);
		}
		for (_, gone) in tabs.drain(..) {
			tracing::debug!(tab = gone.actor_id(), "target vanished");
			conn.unmanage(gone.actor_id());
		}
		*tabs = next;

		let forms: Vec<Value> = tabs.values().map(|tab| tab.form()).collect();
		Ok(json!({ "tabs": forms, "selected": 0 }))
	}
}

/// `{types: {<type>: {category, typeName, methods, events}}}` for every actor type.
pub fn protocol_description() -> Value {
	let types: Map<String, Value> = ACTOR_SPECS
		.iter()
		.map(|spec| {
			let methods: Vec<Value> = spec.requests.iter().map(|name| json!({ "name": name })).collect();
			let events: Map<String, Value> = spec.events.iter().map(|name| (name.to_string(), json!({}))).collect();
			(
				spec.type_name.to_string(),
				json!({
					"category": "actor",
					"typeName": spec.type_name,
					"methods": methods,
					"events": events,
				}),
			)
		})
		.collect();
	json!({ "types": types })
}

#[async_trait]
impl Actor for RootActor {
	fn actor_id(&self) -> &str {
		ROOT_ID
	}

	fn spec(&self) -> &'static ActorSpec {
		&ROOT_SPEC
	}

	async fn handle(&self, conn: &Arc<Connection>, packet: Packet) -> Result<Value> {
		match parse_request::<RootRequest>(&packet)? {
			RootRequest::ListTabs => self.list_tabs(conn).await,
			RootRequest::Echo => Ok(Value::Object(packet.body())),
			RootRequest::ProtocolDescription => Ok(protocol_description()),
		}
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::{AtomicUsize, Ordering};

	use bridge_runtime::testing::MockTarget;

	use super::*;
	use crate::test_support::disconnected;

	fn descriptor(id: &str, socket: bool) -> TargetDescriptor {
		let mut value = json!({"id": id, "title": id, "url": format!("https://example.com/{id}"), "type": "page"});
		if socket {
			value["webSocketDebuggerUrl"] = json!(format!("ws://127.0.0.1:9222/devtools/page/{id}"));
		}
		serde_json::from_value(value).unwrap()
	}

	fn root_conn(source: impl TabSource + 'static) -> Arc<Connection> {
		let conn = Connection::new("conn0.");
		let root = RootActor::with_dialer(Arc::new(source), Arc::new(MockTarget::new()), BridgeOptions::default());
		conn.set_root(Arc::new(root));
		conn
	}

	/// Drops the first target after the first listing.
	struct Shrinking {
		calls: AtomicUsize,
	}

	#[async_trait]
	impl TabSource for Shrinking {
		async fn list(&self) -> Result<Vec<TargetDescriptor>> {
			let call = self.calls.fetch_add(1, Ordering::SeqCst);
			let mut targets = vec![descriptor("A", true), descriptor("B", call == 0)];
			if call > 0 {
				targets.remove(0);
			}
			Ok(targets)
		}
	}

	#[tokio::test]
	async fn test_list_tabs_skips_targets_without_socket() {
		let conn = root_conn(StaticTabSource::new(vec![descriptor("A", false), descriptor("B", true)]));

		let reply = conn.dispatch(json!({"to": "root", "type": "listTabs"})).await;
		let tabs = reply["tabs"].as_array().unwrap();
		assert_eq!(tabs.len(), 1);
		assert_eq!(tabs[0]["title"], "B");
		assert_eq!(reply["selected"], 0);
		assert!(tabs[0]["consoleActor"].as_str().unwrap().starts_with("conn0.console"));
	}

	#[tokio::test]
	async fn test_tab_actors_stable_across_listings() {
		let conn = root_conn(Shrinking {
			calls: AtomicUsize::new(0),
		});

		let first = conn.dispatch(json!({"to": "root", "type": "listTabs"})).await;
		assert_eq!(first["tabs"].as_array().unwrap().len(), 2);
		let a = first["tabs"][0]["actor"].as_str().unwrap().to_string();
		let b = first["tabs"][1]["actor"].as_str().unwrap().to_string();

		// B is still listed without a socket (we hold it); A is gone.
		let second = conn.dispatch(json!({"to": "root", "type": "listTabs"})).await;
		let tabs = second["tabs"].as_array().unwrap();
		assert_eq!(tabs.len(), 1);
		assert_eq!(tabs[0]["actor"], b.as_str());
		assert!(!conn.has_actor(&a));
		assert!(conn.has_actor(&b));
	}

	/// Lists `A` once, then nothing.
	struct Vanishing {
		calls: AtomicUsize,
	}

	#[async_trait]
	impl TabSource for Vanishing {
		async fn list(&self) -> Result<Vec<TargetDescriptor>> {
			let call = self.calls.fetch_add(1, Ordering::SeqCst);
			Ok(if call == 0 { vec![descriptor("A", true)] } else { Vec::new() })
		}
	}

	#[tokio::test]
	async fn test_vanished_tab_closes_target_socket() {
		let target = MockTarget::new();
		let conn = Connection::new("conn0.");
		let source = Vanishing {
			calls: AtomicUsize::new(0),
		};
		let root = RootActor::with_dialer(Arc::new(source), Arc::new(target.clone()), BridgeOptions::default());
		conn.set_root(Arc::new(root));

		let reply = conn.dispatch(json!({"to": "root", "type": "listTabs"})).await;
		let tab = reply["tabs"][0]["actor"].as_str().unwrap().to_string();
		let reply = conn
			.dispatch(json!({"to": tab, "type": "navigateTo", "url": "https://example.com/next"}))
			.await;
		assert!(reply.get("error").is_none());
		assert!(target.is_connected());

		let reply = conn.dispatch(json!({"to": "root", "type": "listTabs"})).await;
		assert_eq!(reply["tabs"], json!([]));
		assert!(!conn.has_actor(&tab));
		disconnected(&target).await;
	}

	#[tokio::test]
	async fn test_echo() {
		let conn = root_conn(StaticTabSource::default());
		let reply = conn
			.dispatch(json!({"to": "root", "type": "echo", "payload": [1, 2]}))
			.await;
		assert_eq!(reply, json!({"from": "root", "type": "echo", "payload": [1, 2]}));
	}

	#[tokio::test]
	async fn test_protocol_description_lists_actor_types() {
		let conn = root_conn(StaticTabSource::default());
		let reply = conn.dispatch(json!({"to": "root", "type": "protocolDescription"})).await;
		let thread = &reply["types"]["thread"];
		assert_eq!(thread["category"], "actor");
		assert!(thread["methods"].as_array().unwrap().contains(&json!({"name": "resume"})));
		assert_eq!(thread["events"]["paused"], json!({}));
		assert!(reply["types"]["domwalker"]["methods"].is_array());
		assert_eq!(reply["types"].as_object().unwrap().len(), ACTOR_SPECS.len());
	}

	#[test]
	fn test_greeting() {
		let greeting = RootActor::greeting();
		assert_eq!(greeting["from"], "root");
		assert_eq!(greeting["applicationType"], "browser");
	}
}
