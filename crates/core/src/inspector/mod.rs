//! DOM inspection: the inspector entry point, the walker and the highlighter.

pub mod tree;
pub mod walker;

use std::sync::Arc;

use async_trait::async_trait;
use bridge_protocol::Packet;
use bridge_runtime::{Actor, ActorSpec, Connection, Error, Result, parse_request};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};

pub use walker::{NodeActor, WalkerActor};

use crate::context::TabContext;
use crate::styles::PageStyleActor;

pub static INSPECTOR_SPEC: ActorSpec = ActorSpec {
	type_name: "inspector",
	requests: &["getWalker", "getPageStyle", "getHighlighter"],
	events: &[],
};

pub static HIGHLIGHTER_SPEC: ActorSpec = ActorSpec {
	type_name: "highlighter",
	requests: &["showBoxModel", "hideBoxModel"],
	events: &[],
};

/// Overlay colours used for box-model highlighting and node picking.
pub(crate) fn highlight_config() -> Value {
	json!({
		"showInfo": true,
		"contentColor": { "r": 111, "g": 168, "b": 220, "a": 0.66 },
		"paddingColor": { "r": 147, "g": 196, "b": 125, "a": 0.55 },
		"borderColor": { "r": 255, "g": 229, "b": 153, "a": 0.66 },
		"marginColor": { "r": 246, "g": 178, "b": 107, "a": 0.66 },
	})
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum InspectorRequest {
	GetWalker,
	GetPageStyle,
	GetHighlighter,
}

/// Hands out the tab's walker, page-style and highlighter actors, creating
/// each at most once per attachment.
pub struct InspectorActor {
	id: String,
	tab: Arc<TabContext>,
	walker: Mutex<Option<Arc<WalkerActor>>>,
	page_style: Mutex<Option<String>>,
	highlighter: Mutex<Option<String>>,
}

impl std::fmt::Debug for InspectorActor {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("InspectorActor").field("id", &self.id).finish()
	}
}

impl InspectorActor {
	pub fn new(id: String, tab: Arc<TabContext>) -> Self {
		Self {
			id,
			tab,
			walker: Mutex::new(None),
			page_style: Mutex::new(None),
			highlighter: Mutex::new(None),
		}
	}

	async fn walker(&self, conn: &Arc<Connection>) -> Result<Arc<WalkerActor>> {
		let existing = self.walker.lock().clone();
		if let Some(walker) = existing.filter(|w| conn.has_actor(w.actor_id())) {
			return Ok(walker);
		}
		let walker = WalkerActor::create(conn.alloc_id("walker"), Arc::clone(&self.tab)).await?;
		conn.manage(&self.id, walker.clone());
		*self.walker.lock() = Some(Arc::clone(&walker));
		Ok(walker)
	}

	fn child(
		&self,
		conn: &Arc<Connection>,
		slot: &Mutex<Option<String>>,
		make: impl FnOnce(String) -> Arc<dyn Actor>,
		prefix: &str,
	) -> String {
		let mut slot = slot.lock();
		if let Some(id) = slot.as_ref().filter(|id| conn.has_actor(id)) {
			return id.clone();
		}
		let id = conn.alloc_id(prefix);
		conn.manage(&self.id, make(id.clone()));
		*slot = Some(id.clone());
		id
	}
}

#[async_trait]
impl Actor for InspectorActor {
	fn actor_id(&self) -> &str {
		&self.id
	}

	fn spec(&self) -> &'static ActorSpec {
		&INSPECTOR_SPEC
	}

	async fn handle(&self, conn: &Arc<Connection>, packet: Packet) -> Result<Value> {
		match parse_request::<InspectorRequest>(&packet)? {
			InspectorRequest::GetWalker => {
				let walker = self.walker(conn).await?;
				Ok(json!({ "walker": walker.form() }))
			}
			InspectorRequest::GetPageStyle => {
				let tab = Arc::clone(&self.tab);
				let id = self.child(
					conn,
					&self.page_style,
					move |id| Arc::new(PageStyleActor::new(id, tab)),
					"pagestyle",
				);
				Ok(json!({ "pageStyle": { "actor": id } }))
			}
			InspectorRequest::GetHighlighter => {
				let tab = Arc::clone(&self.tab);
				let id = self.child(
					conn,
					&self.highlighter,
					move |id| Arc::new(HighlighterActor::new(id, tab)),
					"highlighter",
				);
				Ok(json!({ "highlighter": { "actor": id } }))
			}
		}
	}
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum HighlighterRequest {
	ShowBoxModel { node: String },
	HideBoxModel,
}

#[derive(Debug)]
pub struct HighlighterActor {
	id: String,
	tab: Arc<TabContext>,
}

impl HighlighterActor {
	pub fn new(id: String, tab: Arc<TabContext>) -> Self {
		Self { id, tab }
	}
}

#[async_trait]
impl Actor for HighlighterActor {
	fn actor_id(&self) -> &str {
		&self.id
	}

	fn spec(&self) -> &'static ActorSpec {
		&HIGHLIGHTER_SPEC
	}

	async fn handle(&self, conn: &Arc<Connection>, packet: Packet) -> Result<Value> {
		match parse_request::<HighlighterRequest>(&packet)? {
			HighlighterRequest::ShowBoxModel { node } => {
				let node = conn
					.get_typed::<NodeActor>(&node)
					.ok_or_else(|| Error::NoSuchActor(node.clone()))?;
				self.tab.rpc.request("Overlay.enable", json!({})).await?;
				self.tab
					.rpc
					.request(
						"Overlay.highlightNode",
						json!({ "nodeId": node.node_id(), "highlightConfig": highlight_config() }),
					)
					.await?;
				Ok(json!({ "value": true }))
			}
			HighlighterRequest::HideBoxModel => {
				self.tab.rpc.request("Overlay.hideHighlight", json!({})).await?;
				Ok(json!({}))
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use bridge_runtime::testing::{MockReply, MockTarget};

	use super::*;
	use crate::test_support::tab_fixture;

	fn target() -> MockTarget {
		MockTarget::with_responder(|method, _| match method {
			"DOM.getDocument" => json!({"root": {
				"nodeId": 1, "nodeType": 9, "nodeName": "#document", "childNodeCount": 1,
				"children": [{"nodeId": 2, "nodeType": 1, "nodeName": "HTML", "childNodeCount": 0}]
			}})
			.into(),
			_ => MockReply::ok(),
		})
	}

	#[tokio::test]
	async fn test_get_walker_is_idempotent() {
		let target = target();
		let (conn, tab) = tab_fixture(&target);
		conn.manage("conn0.tab0", Arc::new(InspectorActor::new("conn0.inspector1".into(), tab)));

		let first = conn.dispatch(json!({"to": "conn0.inspector1", "type": "getWalker"})).await;
		let second = conn.dispatch(json!({"to": "conn0.inspector1", "type": "getWalker"})).await;
		assert_eq!(first["walker"]["actor"], second["walker"]["actor"]);
		assert_eq!(first["walker"]["root"]["nodeName"], "#document");
		assert_eq!(target.methods().iter().filter(|m| *m == "DOM.getDocument").count(), 1);
		let walker = first["walker"]["actor"].as_str().unwrap();
		assert_eq!(conn.pool_of("conn0.inspector1")[0], walker);
	}

	#[tokio::test]
	async fn test_page_style_and_highlighter_handles() {
		let target = target();
		let (conn, tab) = tab_fixture(&target);
		conn.manage("conn0.tab0", Arc::new(InspectorActor::new("conn0.inspector1".into(), tab)));

		let style = conn.dispatch(json!({"to": "conn0.inspector1", "type": "getPageStyle"})).await;
		let again = conn.dispatch(json!({"to": "conn0.inspector1", "type": "getPageStyle"})).await;
		assert_eq!(style["pageStyle"]["actor"], again["pageStyle"]["actor"]);

		let reply = conn.dispatch(json!({"to": "conn0.inspector1", "type": "getHighlighter"})).await;
		let highlighter = reply["highlighter"]["actor"].as_str().unwrap().to_string();
		assert!(conn.has_actor(&highlighter));
	}

	#[tokio::test]
	async fn test_highlighter_drives_overlay() {
		let target = target();
		let (conn, tab) = tab_fixture(&target);
		conn.manage("conn0.tab0", Arc::new(InspectorActor::new("conn0.inspector1".into(), tab)));
		let walker = conn.dispatch(json!({"to": "conn0.inspector1", "type": "getWalker"})).await;
		let walker = walker["walker"]["actor"].as_str().unwrap().to_string();
		let html = conn.dispatch(json!({"to": walker, "type": "documentElement"})).await;
		let html = html["node"]["actor"].clone();
		let reply = conn.dispatch(json!({"to": "conn0.inspector1", "type": "getHighlighter"})).await;
		let highlighter = reply["highlighter"]["actor"].as_str().unwrap().to_string();

		let reply = conn
			.dispatch(json!({"to": highlighter, "type": "showBoxModel", "node": html}))
			.await;
		assert_eq!(reply["value"], true);
		assert_eq!(target.last_params("Overlay.highlightNode").unwrap()["nodeId"], 2);

		conn.dispatch(json!({"to": highlighter, "type": "hideBoxModel"})).await;
		assert!(target.methods().contains(&"Overlay.hideHighlight".to_string()));

		let reply = conn
			.dispatch(json!({"to": highlighter, "type": "showBoxModel", "node": "conn0.node999"}))
			.await;
		assert_eq!(reply["error"], "noSuchActor");
	}
}
