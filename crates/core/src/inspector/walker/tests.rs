use bridge_runtime::testing::{MockReply, MockTarget};
use tokio::sync::mpsc::UnboundedReceiver;

use super::*;
use crate::test_support::{count_events, drain, next_event, sync, tab_fixture};

fn document() -> Value {
	json!({
		"nodeId": 1, "nodeType": 9, "nodeName": "#document", "childNodeCount": 1,
		"documentURL": "http://example.com/", "baseURL": "http://example.com/",
		"children": [{
			"nodeId": 2, "nodeType": 1, "nodeName": "HTML", "childNodeCount": 2,
			"children": [
				{"nodeId": 3, "nodeType": 1, "nodeName": "HEAD", "childNodeCount": 0},
				{"nodeId": 4, "nodeType": 1, "nodeName": "BODY", "childNodeCount": 2, "attributes": ["class", "main"]},
			]
		}]
	})
}

fn body_children() -> Value {
	json!({"parentId": 4, "nodes": [
		{"nodeId": 5, "nodeType": 1, "nodeName": "DIV", "childNodeCount": 1,
			"children": [{"nodeId": 6, "nodeType": 1, "nodeName": "SPAN", "childNodeCount": 0}]},
		{"nodeId": 7, "nodeType": 3, "nodeName": "#text", "nodeValue": "hello"},
	]})
}

fn dom_target() -> MockTarget {
	let target = MockTarget::new();
	let events = target.clone();
	target.set_responder(move |method, params| match method {
		"DOM.getDocument" => json!({ "root": document() }).into(),
		"DOM.requestChildNodes" if params["nodeId"] == 4 => {
			events.emit("DOM.setChildNodes", body_children());
			MockReply::ok()
		}
		"DOM.querySelector" => {
			events.emit("DOM.setChildNodes", body_children());
			json!({ "nodeId": 6 }).into()
		}
		"DOM.pushNodesByBackendIdsToFrontend" => {
			events.emit("DOM.setChildNodes", body_children());
			json!({ "nodeIds": [6] }).into()
		}
		_ => MockReply::ok(),
	});
	target
}

struct Fixture {
	conn: Arc<Connection>,
	tab: Arc<TabContext>,
	walker: Arc<WalkerActor>,
	outbound: UnboundedReceiver<Value>,
}

impl Fixture {
	async fn new(target: &MockTarget) -> Self {
		let (conn, tab) = tab_fixture(target);
		let outbound = conn.take_outbound().unwrap();
		let walker = WalkerActor::create(conn.alloc_id("walker"), Arc::clone(&tab)).await.unwrap();
		conn.manage("conn0.inspector", walker.clone());
		Self {
			conn,
			tab,
			walker,
			outbound,
		}
	}

	async fn request(&self, mut packet: Value) -> Value {
		packet["to"] = json!(self.walker.actor_id());
		self.conn.dispatch(packet).await
	}

	async fn html(&self) -> String {
		let reply = self.request(json!({"type": "documentElement"})).await;
		reply["node"]["actor"].as_str().unwrap().to_string()
	}
}

fn names(forms: &Value) -> Vec<String> {
	forms
		.as_array()
		.unwrap()
		.iter()
		.map(|form| form["nodeName"].as_str().unwrap().to_string())
		.collect()
}

#[tokio::test]
async fn test_root_form_is_document() {
	let target = dom_target();
	let fixture = Fixture::new(&target).await;
	let form = fixture.walker.form();

	assert_eq!(form["actor"], fixture.walker.actor_id());
	assert_eq!(form["root"]["nodeName"], "#document");
	assert_eq!(form["root"]["nodeType"], 9);
	assert_eq!(form["root"]["baseURI"], "http://example.com/");
	assert_eq!(form["root"]["numChildren"], 1);
	assert_eq!(target.methods(), ["DOM.enable", "DOM.getDocument"]);
}

#[tokio::test]
async fn test_document_element_links_parent() {
	let target = dom_target();
	let fixture = Fixture::new(&target).await;
	let root = fixture.walker.form()["root"]["actor"].clone();

	let reply = fixture.request(json!({"type": "documentElement"})).await;
	assert_eq!(reply["node"]["nodeName"], "HTML");
	assert_eq!(reply["node"]["isDocumentElement"], true);
	assert_eq!(reply["node"]["parent"], root);
}

#[tokio::test]
async fn test_children_fetches_and_windows() {
	let target = dom_target();
	let fixture = Fixture::new(&target).await;
	let html = fixture.html().await;

	let reply = fixture.request(json!({"type": "children", "node": html, "maxNodes": 1})).await;
	assert_eq!(names(&reply["nodes"]), ["HEAD"]);
	assert_eq!(reply["hasFirst"], true);
	assert_eq!(reply["hasLast"], false);

	let reply = fixture.request(json!({"type": "children", "node": html})).await;
	assert_eq!(names(&reply["nodes"]), ["HEAD", "BODY"]);
	assert_eq!(reply["nodes"][1]["attrs"], json!([{"name": "class", "value": "main"}]));
	let body = reply["nodes"][1]["actor"].clone();

	let reply = fixture.request(json!({"type": "children", "node": body})).await;
	assert_eq!(names(&reply["nodes"]), ["DIV", "#text"]);
	assert_eq!(reply["nodes"][1]["nodeValue"], "hello");
	assert_eq!(reply["hasFirst"], true);
	assert_eq!(reply["hasLast"], true);
	assert_eq!(target.last_params("DOM.requestChildNodes"), Some(json!({"nodeId": 4, "depth": 1})));
}

#[tokio::test]
async fn test_query_selector_sends_missing_parents_once() {
	let target = dom_target();
	let fixture = Fixture::new(&target).await;
	let root = fixture.walker.form()["root"]["actor"].clone();

	let reply = fixture
		.request(json!({"type": "querySelector", "node": root, "selector": "span"}))
		.await;
	assert_eq!(reply["node"]["nodeName"], "SPAN");
	assert_eq!(names(&reply["newParents"]), ["HTML", "BODY", "DIV"]);

	let reply = fixture
		.request(json!({"type": "querySelector", "node": root, "selector": "span"}))
		.await;
	assert_eq!(names(&reply["newParents"]), Vec::<String>::new());
}

#[tokio::test]
async fn test_query_selector_no_match() {
	let target = MockTarget::with_responder(|method, _| match method {
		"DOM.getDocument" => json!({ "root": document() }).into(),
		"DOM.querySelector" => json!({ "nodeId": 0 }).into(),
		_ => MockReply::ok(),
	});
	let fixture = Fixture::new(&target).await;
	let root = fixture.walker.form()["root"]["actor"].clone();

	let reply = fixture
		.request(json!({"type": "querySelector", "node": root, "selector": "nav"}))
		.await;
	assert!(reply.get("node").is_none());
}

#[tokio::test]
async fn test_mutations_batch_into_one_notification() {
	let target = dom_target();
	let mut fixture = Fixture::new(&target).await;
	let html = fixture.html().await;

	target.emit("DOM.attributeModified", json!({"nodeId": 2, "name": "lang", "value": "en"}));
	target.emit("DOM.attributeRemoved", json!({"nodeId": 2, "name": "dir"}));
	sync(&fixture.tab.rpc).await;
	assert_eq!(count_events(&drain(&mut fixture.outbound), "newMutations"), 1);

	let reply = fixture.request(json!({"type": "getMutations"})).await;
	assert_eq!(
		reply["mutations"],
		json!([
			{"type": "attributes", "target": html, "attributeName": "lang", "newValue": "en"},
			{"type": "attributes", "target": html, "attributeName": "dir"},
		])
	);
	let reply = fixture.request(json!({"type": "getMutations"})).await;
	assert_eq!(reply["mutations"], json!([]));

	target.emit("DOM.attributeModified", json!({"nodeId": 2, "name": "lang", "value": "fr"}));
	next_event(&mut fixture.outbound, "newMutations").await;
}

#[tokio::test]
async fn test_unsent_node_mutations_are_dropped() {
	let target = dom_target();
	let mut fixture = Fixture::new(&target).await;
	fixture.html().await;

	// BODY is known but has never been sent.
	target.emit("DOM.attributeModified", json!({"nodeId": 4, "name": "class", "value": "wide"}));
	target.emit("DOM.characterDataModified", json!({"nodeId": 4, "characterData": "x"}));
	sync(&fixture.tab.rpc).await;

	assert_eq!(count_events(&drain(&mut fixture.outbound), "newMutations"), 0);
	let reply = fixture.request(json!({"type": "getMutations"})).await;
	assert_eq!(reply["mutations"], json!([]));
}

#[tokio::test]
async fn test_child_list_mutations() {
	let target = dom_target();
	let fixture = Fixture::new(&target).await;
	let html = fixture.html().await;
	let reply = fixture.request(json!({"type": "children", "node": html})).await;
	let head = reply["nodes"][0]["actor"].as_str().unwrap().to_string();

	target.emit(
		"DOM.childNodeInserted",
		json!({"parentNodeId": 2, "previousNodeId": 4, "node": {"nodeId": 9, "nodeType": 1, "nodeName": "FOOTER"}}),
	);
	target.emit("DOM.childNodeRemoved", json!({"parentNodeId": 2, "nodeId": 3}));
	sync(&fixture.tab.rpc).await;

	assert!(!fixture.conn.has_actor(&head));
	let reply = fixture.request(json!({"type": "getMutations"})).await;
	let mutations = reply["mutations"].as_array().unwrap();
	assert_eq!(mutations.len(), 2);
	assert_eq!(mutations[0]["type"], "childList");
	assert_eq!(mutations[0]["added"][0]["nodeName"], "FOOTER");
	assert_eq!(mutations[0]["numChildren"], 3);
	assert_eq!(mutations[1]["removed"], json!([head]));
	assert_eq!(mutations[1]["numChildren"], 2);

	let reply = fixture.request(json!({"type": "children", "node": html})).await;
	assert_eq!(names(&reply["nodes"]), ["BODY", "FOOTER"]);
}

#[tokio::test]
async fn test_parents_nearest_first() {
	let target = dom_target();
	let fixture = Fixture::new(&target).await;
	let root = fixture.walker.form()["root"]["actor"].clone();
	let reply = fixture
		.request(json!({"type": "querySelector", "node": root, "selector": "span"}))
		.await;
	let span = reply["node"]["actor"].clone();

	let reply = fixture.request(json!({"type": "parents", "node": span})).await;
	assert_eq!(names(&reply["nodes"]), ["DIV", "BODY", "HTML", "#document"]);
}

#[tokio::test]
async fn test_pick_resolves_inspected_node() {
	let target = dom_target();
	let mut fixture = Fixture::new(&target).await;
	fixture.walker.form();

	fixture.request(json!({"type": "pick"})).await;
	assert_eq!(target.last_params("Overlay.setInspectMode").unwrap()["mode"], "searchForNode");

	target.emit("Overlay.inspectNodeRequested", json!({"backendNodeId": 60}));
	let event = next_event(&mut fixture.outbound, "pickerNodePicked").await;
	assert_eq!(event["from"], fixture.walker.actor_id());
	assert_eq!(event["node"]["nodeName"], "SPAN");
	assert_eq!(names(&event["newParents"]), ["HTML", "BODY", "DIV"]);
	assert_eq!(
		target.last_params("DOM.pushNodesByBackendIdsToFrontend"),
		Some(json!({"backendNodeIds": [60]}))
	);

	fixture.request(json!({"type": "cancelPick"})).await;
	assert_eq!(target.last_params("Overlay.setInspectMode").unwrap()["mode"], "none");
}

#[tokio::test]
async fn test_release_node_unmanages_subtree() {
	let target = dom_target();
	let fixture = Fixture::new(&target).await;
	let html = fixture.html().await;
	let reply = fixture.request(json!({"type": "children", "node": html})).await;
	let head = reply["nodes"][0]["actor"].as_str().unwrap().to_string();

	fixture.request(json!({"type": "releaseNode", "node": html})).await;
	assert!(!fixture.conn.has_actor(&html));
	assert!(!fixture.conn.has_actor(&head));
}

#[tokio::test]
async fn test_children_after_release_keeps_known_list() {
	let target = dom_target();
	let fixture = Fixture::new(&target).await;
	let html = fixture.html().await;
	let reply = fixture.request(json!({"type": "children", "node": html})).await;
	let body = reply["nodes"][1]["actor"].clone();
	let reply = fixture.request(json!({"type": "children", "node": body})).await;
	let div = reply["nodes"][0]["actor"].as_str().unwrap().to_string();

	let reply = fixture.request(json!({"type": "releaseNode", "node": div})).await;
	assert!(reply.get("error").is_none());
	assert!(!fixture.conn.has_actor(&div));

	let reply = fixture.request(json!({"type": "children", "node": body})).await;
	assert_eq!(names(&reply["nodes"]), ["DIV", "#text"]);
	let reissued = reply["nodes"][0]["actor"].as_str().unwrap();
	assert_ne!(reissued, div);
	assert!(fixture.conn.has_actor(reissued));
	let child_requests = target
		.requests()
		.into_iter()
		.filter(|(method, _)| method == "DOM.requestChildNodes")
		.count();
	assert_eq!(child_requests, 1);
}

#[tokio::test]
async fn test_children_with_start_and_unbounded_max_nodes() {
	let target = dom_target();
	let fixture = Fixture::new(&target).await;
	let html = fixture.html().await;
	let reply = fixture.request(json!({"type": "children", "node": html})).await;
	let body = reply["nodes"][1]["actor"].clone();

	let reply = fixture
		.request(json!({"type": "children", "node": html, "start": body, "maxNodes": u64::MAX}))
		.await;
	assert_eq!(names(&reply["nodes"]), ["BODY"]);
	assert_eq!(reply["hasFirst"], false);
	assert_eq!(reply["hasLast"], true);

	let reply = fixture.request(json!({"type": "parents", "node": body})).await;
	assert_eq!(names(&reply["nodes"]), ["HTML", "#document"]);
}

#[tokio::test]
async fn test_failed_child_request_drops_waiter() {
	let target = dom_target();
	target.set_responder(|method, _| match method {
		"DOM.getDocument" => json!({ "root": document() }).into(),
		"DOM.requestChildNodes" => MockReply::Error {
			code: -32000,
			message: "Could not find node".into(),
		},
		_ => MockReply::ok(),
	});
	let fixture = Fixture::new(&target).await;
	let html = fixture.html().await;
	let reply = fixture.request(json!({"type": "children", "node": html})).await;
	let body = reply["nodes"][1]["actor"].clone();

	let reply = fixture.request(json!({"type": "children", "node": body})).await;
	assert!(reply.get("error").is_some());
	assert!(fixture.walker.shared.waiters.lock().is_empty());
}

#[tokio::test]
async fn test_node_actor_value_and_attributes() {
	let target = dom_target();
	let fixture = Fixture::new(&target).await;
	let html = fixture.html().await;
	let reply = fixture.request(json!({"type": "children", "node": html})).await;
	let body = reply["nodes"][1]["actor"].clone();
	let reply = fixture.request(json!({"type": "children", "node": body})).await;
	let text = reply["nodes"][1]["actor"].as_str().unwrap().to_string();
	let body = body.as_str().unwrap().to_string();

	let reply = fixture.conn.dispatch(json!({"to": text, "type": "getNodeValue"})).await;
	assert_eq!(reply["value"], "hello");

	let reply = fixture
		.conn
		.dispatch(json!({"to": body, "type": "modifyAttributes", "modifications": [
			{"attributeName": "id", "newValue": "page"},
			{"attributeName": "class"},
		]}))
		.await;
	assert!(reply.get("error").is_none());
	assert_eq!(
		target.last_params("DOM.setAttributeValue"),
		Some(json!({"nodeId": 4, "name": "id", "value": "page"}))
	);
	assert_eq!(target.last_params("DOM.removeAttribute"), Some(json!({"nodeId": 4, "name": "class"})));

	let node = fixture.conn.get_typed::<NodeActor>(&body).unwrap();
	assert_eq!(node.node_id(), 4);
	assert_eq!(node.ancestors().len(), 2);
}
