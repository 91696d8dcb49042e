//! The DOM walker and its node actors.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bridge_protocol::Packet;
use bridge_protocol::target::{
	AttributeModified, AttributeRemoved, CharacterDataModified, ChildNodeInserted, ChildNodeRemoved, DomNode,
	SetChildNodes,
};
use bridge_runtime::{Actor, ActorSpec, Connection, Error, Result, Subscription, parse_request};
use parking_lot::Mutex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::oneshot;

use super::highlight_config;
use super::tree::{MutationQueue, NodeTree};
use crate::context::TabContext;
use crate::grips::GripScope;

const DEFAULT_MAX_NODES: usize = 100;

pub static WALKER_SPEC: ActorSpec = ActorSpec {
	type_name: "domwalker",
	requests: &[
		"document",
		"documentElement",
		"querySelector",
		"children",
		"getMutations",
		"parents",
		"pick",
		"cancelPick",
		"releaseNode",
	],
	events: &["newMutations", "pickerNodePicked"],
};

pub static NODE_SPEC: ActorSpec = ActorSpec {
	type_name: "domnode",
	requests: &["getNodeValue", "modifyAttributes"],
	events: &[],
};

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
enum WalkerRequest {
	Document,
	DocumentElement,
	QuerySelector {
		node: String,
		selector: String,
	},
	Children {
		node: String,
		max_nodes: Option<usize>,
		start: Option<String>,
	},
	GetMutations,
	Parents {
		node: String,
	},
	Pick,
	CancelPick,
	ReleaseNode {
		node: String,
	},
}

#[derive(Deserialize)]
struct GetDocumentResult {
	root: DomNode,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuerySelectorResult {
	node_id: i64,
}

#[derive(Deserialize)]
struct DescribeNodeResult {
	node: DomNode,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PushNodesResult {
	node_ids: Vec<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InspectNodeRequested {
	backend_node_id: i64,
}

/// Walker state shared with its node actors and target event handlers.
pub struct WalkerShared {
	walker_id: String,
	tab: Arc<TabContext>,
	tree: Mutex<NodeTree>,
	mutations: Mutex<MutationQueue>,
	document: Mutex<Option<i64>>,
	base_uri: Mutex<String>,
	waiters: Mutex<HashMap<i64, Vec<oneshot::Sender<()>>>>,
	subscriptions: Mutex<Vec<Subscription>>,
}

impl std::fmt::Debug for WalkerShared {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("WalkerShared")
			.field("walker_id", &self.walker_id)
			.field("nodes", &self.tree.lock().len())
			.finish()
	}
}

type Created = Vec<(String, i64)>;

impl WalkerShared {
	fn new(walker_id: String, tab: Arc<TabContext>) -> Arc<Self> {
		let shared = Arc::new(Self {
			walker_id,
			tab,
			tree: Mutex::new(NodeTree::new()),
			mutations: Mutex::new(MutationQueue::default()),
			document: Mutex::new(None),
			base_uri: Mutex::new(String::new()),
			waiters: Mutex::new(HashMap::new()),
			subscriptions: Mutex::new(Vec::new()),
		});
		shared.subscribe();
		shared
	}

	pub fn tab(&self) -> &Arc<TabContext> {
		&self.tab
	}

	fn subscribe(self: &Arc<Self>) {
		let subscriptions = vec![
			self.on_event("DOM.setChildNodes", |shared, e: SetChildNodes| shared.on_set_child_nodes(e)),
			self.on_event("DOM.attributeModified", |shared, e: AttributeModified| {
				shared.on_attribute(e.node_id, e.name, Some(e.value))
			}),
			self.on_event("DOM.attributeRemoved", |shared, e: AttributeRemoved| {
				shared.on_attribute(e.node_id, e.name, None)
			}),
			self.on_event("DOM.characterDataModified", |shared, e: CharacterDataModified| {
				shared.on_character_data(e)
			}),
			self.on_event("DOM.childNodeInserted", |shared, e: ChildNodeInserted| shared.on_child_inserted(e)),
			self.on_event("DOM.childNodeRemoved", |shared, e: ChildNodeRemoved| shared.on_child_removed(e)),
			self.on_event("DOM.documentUpdated", |shared, _: Value| shared.on_document_updated()),
			self.on_event("Overlay.inspectNodeRequested", |shared, e: InspectNodeRequested| {
				shared.on_inspect_requested(e.backend_node_id)
			}),
		];
		*self.subscriptions.lock() = subscriptions;
	}

	fn on_event<E, F>(self: &Arc<Self>, method: &'static str, handler: F) -> Subscription
	where
		E: DeserializeOwned,
		F: Fn(&Arc<Self>, E) + Send + Sync + 'static,
	{
		let weak: Weak<Self> = Arc::downgrade(self);
		self.tab.rpc.on(method, move |params| {
			let Some(shared) = weak.upgrade() else {
				return;
			};
			match serde_json::from_value::<E>(params.clone()) {
				Ok(event) => handler(&shared, event),
				Err(e) => tracing::debug!(method, error = %e, "ignoring malformed DOM event"),
			}
		})
	}

	/// Runs `f` on the tree and registers node actors for every node it
	/// references for the first time.
	fn with_tree<R>(
		self: &Arc<Self>,
		f: impl FnOnce(&mut NodeTree, &mut dyn FnMut() -> String, &mut Created) -> R,
	) -> Result<R> {
		let conn = self.tab.conn()?;
		let mut created = Vec::new();
		let result = {
			let mut tree = self.tree.lock();
			let mut alloc = || conn.alloc_id("node");
			f(&mut tree, &mut alloc, &mut created)
		};
		for (actor_id, node_id) in created {
			conn.manage(
				&self.walker_id,
				Arc::new(NodeActor {
					id: actor_id,
					node_id,
					shared: Arc::clone(self),
				}),
			);
		}
		Ok(result)
	}

	fn node_id(&self, actor_id: &str) -> Result<i64> {
		self.tree
			.lock()
			.node_for_actor(actor_id)
			.ok_or_else(|| Error::InvalidArgument(format!("unknown node {actor_id}")))
	}

	/// Node form; marks the node as sent.
	fn form(&self, node_id: i64) -> Option<Value> {
		let mut tree = self.tree.lock();
		let base_uri = self.base_uri.lock().clone();
		form_locked(&mut tree, node_id, &base_uri)
	}

	fn forms(&self, ids: &[i64]) -> Vec<Value> {
		let mut tree = self.tree.lock();
		let base_uri = self.base_uri.lock().clone();
		ids.iter().filter_map(|id| form_locked(&mut tree, *id, &base_uri)).collect()
	}

	fn unmanage_nodes(&self, actor_ids: Vec<String>) {
		if let Ok(conn) = self.tab.conn() {
			for id in actor_ids {
				conn.unmanage(&id);
			}
		}
	}

	fn push_mutation(&self, mutation: Value) {
		let notify = self.mutations.lock().push(mutation);
		if notify {
			self.tab.emit(&self.walker_id, "newMutations", json!({}));
		}
	}

	async fn ensure_document(self: &Arc<Self>) -> Result<i64> {
		if let Some(id) = *self.document.lock() {
			return Ok(id);
		}
		let reply: GetDocumentResult = self.tab.rpc.request_as("DOM.getDocument", json!({ "depth": 2 })).await?;
		let root = reply.root;
		*self.base_uri.lock() = root
			.base_url
			.clone()
			.or_else(|| root.document_url.clone())
			.unwrap_or_default();
		self.with_tree(|tree, alloc, created| tree.reference(&root, None, alloc, created))?;
		*self.document.lock() = Some(root.node_id);
		Ok(root.node_id)
	}

	/// Makes sure `node_id` is in the tree, describing it if it arrived
	/// without a path.
	async fn ensure_known(self: &Arc<Self>, node_id: i64) -> Result<()> {
		if self.tree.lock().get(node_id).is_some() {
			return Ok(());
		}
		let reply: DescribeNodeResult = self
			.tab
			.rpc
			.request_as("DOM.describeNode", json!({ "nodeId": node_id }))
			.await?;
		let mut node = reply.node;
		node.node_id = node_id;
		let parent = node.parent_id;
		self.with_tree(|tree, alloc, created| tree.reference(&node, parent, alloc, created))?;
		Ok(())
	}

	async fn ensure_children(self: &Arc<Self>, node_id: i64) -> Result<()> {
		let rx = {
			let mut tree = self.tree.lock();
			let Some(entry) = tree.get_mut(node_id) else {
				return Err(Error::InvalidArgument(format!("unknown node id {node_id}")));
			};
			if entry.children.is_some() {
				return Ok(());
			}
			if entry.num_children() == 0 {
				entry.children = Some(Vec::new());
				return Ok(());
			}
			let (tx, rx) = oneshot::channel();
			self.waiters.lock().entry(node_id).or_default().push(tx);
			rx
		};
		let requested = self
			.tab
			.rpc
			.request("DOM.requestChildNodes", json!({ "nodeId": node_id, "depth": 1 }))
			.await;
		let outcome = match requested {
			Ok(_) => match tokio::time::timeout(self.tab.options.request_timeout, rx).await {
				Ok(Ok(())) => Ok(()),
				Ok(Err(_)) => Err(Error::ChannelClosed),
				Err(_) => Err(Error::Timeout(format!("children of node {node_id}"))),
			},
			Err(e) => {
				drop(rx);
				Err(e)
			}
		};
		if outcome.is_err() {
			self.forget_waiters(node_id);
		}
		outcome
	}

	/// Drops waiters whose receiver has gone away.
	fn forget_waiters(&self, node_id: i64) {
		let mut waiters = self.waiters.lock();
		if let Some(pending) = waiters.get_mut(&node_id) {
			pending.retain(|tx| !tx.is_closed());
			if pending.is_empty() {
				waiters.remove(&node_id);
			}
		}
	}

	/// `{node, newParents}` for a node the front-end may not have a path to.
	fn node_with_parents(&self, node_id: i64) -> Value {
		let missing = self.tree.lock().ensure_path_to_root(node_id);
		let new_parents = self.forms(&missing);
		json!({ "node": self.form(node_id), "newParents": new_parents })
	}

	fn on_set_child_nodes(self: &Arc<Self>, event: SetChildNodes) {
		let parent = event.parent_id;
		let result = self.with_tree(|tree, alloc, created| {
			if tree.get(parent).is_some() {
				tree.set_children(parent, &event.nodes, alloc, created);
			}
		});
		if let Err(e) = result {
			tracing::debug!(error = %e, "setChildNodes after connection closed");
		}
		for waiter in self.waiters.lock().remove(&parent).unwrap_or_default() {
			let _ = waiter.send(());
		}
	}

	fn on_attribute(&self, node_id: i64, name: String, value: Option<String>) {
		let target = {
			let mut tree = self.tree.lock();
			let Some(entry) = tree.get_mut(node_id) else {
				return;
			};
			set_attribute(&mut entry.node, &name, value.as_deref());
			if !entry.sent {
				tracing::debug!(node_id, "dropping attribute mutation for unsent node");
				return;
			}
			entry.actor_id.clone()
		};
		let mut mutation = json!({ "type": "attributes", "target": target, "attributeName": name });
		if let Some(value) = value {
			mutation["newValue"] = Value::String(value);
		}
		self.push_mutation(mutation);
	}

	fn on_character_data(&self, event: CharacterDataModified) {
		let target = {
			let mut tree = self.tree.lock();
			let Some(entry) = tree.get_mut(event.node_id) else {
				return;
			};
			entry.node.node_value = event.character_data.clone();
			if !entry.sent {
				return;
			}
			entry.actor_id.clone()
		};
		self.push_mutation(json!({
			"type": "characterData",
			"target": target,
			"newValue": event.character_data,
		}));
	}

	fn on_child_inserted(self: &Arc<Self>, event: ChildNodeInserted) {
		let base_uri = self.base_uri.lock().clone();
		let inserted = self.with_tree(|tree, alloc, created| {
			tree.insert_child(event.parent_node_id, event.previous_node_id, &event.node, alloc, created)?;
			if !tree.is_sent(event.parent_node_id) {
				return None;
			}
			let target = tree.actor_for(event.parent_node_id)?.to_string();
			let added = form_locked(tree, event.node.node_id, &base_uri)?;
			let num_children = tree.get(event.parent_node_id).map(|entry| entry.num_children());
			Some((target, added, num_children))
		});
		if let Ok(Some((target, added, num_children))) = inserted {
			self.push_mutation(json!({
				"type": "childList",
				"target": target,
				"added": [added],
				"removed": [],
				"numChildren": num_children,
			}));
		}
	}

	fn on_child_removed(&self, event: ChildNodeRemoved) {
		let (mutation, removed) = {
			let mut tree = self.tree.lock();
			let Some(actor) = tree.actor_for(event.node_id).map(str::to_string) else {
				return;
			};
			let target = tree
				.is_sent(event.parent_node_id)
				.then(|| tree.actor_for(event.parent_node_id).map(str::to_string))
				.flatten();
			let removed = tree.remove(event.node_id);
			let num_children = tree.get(event.parent_node_id).map(|entry| entry.num_children());
			let mutation = target.map(|target| {
				json!({
					"type": "childList",
					"target": target,
					"added": [],
					"removed": [actor],
					"numChildren": num_children,
				})
			});
			(mutation, removed)
		};
		self.unmanage_nodes(removed);
		if let Some(mutation) = mutation {
			self.push_mutation(mutation);
		}
	}

	fn on_document_updated(&self) {
		let old = self.document.lock().take();
		let (target, removed) = {
			let mut tree = self.tree.lock();
			let target = old.filter(|id| tree.is_sent(*id)).and_then(|id| tree.actor_for(id).map(str::to_string));
			(target, tree.clear())
		};
		self.unmanage_nodes(removed);
		if let Some(target) = target {
			self.push_mutation(json!({ "type": "documentUnload", "target": target }));
		}
	}

	fn on_inspect_requested(self: &Arc<Self>, backend_node_id: i64) {
		let shared = Arc::clone(self);
		tokio::spawn(async move {
			let picked = async {
				let pushed: PushNodesResult = shared
					.tab
					.rpc
					.request_as(
						"DOM.pushNodesByBackendIdsToFrontend",
						json!({ "backendNodeIds": [backend_node_id] }),
					)
					.await?;
				let node_id = pushed
					.node_ids
					.into_iter()
					.find(|id| *id != 0)
					.ok_or_else(|| Error::InvalidArgument(format!("backend node {backend_node_id} not found")))?;
				shared.ensure_known(node_id).await?;
				Ok::<_, Error>(shared.node_with_parents(node_id))
			}
			.await;
			match picked {
				Ok(body) => shared.tab.emit(&shared.walker_id, "pickerNodePicked", body),
				Err(e) => tracing::debug!(error = %e, backend_node_id, "picked node could not be resolved"),
			}
			if let Err(e) = shared.set_inspect_mode(false).await {
				tracing::debug!(error = %e, "failed to leave inspect mode");
			}
		});
	}

	async fn set_inspect_mode(&self, on: bool) -> Result<()> {
		let params = if on {
			json!({ "mode": "searchForNode", "highlightConfig": highlight_config() })
		} else {
			json!({ "mode": "none", "highlightConfig": {} })
		};
		self.tab.rpc.request("Overlay.setInspectMode", params).await.map(|_| ())
	}
}

fn set_attribute(node: &mut DomNode, name: &str, value: Option<&str>) {
	let mut pairs = node.attribute_pairs();
	match (pairs.iter().position(|(n, _)| n == name), value) {
		(Some(index), Some(value)) => pairs[index].1 = value.to_string(),
		(Some(index), None) => {
			pairs.remove(index);
		}
		(None, Some(value)) => pairs.push((name.to_string(), value.to_string())),
		(None, None) => {}
	}
	node.attributes = Some(pairs.into_iter().flat_map(|(n, v)| [n, v]).collect());
}

fn form_locked(tree: &mut NodeTree, node_id: i64, base_uri: &str) -> Option<Value> {
	let entry = tree.get(node_id)?;
	let node = &entry.node;
	let parent = entry.parent.and_then(|id| tree.get(id));
	let is_document_element = node.node_type == DomNode::ELEMENT_NODE
		&& parent.is_some_and(|parent| parent.node.node_type == DomNode::DOCUMENT_NODE);
	let attrs: Vec<Value> = node
		.attribute_pairs()
		.into_iter()
		.map(|(name, value)| json!({ "name": name, "value": value }))
		.collect();
	let namespace = (node.node_type == DomNode::ELEMENT_NODE).then_some("http://www.w3.org/1999/xhtml");

	let form = json!({
		"actor": entry.actor_id,
		"baseURI": base_uri,
		"parent": parent.map(|parent| parent.actor_id.clone()),
		"nodeType": node.node_type,
		"namespaceURI": namespace,
		"nodeName": node.node_name,
		"nodeValue": node.node_value,
		"isDocumentElement": is_document_element,
		"numChildren": entry.num_children(),
		"attrs": attrs,
		"name": node.name,
		"publicId": node.public_id,
		"systemId": node.system_id,
		"hasEventListeners": false,
	});
	tree.mark_sent(node_id);
	Some(form)
}

pub struct WalkerActor {
	id: String,
	shared: Arc<WalkerShared>,
}

impl std::fmt::Debug for WalkerActor {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("WalkerActor").field("id", &self.id).finish()
	}
}

impl WalkerActor {
	/// Builds a walker and fetches the document. The caller manages it.
	pub async fn create(id: String, tab: Arc<TabContext>) -> Result<Arc<Self>> {
		let shared = WalkerShared::new(id.clone(), tab);
		shared.tab.rpc.request("DOM.enable", json!({})).await?;
		shared.ensure_document().await?;
		Ok(Arc::new(Self { id, shared }))
	}

	pub fn shared(&self) -> &Arc<WalkerShared> {
		&self.shared
	}

	/// `{actor, root}` with the document form.
	pub fn form(&self) -> Value {
		let root = (*self.shared.document.lock()).and_then(|id| self.shared.form(id));
		json!({ "actor": self.id, "root": root })
	}

	async fn document_element(&self) -> Result<Value> {
		let document = self.shared.ensure_document().await?;
		self.shared.ensure_children(document).await?;
		let element = {
			let tree = self.shared.tree.lock();
			tree.get(document).and_then(|entry| entry.children.clone()).and_then(|children| {
				children
					.into_iter()
					.find(|id| tree.get(*id).is_some_and(|c| c.node.node_type == DomNode::ELEMENT_NODE))
			})
		};
		let element = element.ok_or_else(|| Error::InvalidArgument("document has no element".into()))?;
		Ok(json!({ "node": self.shared.form(element) }))
	}

	async fn query_selector(&self, node: &str, selector: &str) -> Result<Value> {
		let parent = self.shared.node_id(node)?;
		let found: QuerySelectorResult = self
			.shared
			.tab
			.rpc
			.request_as("DOM.querySelector", json!({ "nodeId": parent, "selector": selector }))
			.await?;
		if found.node_id == 0 {
			return Ok(json!({}));
		}
		self.shared.ensure_known(found.node_id).await?;
		Ok(self.shared.node_with_parents(found.node_id))
	}

	async fn children(&self, node: &str, max_nodes: usize, start: Option<&str>) -> Result<Value> {
		let node_id = self.shared.node_id(node)?;
		self.shared.ensure_children(node_id).await?;

		let (window, has_first, has_last) = {
			let tree = self.shared.tree.lock();
			let children = tree.get(node_id).and_then(|entry| entry.children.clone()).unwrap_or_default();
			let begin = start
				.and_then(|actor| tree.node_for_actor(actor))
				.and_then(|start| children.iter().position(|id| *id == start))
				.unwrap_or(0);
			let end = begin.saturating_add(max_nodes).min(children.len());
			(children[begin..end].to_vec(), begin == 0, end == children.len())
		};
		Ok(json!({
			"hasFirst": has_first,
			"hasLast": has_last,
			"nodes": self.shared.forms(&window),
		}))
	}

	fn parents(&self, node: &str) -> Result<Value> {
		let node_id = self.shared.node_id(node)?;
		let ancestors = self.shared.tree.lock().ancestors(node_id);
		Ok(json!({ "nodes": self.shared.forms(&ancestors) }))
	}

	fn release_node(&self, node: &str) -> Result<Value> {
		let node_id = self.shared.node_id(node)?;
		let retired = self
			.shared
			.with_tree(|tree, alloc, created| tree.release(node_id, alloc, created))?;
		self.shared.unmanage_nodes(retired);
		Ok(json!({}))
	}
}

#[async_trait]
impl Actor for WalkerActor {
	fn actor_id(&self) -> &str {
		&self.id
	}

	fn spec(&self) -> &'static ActorSpec {
		&WALKER_SPEC
	}

	async fn handle(&self, _conn: &Arc<Connection>, packet: Packet) -> Result<Value> {
		match parse_request::<WalkerRequest>(&packet)? {
			WalkerRequest::Document => {
				let document = self.shared.ensure_document().await?;
				Ok(json!({ "node": self.shared.form(document) }))
			}
			WalkerRequest::DocumentElement => self.document_element().await,
			WalkerRequest::QuerySelector { node, selector } => self.query_selector(&node, &selector).await,
			WalkerRequest::Children { node, max_nodes, start } => {
				self.children(&node, max_nodes.unwrap_or(DEFAULT_MAX_NODES), start.as_deref())
					.await
			}
			WalkerRequest::GetMutations => Ok(json!({ "mutations": self.shared.mutations.lock().drain() })),
			WalkerRequest::Parents { node } => self.parents(&node),
			WalkerRequest::Pick => {
				self.shared.tab.rpc.request("Overlay.enable", json!({})).await?;
				self.shared.set_inspect_mode(true).await?;
				Ok(json!({}))
			}
			WalkerRequest::CancelPick => {
				self.shared.set_inspect_mode(false).await?;
				Ok(json!({}))
			}
			WalkerRequest::ReleaseNode { node } => self.release_node(&node),
		}
	}

	fn on_unmanaged(&self) {
		self.shared.subscriptions.lock().clear();
		self.shared.waiters.lock().clear();
	}
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttributeModification {
	attribute_name: String,
	#[serde(default)]
	new_value: Option<String>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum NodeRequest {
	GetNodeValue,
	ModifyAttributes { modifications: Vec<AttributeModification> },
}

/// Front-end handle on one remote DOM node.
pub struct NodeActor {
	id: String,
	node_id: i64,
	shared: Arc<WalkerShared>,
}

impl std::fmt::Debug for NodeActor {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("NodeActor")
			.field("id", &self.id)
			.field("node_id", &self.node_id)
			.finish()
	}
}

impl NodeActor {
	/// The target's id for this node.
	pub fn node_id(&self) -> i64 {
		self.node_id
	}

	/// Actor ids of the known ancestors, nearest first.
	pub fn ancestors(&self) -> Vec<String> {
		let tree = self.shared.tree.lock();
		tree.ancestors(self.node_id)
			.into_iter()
			.filter_map(|id| tree.actor_for(id).map(str::to_string))
			.collect()
	}
}

#[async_trait]
impl Actor for NodeActor {
	fn actor_id(&self) -> &str {
		&self.id
	}

	fn spec(&self) -> &'static ActorSpec {
		&NODE_SPEC
	}

	async fn handle(&self, _conn: &Arc<Connection>, packet: Packet) -> Result<Value> {
		match parse_request::<NodeRequest>(&packet)? {
			NodeRequest::GetNodeValue => {
				let value = self
					.shared
					.tree
					.lock()
					.get(self.node_id)
					.map(|entry| entry.node.node_value.clone())
					.unwrap_or_default();
				let scope = GripScope::new(Arc::clone(&self.shared.tab), self.shared.walker_id.clone());
				Ok(json!({ "value": scope.string(&value) }))
			}
			NodeRequest::ModifyAttributes { modifications } => {
				let rpc = &self.shared.tab.rpc;
				for modification in modifications {
					match modification.new_value {
						Some(value) => {
							rpc.request(
								"DOM.setAttributeValue",
								json!({ "nodeId": self.node_id, "name": modification.attribute_name, "value": value }),
							)
							.await?;
						}
						None => {
							rpc.request(
								"DOM.removeAttribute",
								json!({ "nodeId": self.node_id, "name": modification.attribute_name }),
							)
							.await?;
						}
					}
				}
				Ok(json!({}))
			}
		}
	}
}

#[cfg(test)]
mod tests;
