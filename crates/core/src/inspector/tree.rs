//! Mirror of the target's DOM as far as the front-end has explored it.
//!
//! Pure bookkeeping: remote node ids to actor ids, parent links, fetched
//! child lists, and whether a node's form has crossed the wire. The walker
//! owns one tree behind a lock and performs all remote calls itself.

use std::collections::HashMap;

use bridge_protocol::target::DomNode;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct NodeEntry {
	pub actor_id: String,
	/// Last known state of the node, without its embedded children.
	pub node: DomNode,
	pub parent: Option<i64>,
	/// `None` until the child list has been fetched.
	pub children: Option<Vec<i64>>,
	pub sent: bool,
}

impl NodeEntry {
	pub fn num_children(&self) -> usize {
		match (&self.children, self.node.child_node_count) {
			(_, Some(count)) => count as usize,
			(Some(children), None) => children.len(),
			(None, None) => 0,
		}
	}
}

#[derive(Debug, Default)]
pub struct NodeTree {
	nodes: HashMap<i64, NodeEntry>,
	by_actor: HashMap<String, i64>,
}

impl NodeTree {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn get(&self, node_id: i64) -> Option<&NodeEntry> {
		self.nodes.get(&node_id)
	}

	pub fn get_mut(&mut self, node_id: i64) -> Option<&mut NodeEntry> {
		self.nodes.get_mut(&node_id)
	}

	pub fn node_for_actor(&self, actor_id: &str) -> Option<i64> {
		self.by_actor.get(actor_id).copied()
	}

	pub fn actor_for(&self, node_id: i64) -> Option<&str> {
		self.nodes.get(&node_id).map(|entry| entry.actor_id.as_str())
	}

	pub fn len(&self) -> usize {
		self.nodes.len()
	}

	pub fn is_empty(&self) -> bool {
		self.nodes.is_empty()
	}

	/// Returns the actor id for `node`, allocating one through `alloc` if the
	/// node is new. Embedded children are referenced recursively and linked
	/// to `node`. Newly created `(actor id, node id)` pairs are appended to
	/// `created`.
	pub fn reference(
		&mut self,
		node: &DomNode,
		parent: Option<i64>,
		alloc: &mut dyn FnMut() -> String,
		created: &mut Vec<(String, i64)>,
	) -> String {
		let mut shallow = node.clone();
		let embedded = shallow.children.take();

		let actor_id = match self.nodes.get_mut(&node.node_id) {
			Some(entry) => {
				entry.node = shallow;
				if parent.is_some() {
					entry.parent = parent;
				}
				entry.actor_id.clone()
			}
			None => {
				let actor_id = alloc();
				self.by_actor.insert(actor_id.clone(), node.node_id);
				self.nodes.insert(
					node.node_id,
					NodeEntry {
						actor_id: actor_id.clone(),
						node: shallow,
						parent,
						children: None,
						sent: false,
					},
				);
				created.push((actor_id.clone(), node.node_id));
				actor_id
			}
		};

		if let Some(children) = embedded {
			self.set_children(node.node_id, &children, alloc, created);
		}
		actor_id
	}

	/// Replaces the child list of `parent`.
	pub fn set_children(
		&mut self,
		parent: i64,
		children: &[DomNode],
		alloc: &mut dyn FnMut() -> String,
		created: &mut Vec<(String, i64)>,
	) {
		let ids: Vec<i64> = children
			.iter()
			.map(|child| {
				self.reference(child, Some(parent), alloc, created);
				child.node_id
			})
			.collect();
		if let Some(entry) = self.nodes.get_mut(&parent) {
			entry.node.child_node_count = Some(ids.len() as u32);
			entry.children = Some(ids);
		}
	}

	/// Inserts `node` after `previous` (0 for first) if the parent's child
	/// list is known, and bumps the child count either way.
	pub fn insert_child(
		&mut self,
		parent: i64,
		previous: i64,
		node: &DomNode,
		alloc: &mut dyn FnMut() -> String,
		created: &mut Vec<(String, i64)>,
	) -> Option<String> {
		if !self.nodes.contains_key(&parent) {
			return None;
		}
		let actor_id = self.reference(node, Some(parent), alloc, created);
		if let Some(entry) = self.nodes.get_mut(&parent) {
			if let Some(children) = entry.children.as_mut() {
				let at = children
					.iter()
					.position(|id| *id == previous)
					.map_or(0, |index| index + 1);
				children.insert(at, node.node_id);
			}
			entry.node.child_node_count = Some(entry.node.child_node_count.unwrap_or(0) + 1);
		}
		Some(actor_id)
	}

	/// Drops `node_id` and its known descendants, unlinking it from its
	/// parent. Returns the actor ids that were forgotten.
	pub fn remove(&mut self, node_id: i64) -> Vec<String> {
		if let Some(parent) = self.nodes.get(&node_id).and_then(|entry| entry.parent) {
			if let Some(entry) = self.nodes.get_mut(&parent) {
				if let Some(children) = entry.children.as_mut() {
					children.retain(|id| *id != node_id);
				}
				entry.node.child_node_count = entry.node.child_node_count.map(|n| n.saturating_sub(1));
			}
		}
		let mut removed = Vec::new();
		self.forget(node_id, &mut removed);
		removed
	}

	/// Retires the actors of `node_id` and its known descendants, keeping
	/// the nodes and every child list. Each node gets a fresh actor id
	/// (pushed to `created`) and counts as unsent. Returns the retired ids.
	pub fn release(
		&mut self,
		node_id: i64,
		alloc: &mut dyn FnMut() -> String,
		created: &mut Vec<(String, i64)>,
	) -> Vec<String> {
		let mut retired = Vec::new();
		let mut pending = vec![node_id];
		while let Some(id) = pending.pop() {
			let Some(entry) = self.nodes.get_mut(&id) else {
				continue;
			};
			let fresh = alloc();
			let old = std::mem::replace(&mut entry.actor_id, fresh.clone());
			entry.sent = false;
			pending.extend(entry.children.iter().flatten().copied());
			self.by_actor.remove(&old);
			self.by_actor.insert(fresh.clone(), id);
			created.push((fresh, id));
			retired.push(old);
		}
		retired
	}

	fn forget(&mut self, node_id: i64, removed: &mut Vec<String>) {
		let Some(entry) = self.nodes.remove(&node_id) else {
			return;
		};
		self.by_actor.remove(&entry.actor_id);
		removed.push(entry.actor_id);
		for child in entry.children.unwrap_or_default() {
			self.forget(child, removed);
		}
	}

	/// Forgets everything; returns every actor id the tree knew.
	pub fn clear(&mut self) -> Vec<String> {
		self.nodes.clear();
		self.by_actor.drain().map(|(actor_id, _)| actor_id).collect()
	}

	pub fn mark_sent(&mut self, node_id: i64) {
		if let Some(entry) = self.nodes.get_mut(&node_id) {
			entry.sent = true;
		}
	}

	pub fn is_sent(&self, node_id: i64) -> bool {
		self.nodes.get(&node_id).is_some_and(|entry| entry.sent)
	}

	/// Ancestors of `node_id`, nearest first.
	pub fn ancestors(&self, node_id: i64) -> Vec<i64> {
		let mut out = Vec::new();
		let mut current = self.nodes.get(&node_id).and_then(|entry| entry.parent);
		while let Some(id) = current {
			if out.contains(&id) {
				break;
			}
			out.push(id);
			current = self.nodes.get(&id).and_then(|entry| entry.parent);
		}
		out
	}

	/// The ancestors of `node_id` the front-end has not seen yet, root first.
	pub fn ensure_path_to_root(&self, node_id: i64) -> Vec<i64> {
		let mut missing: Vec<i64> = self.ancestors(node_id).into_iter().filter(|id| !self.is_sent(*id)).collect();
		missing.reverse();
		missing
	}
}

/// Pending mutation records for one walker.
#[derive(Debug, Default)]
pub struct MutationQueue {
	pending: Vec<Value>,
}

impl MutationQueue {
	/// Queues a record. Returns true when the queue was empty before, i.e.
	/// when the front-end needs a fresh notification.
	pub fn push(&mut self, mutation: Value) -> bool {
		self.pending.push(mutation);
		self.pending.len() == 1
	}

	pub fn drain(&mut self) -> Vec<Value> {
		std::mem::take(&mut self.pending)
	}

	pub fn len(&self) -> usize {
		self.pending.len()
	}

	pub fn is_empty(&self) -> bool {
		self.pending.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use serde_json::json;

	use super::*;

	fn node(value: Value) -> DomNode {
		serde_json::from_value(value).unwrap()
	}

	fn counter() -> impl FnMut() -> String {
		let mut n = 0;
		move || {
			n += 1;
			format!("node{n}")
		}
	}

	fn document() -> DomNode {
		node(json!({
			"nodeId": 1, "nodeType": 9, "nodeName": "#document", "childNodeCount": 1,
			"children": [{
				"nodeId": 2, "nodeType": 1, "nodeName": "HTML", "childNodeCount": 2,
				"children": [
					{"nodeId": 3, "nodeType": 1, "nodeName": "HEAD", "childNodeCount": 0},
					{"nodeId": 4, "nodeType": 1, "nodeName": "BODY", "childNodeCount": 3},
				]
			}]
		}))
	}

	#[test]
	fn test_reference_absorbs_embedded_children() {
		let mut tree = NodeTree::new();
		let mut alloc = counter();
		let mut created = Vec::new();
		let root = tree.reference(&document(), None, &mut alloc, &mut created);

		assert_eq!(root, "node1");
		assert_eq!(tree.len(), 4);
		assert_eq!(created.len(), 4);
		assert_eq!(tree.get(2).unwrap().children, Some(vec![3, 4]));
		assert_eq!(tree.get(4).unwrap().parent, Some(2));
		assert_eq!(tree.get(4).unwrap().children, None);
		assert_eq!(tree.get(4).unwrap().num_children(), 3);
		assert_eq!(tree.node_for_actor("node4"), Some(4));
	}

	#[test]
	fn test_rereference_keeps_actor() {
		let mut tree = NodeTree::new();
		let mut alloc = counter();
		let mut created = Vec::new();
		tree.reference(&document(), None, &mut alloc, &mut created);
		created.clear();

		let body = node(json!({"nodeId": 4, "nodeType": 1, "nodeName": "BODY", "attributes": ["class", "x"]}));
		let again = tree.reference(&body, None, &mut alloc, &mut created);
		assert_eq!(again, "node4");
		assert!(created.is_empty());
		assert_eq!(tree.get(4).unwrap().parent, Some(2));
		assert_eq!(tree.get(4).unwrap().node.attribute_pairs(), vec![("class".to_string(), "x".to_string())]);
	}

	#[test]
	fn test_path_to_root_lists_only_unsent_ancestors() {
		let mut tree = NodeTree::new();
		let mut alloc = counter();
		let mut created = Vec::new();
		tree.reference(&document(), None, &mut alloc, &mut created);
		let deep = [node(json!({"nodeId": 5, "nodeType": 1, "nodeName": "DIV",
			"children": [{"nodeId": 6, "nodeType": 1, "nodeName": "SPAN"}]}))];
		tree.set_children(4, &deep, &mut alloc, &mut created);

		tree.mark_sent(1);
		tree.mark_sent(2);
		assert_eq!(tree.ensure_path_to_root(6), vec![4, 5]);
		assert_eq!(tree.ancestors(6), vec![5, 4, 2, 1]);

		tree.mark_sent(4);
		assert_eq!(tree.ensure_path_to_root(6), vec![5]);
	}

	#[test]
	fn test_insert_and_remove_child() {
		let mut tree = NodeTree::new();
		let mut alloc = counter();
		let mut created = Vec::new();
		tree.reference(&document(), None, &mut alloc, &mut created);

		let inserted = node(json!({"nodeId": 9, "nodeType": 1, "nodeName": "NAV"}));
		let actor = tree.insert_child(2, 3, &inserted, &mut alloc, &mut created).unwrap();
		assert_eq!(tree.get(2).unwrap().children, Some(vec![3, 9, 4]));
		assert_eq!(tree.get(2).unwrap().num_children(), 3);

		assert_eq!(tree.remove(9), vec![actor]);
		assert_eq!(tree.get(2).unwrap().children, Some(vec![3, 4]));
		assert!(tree.node_for_actor("node5").is_none());

		assert!(tree.insert_child(77, 0, &inserted, &mut alloc, &mut created).is_none());
	}

	#[test]
	fn test_release_reissues_subtree_actors() {
		let mut tree = NodeTree::new();
		let mut alloc = counter();
		let mut created = Vec::new();
		tree.reference(&document(), None, &mut alloc, &mut created);
		tree.mark_sent(2);
		created.clear();

		let mut retired = tree.release(2, &mut alloc, &mut created);
		retired.sort();
		assert_eq!(retired, ["node2", "node3", "node4"]);
		assert_eq!(created.len(), 3);
		assert_eq!(tree.len(), 4);
		assert_eq!(tree.get(1).unwrap().children, Some(vec![2]));
		assert_eq!(tree.get(2).unwrap().children, Some(vec![3, 4]));
		assert!(tree.node_for_actor("node2").is_none());
		assert!(!tree.is_sent(2));
		let fresh = tree.actor_for(2).unwrap().to_string();
		assert_eq!(tree.node_for_actor(&fresh), Some(2));
	}

	#[test]
	fn test_mutation_queue_notifies_on_first_push() {
		let mut queue = MutationQueue::default();
		assert!(queue.push(json!({"type": "attributes"})));
		assert!(!queue.push(json!({"type": "characterData"})));
		assert_eq!(queue.drain().len(), 2);
		assert!(queue.is_empty());
		assert!(queue.push(json!({"type": "attributes"})));
	}
}
