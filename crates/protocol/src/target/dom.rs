//! `DOM` domain shapes.

use serde::{Deserialize, Serialize};

/// Node handle as pushed by the target.
///
/// `children` is only present when the target chose to include the
/// subtree, e.g. for `DOM.getDocument` with a depth or `DOM.setChildNodes`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomNode {
	pub node_id: i64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub parent_id: Option<i64>,
	#[serde(default)]
	pub backend_node_id: i64,
	pub node_type: u32,
	#[serde(default)]
	pub node_name: String,
	#[serde(default)]
	pub local_name: String,
	#[serde(default)]
	pub node_value: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub child_node_count: Option<u32>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub children: Option<Vec<DomNode>>,
	/// Flat `[name, value, name, value, ...]` list.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub attributes: Option<Vec<String>>,
	#[serde(rename = "documentURL", default, skip_serializing_if = "Option::is_none")]
	pub document_url: Option<String>,
	#[serde(rename = "baseURL", default, skip_serializing_if = "Option::is_none")]
	pub base_url: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub public_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub system_id: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
}

impl DomNode {
	pub const ELEMENT_NODE: u32 = 1;
	pub const TEXT_NODE: u32 = 3;
	pub const DOCUMENT_NODE: u32 = 9;

	/// Attribute pairs in document order.
	pub fn attribute_pairs(&self) -> Vec<(String, String)> {
		self.attributes
			.as_deref()
			.unwrap_or_default()
			.chunks(2)
			.filter_map(|pair| match pair {
				[name, value] => Some((name.clone(), value.clone())),
				_ => None,
			})
			.collect()
	}
}

/// `DOM.setChildNodes` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetChildNodes {
	pub parent_id: i64,
	#[serde(default)]
	pub nodes: Vec<DomNode>,
}

/// `DOM.attributeModified` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeModified {
	pub node_id: i64,
	pub name: String,
	pub value: String,
}

/// `DOM.attributeRemoved` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeRemoved {
	pub node_id: i64,
	pub name: String,
}

/// `DOM.characterDataModified` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CharacterDataModified {
	pub node_id: i64,
	pub character_data: String,
}

/// `DOM.childNodeInserted` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildNodeInserted {
	pub parent_node_id: i64,
	#[serde(default)]
	pub previous_node_id: i64,
	pub node: DomNode,
}

/// `DOM.childNodeRemoved` event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChildNodeRemoved {
	pub parent_node_id: i64,
	pub node_id: i64,
}
