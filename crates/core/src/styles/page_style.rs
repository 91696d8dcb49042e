//! Applied and computed style of a node.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use bridge_protocol::Packet;
use bridge_protocol::target::{ComputedProperty, CssStyle, MatchedStyles, RuleMatch};
use bridge_runtime::{Actor, ActorSpec, Connection, Error, Result, parse_request};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::rule::{RuleActor, RuleSource};
use crate::context::TabContext;
use crate::inspector::NodeActor;

pub static PAGE_STYLE_SPEC: ActorSpec = ActorSpec {
	type_name: "pagestyle",
	requests: &["getApplied", "getComputed"],
	events: &[],
};

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
enum PageStyleRequest {
	GetApplied {
		node: String,
		#[serde(default)]
		inherited: bool,
		#[serde(default)]
		matched_selectors: bool,
	},
	GetComputed {
		node: String,
		#[serde(default)]
		mark_matched: bool,
		#[serde(default)]
		only_matched: bool,
	},
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ComputedStyleResult {
	#[serde(default)]
	computed_style: Vec<ComputedProperty>,
}

/// Accumulates the entries of one `getApplied` reply and the distinct rule
/// and sheet forms they reference.
#[derive(Default)]
struct Applied {
	entries: Vec<Value>,
	rules: Vec<Value>,
	seen_rules: HashSet<String>,
	sheets: Vec<Value>,
	seen_sheets: HashSet<String>,
}

impl Applied {
	fn push(&mut self, rule: &RuleActor, entry: Value) {
		let form = rule.form();
		if self.seen_rules.insert(rule.actor_id().to_string()) {
			self.rules.push(form);
		}
		self.entries.push(entry);
	}

	fn sheet(&mut self, form: Value) {
		if let Some(actor) = form["actor"].as_str() {
			if self.seen_sheets.insert(actor.to_string()) {
				self.sheets.push(form);
			}
		}
	}
}

/// Resolves style for nodes of one walker; rule actors live under it.
pub struct PageStyleActor {
	id: String,
	tab: Arc<TabContext>,
	/// Rule identity key to rule actor id.
	rules: Mutex<HashMap<String, String>>,
}

impl std::fmt::Debug for PageStyleActor {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("PageStyleActor")
			.field("id", &self.id)
			.field("rules", &self.rules.lock().len())
			.finish()
	}
}

fn rule_key(source: &RuleSource, style: &CssStyle) -> String {
	match source {
		RuleSource::Element { node_id } => format!("element:{node_id}"),
		RuleSource::Sheet {
			sheet_id,
			selectors,
			origin,
		} => match (sheet_id, &style.range) {
			(Some(_), Some(_)) => json!([sheet_id, style.range, selectors.join(", ")]).to_string(),
			// User-agent rules carry no sheet and no range; the declarations tell them apart.
			_ => json!([origin, sheet_id, selectors.join(", "), declarations(style)]).to_string(),
		},
	}
}

fn declarations(style: &CssStyle) -> String {
	match &style.css_text {
		Some(text) => text.clone(),
		None => style
			.css_properties
			.iter()
			.map(|property| format!("{}: {}", property.name, property.value))
			.collect::<Vec<_>>()
			.join("; "),
	}
}

impl PageStyleActor {
	pub fn new(id: String, tab: Arc<TabContext>) -> Self {
		Self {
			id,
			tab,
			rules: Mutex::new(HashMap::new()),
		}
	}

	fn node(conn: &Connection, node: &str) -> Result<Arc<NodeActor>> {
		conn.get_typed::<NodeActor>(node)
			.ok_or_else(|| Error::NoSuchActor(node.to_string()))
	}

	/// The rule actor for `source`, refreshed with `style`.
	fn rule(&self, conn: &Arc<Connection>, source: RuleSource, style: CssStyle, applied: &mut Applied) -> Arc<RuleActor> {
		let sheet_actor = match &source {
			RuleSource::Sheet { sheet_id: Some(sheet_id), .. } => {
				self.tab.sheets.sheet_form(&self.tab, sheet_id).and_then(|form| {
					let actor = form["actor"].as_str().map(str::to_string);
					applied.sheet(form);
					actor
				})
			}
			_ => None,
		};

		let key = rule_key(&source, &style);
		let mut rules = self.rules.lock();
		if let Some(rule) = rules.get(&key).and_then(|id| conn.get_typed::<RuleActor>(id)) {
			rule.refresh(style);
			return rule;
		}
		let id = conn.alloc_id("rule");
		let rule = Arc::new(RuleActor::new(id.clone(), Arc::clone(&self.tab), source, style, sheet_actor));
		conn.manage(&self.id, rule.clone());
		rules.insert(key, id);
		rule
	}

	fn push_matches(
		&self,
		conn: &Arc<Connection>,
		matches: Vec<RuleMatch>,
		inherited: Option<&str>,
		matched_selectors: bool,
		applied: &mut Applied,
	) {
		// Target order is ascending cascade; most specific goes first.
		for entry in matches.into_iter().rev() {
			let selectors: Vec<String> = entry.rule.selector_list.selectors.iter().map(|s| s.text.clone()).collect();
			let matched: Vec<String> = entry
				.matching_selectors
				.iter()
				.filter_map(|index| selectors.get(*index).cloned())
				.collect();
			let is_system = entry.rule.origin == "user-agent";
			let source = RuleSource::Sheet {
				sheet_id: entry.rule.style_sheet_id.clone(),
				selectors,
				origin: entry.rule.origin,
			};
			let rule = self.rule(conn, source, entry.rule.style, applied);
			let mut form = json!({
				"rule": rule.actor_id(),
				"inherited": inherited,
				"isSystem": is_system,
			});
			if matched_selectors {
				form["matchedSelectors"] = json!(matched);
			}
			applied.push(&rule, form);
		}
	}

	async fn get_applied(
		&self,
		conn: &Arc<Connection>,
		node: &str,
		inherited: bool,
		matched_selectors: bool,
	) -> Result<Value> {
		let node = Self::node(conn, node)?;
		self.tab.sheets.ensure_enabled(&self.tab.rpc).await?;
		let styles: MatchedStyles = self
			.tab
			.rpc
			.request_as("CSS.getMatchedStylesForNode", json!({ "nodeId": node.node_id() }))
			.await?;

		let mut applied = Applied::default();
		if let Some(style) = styles.inline_style.filter(|s| !s.css_properties.is_empty()) {
			let rule = self.rule(conn, RuleSource::Element { node_id: node.node_id() }, style, &mut applied);
			applied.push(&rule, json!({ "rule": rule.actor_id(), "inherited": null, "isSystem": false }));
		}
		self.push_matches(conn, styles.matched_css_rules, None, matched_selectors, &mut applied);

		if inherited {
			let ancestors = node.ancestors();
			for (entry, ancestor) in styles.inherited.into_iter().zip(ancestors.iter()) {
				let ancestor_node = conn.get_typed::<NodeActor>(ancestor);
				if let (Some(style), Some(ancestor_node)) = (
					entry.inline_style.filter(|s| !s.css_properties.is_empty()),
					ancestor_node,
				) {
					let source = RuleSource::Element {
						node_id: ancestor_node.node_id(),
					};
					let rule = self.rule(conn, source, style, &mut applied);
					applied.push(
						&rule,
						json!({ "rule": rule.actor_id(), "inherited": ancestor, "isSystem": false }),
					);
				}
				self.push_matches(conn, entry.matched_css_rules, Some(ancestor), matched_selectors, &mut applied);
			}
		}

		tracing::debug!(node = node.node_id(), entries = applied.entries.len(), "applied styles");
		Ok(json!({
			"entries": applied.entries,
			"rules": applied.rules,
			"sheets": applied.sheets,
		}))
	}

	async fn get_computed(
		&self,
		conn: &Arc<Connection>,
		node: &str,
		mark_matched: bool,
		only_matched: bool,
	) -> Result<Value> {
		let node = Self::node(conn, node)?;
		self.tab.sheets.ensure_enabled(&self.tab.rpc).await?;
		let computed: ComputedStyleResult = self
			.tab
			.rpc
			.request_as("CSS.getComputedStyleForNode", json!({ "nodeId": node.node_id() }))
			.await?;

		let matched = if mark_matched || only_matched {
			let styles: MatchedStyles = self
				.tab
				.rpc
				.request_as("CSS.getMatchedStylesForNode", json!({ "nodeId": node.node_id() }))
				.await?;
			Some(matched_names(&styles))
		} else {
			None
		};

		let mut out = Map::new();
		for property in computed.computed_style {
			let is_matched = matched.as_ref().map(|names| names.contains(&property.name));
			if only_matched && is_matched != Some(true) {
				continue;
			}
			let mut entry = json!({ "value": property.value });
			if mark_matched {
				entry["matched"] = json!(is_matched.unwrap_or(false));
			}
			out.insert(property.name, entry);
		}
		Ok(json!({ "computed": out }))
	}
}

/// Property names set by the node's own inline style or matched rules.
fn matched_names(styles: &MatchedStyles) -> HashSet<String> {
	let rules = styles.matched_css_rules.iter().map(|entry| &entry.rule.style);
	styles
		.inline_style
		.iter()
		.chain(styles.attributes_style.iter())
		.chain(rules)
		.flat_map(|style| style.css_properties.iter())
		.filter(|property| !property.disabled.unwrap_or(false))
		.map(|property| property.name.clone())
		.collect()
}

#[async_trait]
impl Actor for PageStyleActor {
	fn actor_id(&self) -> &str {
		&self.id
	}

	fn spec(&self) -> &'static ActorSpec {
		&PAGE_STYLE_SPEC
	}

	async fn handle(&self, conn: &Arc<Connection>, packet: Packet) -> Result<Value> {
		match parse_request::<PageStyleRequest>(&packet)? {
			PageStyleRequest::GetApplied {
				node,
				inherited,
				matched_selectors,
			} => self.get_applied(conn, &node, inherited, matched_selectors).await,
			PageStyleRequest::GetComputed {
				node,
				mark_matched,
				only_matched,
			} => self.get_computed(conn, &node, mark_matched, only_matched).await,
		}
	}

	fn on_unmanaged(&self) {
		self.rules.lock().clear();
	}
}
