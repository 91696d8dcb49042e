//! Style rule actors: matched CSS rules and element (inline) styles.

use std::sync::Arc;

use async_trait::async_trait;
use bridge_protocol::Packet;
use bridge_protocol::target::{CssProperty, CssStyle, SourceRange};
use bridge_runtime::{Actor, ActorSpec, Connection, Error, Result, parse_request};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::context::TabContext;

pub static RULE_SPEC: ActorSpec = ActorSpec {
	type_name: "domstylerule",
	requests: &["modifyProperties"],
	events: &[],
};

/// `CSSRule.STYLE_RULE`.
const STYLE_RULE: u32 = 1;
/// Inline `style` attribute of an element.
const ELEMENT_STYLE: u32 = 100;

#[derive(Debug, Clone, PartialEq)]
pub enum RuleSource {
	/// The element's `style` attribute.
	Element { node_id: i64 },
	Sheet {
		sheet_id: Option<String>,
		selectors: Vec<String>,
		origin: String,
	},
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Modification {
	Set {
		name: String,
		value: String,
		#[serde(default)]
		priority: String,
	},
	Remove {
		name: String,
	},
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum RuleRequest {
	ModifyProperties { modifications: Vec<Modification> },
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct InlineStyles {
	#[serde(default)]
	inline_style: Option<CssStyle>,
}

#[derive(Deserialize)]
struct SetStyleTextsResult {
	#[serde(default)]
	styles: Vec<CssStyle>,
}

pub struct RuleActor {
	id: String,
	tab: Arc<TabContext>,
	source: RuleSource,
	style: Mutex<CssStyle>,
	sheet_actor: Option<String>,
}

impl std::fmt::Debug for RuleActor {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RuleActor")
			.field("id", &self.id)
			.field("source", &self.source)
			.finish_non_exhaustive()
	}
}

impl RuleActor {
	pub fn new(id: String, tab: Arc<TabContext>, source: RuleSource, style: CssStyle, sheet_actor: Option<String>) -> Self {
		Self {
			id,
			tab,
			source,
			style: Mutex::new(style),
			sheet_actor,
		}
	}

	pub fn source(&self) -> &RuleSource {
		&self.source
	}

	/// Replaces the cached style with a fresher copy from the target.
	pub fn refresh(&self, style: CssStyle) {
		*self.style.lock() = style;
	}

	pub fn form(&self) -> Value {
		let style = self.style.lock();
		let declarations: Vec<Value> = authored(&style)
			.map(|property| {
				json!({
					"name": property.name,
					"value": property.value,
					"priority": if property.important.unwrap_or(false) { "important" } else { "" },
					"disabled": property.disabled.unwrap_or(false),
				})
			})
			.collect();
		let (line, column) = style
			.range
			.as_ref()
			.map_or((0, 0), |range| (range.start_line + 1, range.start_column + 1));

		match &self.source {
			RuleSource::Element { .. } => json!({
				"actor": self.id,
				"type": ELEMENT_STYLE,
				"parentStyleSheet": null,
				"cssText": style.css_text.clone().unwrap_or_else(|| declaration_text(&style)),
				"declarations": declarations,
				"line": 0,
				"column": 0,
			}),
			RuleSource::Sheet { selectors, origin, .. } => json!({
				"actor": self.id,
				"type": STYLE_RULE,
				"parentStyleSheet": self.sheet_actor,
				"selectors": selectors,
				"cssText": style.css_text.clone().unwrap_or_else(|| declaration_text(&style)),
				"declarations": declarations,
				"line": line,
				"column": column,
				"isSystem": origin == "user-agent",
			}),
		}
	}

	async fn modify_properties(&self, modifications: Vec<Modification>) -> Result<Value> {
		let (text, sheet_id, range) = {
			let style = self.style.lock();
			let text = apply_modifications(&style, &modifications);
			(text, style.style_sheet_id.clone(), style.range.clone())
		};

		let rpc = &self.tab.rpc;
		let updated = match &self.source {
			RuleSource::Element { node_id } => {
				rpc.request(
					"DOM.setAttributeValue",
					json!({ "nodeId": node_id, "name": "style", "value": text }),
				)
				.await?;
				let styles: InlineStyles = rpc
					.request_as("CSS.getInlineStylesForNode", json!({ "nodeId": node_id }))
					.await?;
				styles.inline_style
			}
			RuleSource::Sheet { sheet_id: rule_sheet, .. } => {
				let (Some(sheet_id), Some(range)) = (sheet_id.or_else(|| rule_sheet.clone()), range) else {
					return Err(Error::NotImplemented("rule has no editable source range".into()));
				};
				let result: SetStyleTextsResult = rpc
					.request_as(
						"CSS.setStyleTexts",
						json!({ "edits": [{ "styleSheetId": sheet_id, "range": range_json(&range), "text": text }] }),
					)
					.await?;
				result.styles.into_iter().next()
			}
		};
		if let Some(style) = updated {
			self.refresh(style);
		}
		Ok(json!({ "rule": self.form() }))
	}
}

fn range_json(range: &SourceRange) -> Value {
	json!({
		"startLine": range.start_line,
		"startColumn": range.start_column,
		"endLine": range.end_line,
		"endColumn": range.end_column,
	})
}

/// The declarations written by the author, without longhand expansions.
fn authored(style: &CssStyle) -> impl Iterator<Item = &CssProperty> {
	let ranged = style.css_properties.iter().any(|property| property.range.is_some());
	style
		.css_properties
		.iter()
		.filter(move |property| !property.implicit.unwrap_or(false) && (!ranged || property.range.is_some()))
}

fn declaration_text(style: &CssStyle) -> String {
	let declarations: Vec<(String, String, bool)> = authored(style)
		.filter(|property| !property.disabled.unwrap_or(false))
		.map(|property| (property.name.clone(), property.value.clone(), property.important.unwrap_or(false)))
		.collect();
	render(&declarations)
}

fn render(declarations: &[(String, String, bool)]) -> String {
	declarations
		.iter()
		.map(|(name, value, important)| {
			let priority = if *important { " !important" } else { "" };
			format!("{name}: {value}{priority};")
		})
		.collect::<Vec<_>>()
		.join(" ")
}

/// Rule text after applying `modifications` to the enabled declarations.
pub fn apply_modifications(style: &CssStyle, modifications: &[Modification]) -> String {
	let mut declarations: Vec<(String, String, bool)> = authored(style)
		.filter(|property| !property.disabled.unwrap_or(false))
		.map(|property| (property.name.clone(), property.value.clone(), property.important.unwrap_or(false)))
		.collect();

	for modification in modifications {
		match modification {
			Modification::Set { name, value, priority } => {
				let important = priority == "important";
				match declarations.iter_mut().find(|(n, _, _)| n == name) {
					Some(existing) => {
						existing.1 = value.clone();
						existing.2 = important;
					}
					None => declarations.push((name.clone(), value.clone(), important)),
				}
			}
			Modification::Remove { name } => declarations.retain(|(n, _, _)| n != name),
		}
	}
	render(&declarations)
}

#[async_trait]
impl Actor for RuleActor {
	fn actor_id(&self) -> &str {
		&self.id
	}

	fn spec(&self) -> &'static ActorSpec {
		&RULE_SPEC
	}

	async fn handle(&self, _conn: &Arc<Connection>, packet: Packet) -> Result<Value> {
		match parse_request::<RuleRequest>(&packet)? {
			RuleRequest::ModifyProperties { modifications } => self.modify_properties(modifications).await,
		}
	}
}
