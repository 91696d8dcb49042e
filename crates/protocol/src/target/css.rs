//! `CSS` domain shapes.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRange {
	pub start_line: u32,
	pub start_column: u32,
	pub end_line: u32,
	pub end_column: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CssProperty {
	pub name: String,
	#[serde(default)]
	pub value: String,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub important: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub disabled: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub implicit: Option<bool>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub range: Option<SourceRange>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CssStyle {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub style_sheet_id: Option<String>,
	#[serde(default)]
	pub css_properties: Vec<CssProperty>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub css_text: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub range: Option<SourceRange>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Selector {
	pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SelectorList {
	#[serde(default)]
	pub selectors: Vec<Selector>,
	#[serde(default)]
	pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CssRule {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub style_sheet_id: Option<String>,
	#[serde(default)]
	pub selector_list: SelectorList,
	/// `regular`, `user-agent`, `injected` or `inspector`.
	#[serde(default)]
	pub origin: String,
	pub style: CssStyle,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RuleMatch {
	pub rule: CssRule,
	#[serde(default)]
	pub matching_selectors: Vec<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InheritedStyleEntry {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub inline_style: Option<CssStyle>,
	#[serde(rename = "matchedCSSRules", default)]
	pub matched_css_rules: Vec<RuleMatch>,
}

/// Result of `CSS.getMatchedStylesForNode`. Rules are in ascending
/// cascade order; `inherited[0]` belongs to the parent element.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedStyles {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub inline_style: Option<CssStyle>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub attributes_style: Option<CssStyle>,
	#[serde(rename = "matchedCSSRules", default)]
	pub matched_css_rules: Vec<RuleMatch>,
	#[serde(default)]
	pub inherited: Vec<InheritedStyleEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedProperty {
	pub name: String,
	pub value: String,
}

/// Header announced by `CSS.styleSheetAdded`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleSheetHeader {
	pub style_sheet_id: String,
	#[serde(default)]
	pub frame_id: String,
	#[serde(rename = "sourceURL", default)]
	pub source_url: String,
	#[serde(default)]
	pub origin: String,
	#[serde(default)]
	pub title: String,
	#[serde(default)]
	pub disabled: bool,
	#[serde(default)]
	pub is_inline: bool,
	#[serde(default)]
	pub start_line: f64,
	#[serde(default)]
	pub start_column: f64,
}
