//! Stylesheet listing and per-sheet text access.

use std::sync::Arc;

use async_trait::async_trait;
use bridge_protocol::Packet;
use bridge_protocol::target::StyleSheetHeader;
use bridge_runtime::{Actor, ActorSpec, Connection, Error, Result, parse_request};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::context::TabContext;
use crate::grips::GripScope;

pub static STYLESHEETS_SPEC: ActorSpec = ActorSpec {
	type_name: "stylesheets",
	requests: &["getStyleSheets", "addStyleSheet"],
	events: &[],
};

pub static STYLESHEET_SPEC: ActorSpec = ActorSpec {
	type_name: "stylesheet",
	requests: &["getText", "update"],
	events: &[],
};

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum StyleSheetsRequest {
	GetStyleSheets,
	AddStyleSheet {
		#[serde(default)]
		text: String,
	},
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FrameTreeResult {
	frame_tree: FrameTreeNode,
}

#[derive(Deserialize)]
struct FrameTreeNode {
	frame: Frame,
}

#[derive(Deserialize)]
struct Frame {
	id: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateStyleSheetResult {
	style_sheet_id: String,
}

#[derive(Debug)]
pub struct StyleSheetsActor {
	id: String,
	tab: Arc<TabContext>,
}

impl StyleSheetsActor {
	pub fn new(id: String, tab: Arc<TabContext>) -> Self {
		Self { id, tab }
	}

	async fn main_frame_id(&self) -> Result<String> {
		let tree: FrameTreeResult = self.tab.rpc.request_as("Page.getResourceTree", json!({})).await?;
		Ok(tree.frame_tree.frame.id)
	}

	async fn add_style_sheet(&self, text: String) -> Result<Value> {
		let sheets = &self.tab.sheets;
		sheets.ensure_enabled(&self.tab.rpc).await?;
		let frame_id = self.main_frame_id().await?;
		let created: CreateStyleSheetResult = self
			.tab
			.rpc
			.request_as("CSS.createStyleSheet", json!({ "frameId": frame_id }))
			.await?;
		let sheet_id = created.style_sheet_id;
		self.tab
			.rpc
			.request("CSS.setStyleSheetText", json!({ "styleSheetId": sheet_id, "text": text }))
			.await?;

		// Older targets create the sheet without announcing it.
		if sheets.header(&sheet_id).is_none() {
			sheets.insert(StyleSheetHeader {
				style_sheet_id: sheet_id.clone(),
				frame_id,
				origin: "inspector".to_string(),
				is_inline: true,
				..Default::default()
			});
		}
		let form = sheets
			.sheet_form(&self.tab, &sheet_id)
			.ok_or_else(|| Error::ProtocolError(format!("stylesheet {sheet_id} vanished")))?;
		Ok(json!({ "styleSheet": form }))
	}
}

#[async_trait]
impl Actor for StyleSheetsActor {
	fn actor_id(&self) -> &str {
		&self.id
	}

	fn spec(&self) -> &'static ActorSpec {
		&STYLESHEETS_SPEC
	}

	async fn handle(&self, _conn: &Arc<Connection>, packet: Packet) -> Result<Value> {
		match parse_request::<StyleSheetsRequest>(&packet)? {
			StyleSheetsRequest::GetStyleSheets => {
				let sheets = &self.tab.sheets;
				sheets.ensure_enabled(&self.tab.rpc).await?;
				let forms: Vec<Value> = sheets
					.headers()
					.iter()
					.filter(|header| header.origin != "user-agent")
					.filter_map(|header| sheets.sheet_form(&self.tab, &header.style_sheet_id))
					.collect();
				Ok(json!({ "styleSheets": forms }))
			}
			StyleSheetsRequest::AddStyleSheet { text } => self.add_style_sheet(text).await,
		}
	}
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum StyleSheetRequest {
	GetText,
	Update { text: String },
}

#[derive(Deserialize)]
struct StyleSheetText {
	text: String,
}

/// One stylesheet of the page.
#[derive(Debug)]
pub struct StyleSheetActor {
	id: String,
	tab: Arc<TabContext>,
	sheet_id: String,
}

impl StyleSheetActor {
	pub fn new(id: String, tab: Arc<TabContext>, sheet_id: String) -> Self {
		Self { id, tab, sheet_id }
	}

	pub fn sheet_id(&self) -> &str {
		&self.sheet_id
	}
}

#[async_trait]
impl Actor for StyleSheetActor {
	fn actor_id(&self) -> &str {
		&self.id
	}

	fn spec(&self) -> &'static ActorSpec {
		&STYLESHEET_SPEC
	}

	async fn handle(&self, _conn: &Arc<Connection>, packet: Packet) -> Result<Value> {
		match parse_request::<StyleSheetRequest>(&packet)? {
			StyleSheetRequest::GetText => {
				let reply: StyleSheetText = self
					.tab
					.rpc
					.request_as("CSS.getStyleSheetText", json!({ "styleSheetId": self.sheet_id }))
					.await?;
				let scope = GripScope::new(Arc::clone(&self.tab), self.id.clone());
				Ok(json!({ "text": scope.string(&reply.text) }))
			}
			StyleSheetRequest::Update { text } => {
				self.tab
					.rpc
					.request("CSS.setStyleSheetText", json!({ "styleSheetId": self.sheet_id, "text": text }))
					.await?;
				Ok(json!({}))
			}
		}
	}
}

#[cfg(test)]
mod tests {
	use bridge_runtime::testing::{MockReply, MockTarget};

	use super::super::tests::header;
	use super::*;
	use crate::test_support::tab_fixture;

	fn css_target() -> MockTarget {
		let target = MockTarget::new();
		let events = target.clone();
		target.set_responder(move |method, params| match method {
			"CSS.enable" => {
				events.emit("CSS.styleSheetAdded", json!({"header": header("s1", "http://a/site.css")}));
				let mut ua = header("ua", "");
				ua["origin"] = json!("user-agent");
				events.emit("CSS.styleSheetAdded", json!({"header": ua}));
				MockReply::ok()
			}
			"Page.getResourceTree" => json!({"frameTree": {"frame": {"id": "F1"}, "resources": []}}).into(),
			"CSS.createStyleSheet" => json!({"styleSheetId": "s9"}).into(),
			"CSS.getStyleSheetText" => json!({"text": format!("/* {} */", params["styleSheetId"].as_str().unwrap())}).into(),
			_ => MockReply::ok(),
		});
		target
	}

	#[tokio::test]
	async fn test_get_style_sheets_hides_user_agent() {
		let target = css_target();
		let (conn, tab) = tab_fixture(&target);
		conn.manage("conn0.tab0", Arc::new(StyleSheetsActor::new("conn0.stylesheets1".into(), tab)));

		let reply = conn.dispatch(json!({"to": "conn0.stylesheets1", "type": "getStyleSheets"})).await;
		let sheets = reply["styleSheets"].as_array().unwrap();
		assert_eq!(sheets.len(), 1);
		assert_eq!(sheets[0]["href"], "http://a/site.css");

		let again = conn.dispatch(json!({"to": "conn0.stylesheets1", "type": "getStyleSheets"})).await;
		assert_eq!(again["styleSheets"][0]["actor"], sheets[0]["actor"]);
	}

	#[tokio::test]
	async fn test_add_style_sheet() {
		let target = css_target();
		let (conn, tab) = tab_fixture(&target);
		conn.manage("conn0.tab0", Arc::new(StyleSheetsActor::new("conn0.stylesheets1".into(), tab)));

		let reply = conn
			.dispatch(json!({"to": "conn0.stylesheets1", "type": "addStyleSheet", "text": "p { color: red }"}))
			.await;
		assert!(reply["styleSheet"]["actor"].is_string());
		assert_eq!(target.last_params("CSS.createStyleSheet"), Some(json!({"frameId": "F1"})));
		assert_eq!(
			target.last_params("CSS.setStyleSheetText"),
			Some(json!({"styleSheetId": "s9", "text": "p { color: red }"}))
		);
	}

	#[tokio::test]
	async fn test_sheet_text_and_update() {
		let target = css_target();
		let (conn, tab) = tab_fixture(&target);
		tab.sheets.ensure_enabled(&tab.rpc).await.unwrap();
		let form = tab.sheets.sheet_form(&tab, "s1").unwrap();
		let actor = form["actor"].as_str().unwrap();

		let reply = conn.dispatch(json!({"to": actor, "type": "getText"})).await;
		assert_eq!(reply["text"], "/* s1 */");

		conn.dispatch(json!({"to": actor, "type": "update", "text": "body {}"})).await;
		assert_eq!(
			target.last_params("CSS.setStyleSheetText"),
			Some(json!({"styleSheetId": "s1", "text": "body {}"}))
		);
	}
}
