//! Style inspection: page style, rules and stylesheets.
//!
//! Stylesheet headers arrive as `CSS.styleSheetAdded` events once the CSS
//! domain is enabled. [`SheetRegistry`] collects them per tab and hands out
//! one [`StyleSheetActor`] per sheet id, shared by the page-style and
//! stylesheets actors.

pub mod page_style;
pub mod rule;
pub mod sheets;

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use bridge_protocol::target::StyleSheetHeader;
use bridge_runtime::{Error, Result, RpcClient, Subscription};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::OnceCell;

pub use page_style::PageStyleActor;
pub use rule::RuleActor;
pub use sheets::{StyleSheetActor, StyleSheetsActor};

use crate::context::TabContext;

#[derive(Deserialize)]
struct StyleSheetAdded {
	header: StyleSheetHeader,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct StyleSheetRemoved {
	style_sheet_id: String,
}

/// Stylesheet headers of one tab, in the order the target reported them.
#[derive(Default)]
pub struct SheetRegistry {
	headers: Mutex<IndexMap<String, StyleSheetHeader>>,
	/// Sheet id to sheet actor id.
	actors: Mutex<HashMap<String, String>>,
	enabled: OnceCell<()>,
	subscriptions: Mutex<Vec<Subscription>>,
}

impl std::fmt::Debug for SheetRegistry {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SheetRegistry")
			.field("sheets", &self.headers.lock().len())
			.finish_non_exhaustive()
	}
}

impl SheetRegistry {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	/// Enables the DOM and CSS domains once, collecting sheet headers.
	pub async fn ensure_enabled(self: &Arc<Self>, rpc: &RpcClient) -> Result<()> {
		self.enabled
			.get_or_try_init(|| async {
				self.subscribe(rpc);
				rpc.request("DOM.enable", json!({})).await?;
				rpc.request("CSS.enable", json!({})).await?;
				Ok::<(), Error>(())
			})
			.await
			.map(|_| ())
	}

	fn subscribe(self: &Arc<Self>, rpc: &RpcClient) {
		let weak: Weak<Self> = Arc::downgrade(self);
		let added = rpc.on("CSS.styleSheetAdded", move |params| {
			let (Some(registry), Ok(event)) = (weak.upgrade(), StyleSheetAdded::deserialize(params)) else {
				return;
			};
			registry.insert(event.header);
		});
		let weak: Weak<Self> = Arc::downgrade(self);
		let removed = rpc.on("CSS.styleSheetRemoved", move |params| {
			let (Some(registry), Ok(event)) = (weak.upgrade(), StyleSheetRemoved::deserialize(params)) else {
				return;
			};
			registry.headers.lock().shift_remove(&event.style_sheet_id);
		});
		*self.subscriptions.lock() = vec![added, removed];
	}

	pub fn insert(&self, header: StyleSheetHeader) {
		self.headers.lock().insert(header.style_sheet_id.clone(), header);
	}

	pub fn headers(&self) -> Vec<StyleSheetHeader> {
		self.headers.lock().values().cloned().collect()
	}

	pub fn header(&self, sheet_id: &str) -> Option<StyleSheetHeader> {
		self.headers.lock().get(sheet_id).cloned()
	}

	/// Form of the sheet's actor, creating the actor on first use. Sheet
	/// actors live as long as the tab attachment.
	pub fn sheet_form(&self, tab: &Arc<TabContext>, sheet_id: &str) -> Option<Value> {
		let conn = tab.conn().ok()?;
		let (index, header) = {
			let headers = self.headers.lock();
			let (index, _, header) = headers.get_full(sheet_id)?;
			(index, header.clone())
		};

		let mut actors = self.actors.lock();
		let actor_id = match actors.get(sheet_id).filter(|id| conn.has_actor(id)) {
			Some(id) => id.clone(),
			None => {
				let id = conn.alloc_id("stylesheet");
				conn.manage(
					&tab.tab_id,
					Arc::new(StyleSheetActor::new(id.clone(), Arc::clone(tab), sheet_id.to_string())),
				);
				actors.insert(sheet_id.to_string(), id.clone());
				id
			}
		};
		Some(sheet_form(&actor_id, &header, index))
	}
}

fn sheet_form(actor_id: &str, header: &StyleSheetHeader, index: usize) -> Value {
	let href = (!header.is_inline && !header.source_url.is_empty()).then(|| header.source_url.clone());
	json!({
		"actor": actor_id,
		"href": href,
		"nodeHref": header.source_url,
		"disabled": header.disabled,
		"title": header.title,
		"system": header.origin == "user-agent",
		"styleSheetIndex": index,
	})
}

#[cfg(test)]
mod tests {
	use bridge_runtime::testing::{MockReply, MockTarget};

	use super::*;
	use crate::test_support::{sync, tab_fixture};

	pub(crate) fn header(id: &str, url: &str) -> Value {
		json!({"styleSheetId": id, "frameId": "F1", "sourceURL": url, "origin": "regular",
			"title": "", "disabled": false, "isInline": false, "startLine": 0, "startColumn": 0})
	}

	#[tokio::test]
	async fn test_enable_collects_headers_once() {
		let target = MockTarget::new();
		let events = target.clone();
		target.set_responder(move |method, _| {
			if method == "CSS.enable" {
				events.emit("CSS.styleSheetAdded", json!({"header": header("s1", "http://a/site.css")}));
				events.emit("CSS.styleSheetAdded", json!({"header": header("s2", "http://a/print.css")}));
			}
			MockReply::ok()
		});
		let (_conn, tab) = tab_fixture(&target);

		tab.sheets.ensure_enabled(&tab.rpc).await.unwrap();
		tab.sheets.ensure_enabled(&tab.rpc).await.unwrap();
		assert_eq!(target.methods(), ["DOM.enable", "CSS.enable"]);
		let ids: Vec<String> = tab.sheets.headers().into_iter().map(|h| h.style_sheet_id).collect();
		assert_eq!(ids, ["s1", "s2"]);

		target.emit("CSS.styleSheetRemoved", json!({"styleSheetId": "s1"}));
		sync(&tab.rpc).await;
		assert!(tab.sheets.header("s1").is_none());
	}

	#[tokio::test]
	async fn test_sheet_actor_is_stable() {
		let target = MockTarget::new();
		let (conn, tab) = tab_fixture(&target);
		tab.sheets.insert(serde_json::from_value(header("s1", "http://a/site.css")).unwrap());

		let first = tab.sheets.sheet_form(&tab, "s1").unwrap();
		let second = tab.sheets.sheet_form(&tab, "s1").unwrap();
		assert_eq!(first["actor"], second["actor"]);
		assert_eq!(first["href"], "http://a/site.css");
		assert_eq!(first["styleSheetIndex"], 0);
		assert_eq!(conn.pool_of("conn0.tab0").len(), 1);
		assert!(tab.sheets.sheet_form(&tab, "missing").is_none());
	}

	#[tokio::test]
	async fn test_failed_enable_is_retried() {
		let target = MockTarget::with_responder(|_, _| MockReply::error("CSS agent disabled"));
		let (_conn, tab) = tab_fixture(&target);
		assert!(tab.sheets.ensure_enabled(&tab.rpc).await.is_err());

		target.set_responder(|_, _| MockReply::ok());
		tab.sheets.ensure_enabled(&tab.rpc).await.unwrap();
		assert_eq!(target.methods(), ["DOM.enable", "DOM.enable", "CSS.enable"]);
	}
}
