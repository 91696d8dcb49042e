//! One debuggable page: attach/detach, navigation and the per-attach actors.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bridge_protocol::Packet;
use bridge_protocol::target::TargetDescriptor;
use bridge_runtime::{Actor, ActorSpec, Connection, Result, RpcClient, Subscription, parse_request};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::console::ConsoleActor;
use crate::context::TabContext;
use crate::inspector::InspectorActor;
use crate::options::BridgeOptions;
use crate::styles::StyleSheetsActor;
use crate::thread::ThreadActor;
use crate::url;

pub static TAB_SPEC: ActorSpec = ActorSpec {
	type_name: "tab",
	requests: &["attach", "detach", "navigateTo", "reload"],
	events: &["tabNavigated", "tabDetached"],
};

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum TabRequest {
	Attach,
	Detach,
	NavigateTo {
		url: String,
	},
	Reload {
		#[serde(default)]
		options: ReloadOptions,
	},
}

#[derive(Deserialize, Default)]
struct ReloadOptions {
	#[serde(default)]
	force: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageFrame {
	id: String,
	#[serde(default)]
	parent_id: Option<String>,
	#[serde(default)]
	url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FrameTree {
	frame: PageFrame,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FrameTreeResult {
	frame_tree: FrameTree,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FrameStartedLoading {
	frame_id: String,
}

#[derive(Deserialize)]
struct FrameNavigated {
	frame: PageFrame,
}

/// Ids of the actors created on first address.
struct LazyIds {
	console: String,
	inspector: String,
	stylesheets: String,
}

struct TabInner {
	descriptor: TargetDescriptor,
	context: Arc<TabContext>,
	lazy: LazyIds,
	thread: Option<Arc<ThreadActor>>,
	main_frame: Option<String>,
	subscriptions: Vec<Subscription>,
}

pub struct TabActor {
	id: String,
	rpc: RpcClient,
	options: BridgeOptions,
	this: Weak<TabActor>,
	inner: Mutex<TabInner>,
}

impl std::fmt::Debug for TabActor {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TabActor")
			.field("id", &self.id)
			.field("url", &self.inner.lock().descriptor.url)
			.finish()
	}
}

fn register_lazy(conn: &Connection, tab_id: &str, context: &Arc<TabContext>) -> LazyIds {
	let console_ctx = Arc::clone(context);
	let inspector_ctx = Arc::clone(context);
	let sheets_ctx = Arc::clone(context);
	LazyIds {
		console: conn.lazy(tab_id, "console", Box::new(move |id| ConsoleActor::new(id, console_ctx))),
		inspector: conn.lazy(
			tab_id,
			"inspector",
			Box::new(move |id| Arc::new(InspectorActor::new(id, inspector_ctx))),
		),
		stylesheets: conn.lazy(
			tab_id,
			"stylesheets",
			Box::new(move |id| Arc::new(StyleSheetsActor::new(id, sheets_ctx))),
		),
	}
}

impl TabActor {
	/// Builds a detached tab for `descriptor`, talking to the target through `rpc`.
	pub fn new(
		id: String,
		descriptor: TargetDescriptor,
		rpc: RpcClient,
		options: BridgeOptions,
		conn: &Arc<Connection>,
	) -> Arc<Self> {
		let context = TabContext::new(id.clone(), rpc.clone(), options.clone(), conn);
		let lazy = register_lazy(conn, &id, &context);
		Arc::new_cyclic(|this| Self {
			id,
			rpc,
			options,
			this: this.clone(),
			inner: Mutex::new(TabInner {
				descriptor,
				context,
				lazy,
				thread: None,
				main_frame: None,
				subscriptions: Vec::new(),
			}),
		})
	}

	pub fn is_attached(&self) -> bool {
		self.inner.lock().thread.is_some()
	}

	/// Refreshes title and url from a newer listing entry.
	pub fn update_descriptor(&self, descriptor: TargetDescriptor) {
		self.inner.lock().descriptor = descriptor;
	}

	pub fn form(&self) -> Value {
		let inner = self.inner.lock();
		json!({
			"actor": self.id,
			"title": inner.descriptor.title,
			"url": inner.descriptor.url,
			"consoleActor": inner.lazy.console,
			"inspectorActor": inner.lazy.inspector,
			"styleSheetsActor": inner.lazy.stylesheets,
		})
	}

	fn attached_reply(&self, thread: &str) -> Value {
		json!({
			"type": "tabAttached",
			"threadActor": thread,
			"cacheDisabled": false,
			"javascriptEnabled": true,
			"traits": {},
		})
	}

	async fn attach(&self, conn: &Arc<Connection>) -> Result<Value> {
		let existing = self.inner.lock().thread.as_ref().map(|thread| thread.actor_id().to_string());
		if let Some(thread) = existing {
			return Ok(self.attached_reply(&thread));
		}

		self.rpc.request("Page.enable", json!({})).await?;
		let tree: FrameTreeResult = self.rpc.request_as("Page.getFrameTree", json!({})).await?;

		let subscriptions = vec![
			self.on_page("Page.frameStartedLoading", Self::on_frame_started_loading),
			self.on_page("Page.frameNavigated", Self::on_frame_navigated),
			self.on_page("Page.loadEventFired", Self::on_load_event_fired),
			self.on_transport_close(),
		];

		let mut inner = self.inner.lock();
		if let Some(thread) = &inner.thread {
			// Lost a race with a concurrent attach.
			return Ok(self.attached_reply(thread.actor_id()));
		}
		let thread = ThreadActor::new(conn.alloc_id("thread"), Arc::clone(&inner.context));
		conn.manage(&self.id, Arc::clone(&thread) as Arc<dyn Actor>);
		let reply = self.attached_reply(thread.actor_id());
		inner.thread = Some(thread);
		inner.main_frame = Some(tree.frame_tree.frame.id);
		if !tree.frame_tree.frame.url.is_empty() {
			inner.descriptor.url = tree.frame_tree.frame.url;
		}
		inner.subscriptions = subscriptions;
		tracing::debug!(tab = %self.id, "attached");
		Ok(reply)
	}

	fn on_page<E: serde::de::DeserializeOwned + 'static>(&self, method: &str, handler: fn(&Self, E)) -> Subscription {
		let this = self.this.clone();
		let name = method.to_string();
		self.rpc.on(method, move |params| {
			let Some(tab) = this.upgrade() else { return };
			match E::deserialize(params) {
				Ok(event) => handler(&tab, event),
				Err(e) => tracing::debug!(tab = %tab.id, method = %name, error = %e, "ignoring malformed event"),
			}
		})
	}

	fn on_transport_close(&self) -> Subscription {
		let this = self.this.clone();
		self.rpc.on_close(move || {
			if let Some(tab) = this.upgrade() {
				tab.transport_lost();
			}
		})
	}

	fn is_main_frame(&self, frame_id: &str) -> bool {
		self.inner.lock().main_frame.as_deref() == Some(frame_id)
	}

	fn on_frame_started_loading(&self, event: FrameStartedLoading) {
		if !self.is_main_frame(&event.frame_id) {
			return;
		}
		let url = self.inner.lock().descriptor.url.clone();
		self.emit_navigated("start", &url, None);
	}

	fn on_frame_navigated(&self, event: FrameNavigated) {
		if event.frame.parent_id.is_some() {
			return;
		}
		let mut inner = self.inner.lock();
		if !url::same_document(&inner.descriptor.url, &event.frame.url) {
			tracing::debug!(tab = %self.id, url = %event.frame.url, "main frame navigated");
		}
		inner.main_frame = Some(event.frame.id);
		inner.descriptor.url = url::normalize(&event.frame.url).to_string();
	}

	fn on_load_event_fired(&self, _: Value) {
		let Some(tab) = self.this.upgrade() else { return };
		tokio::spawn(async move {
			let title = tab
				.rpc
				.request("Runtime.evaluate", json!({ "expression": "document.title", "returnByValue": true }))
				.await
				.ok()
				.and_then(|reply| reply["result"]["value"].as_str().map(str::to_string));
			let (url, title) = {
				let mut inner = tab.inner.lock();
				if let Some(title) = title {
					inner.descriptor.title = title;
				}
				(inner.descriptor.url.clone(), inner.descriptor.title.clone())
			};
			tab.emit_navigated("stop", &url, Some(&title));
		});
	}

	fn emit_navigated(&self, state: &str, url: &str, title: Option<&str>) {
		let context = Arc::clone(&self.inner.lock().context);
		let mut body = json!({
			"state": state,
			"url": url,
			"nativeConsoleAPI": true,
		});
		if let Some(title) = title {
			body["title"] = json!(title);
		}
		context.emit(&self.id, "tabNavigated", body);
	}

	fn transport_lost(&self) {
		let (thread, context) = {
			let inner = self.inner.lock();
			(inner.thread.clone(), Arc::clone(&inner.context))
		};
		let Some(thread) = thread else { return };
		tracing::info!(tab = %self.id, "target connection lost");
		thread.exit();
		context.emit(&self.id, "tabDetached", json!({}));
		if let Ok(conn) = context.conn() {
			self.reset(&conn);
		}
	}

	/// Drops every per-attach actor and starts a fresh context.
	fn reset(&self, conn: &Arc<Connection>) {
		let old = {
			let mut inner = self.inner.lock();
			inner.thread = None;
			inner.main_frame = None;
			std::mem::take(&mut inner.subscriptions)
		};
		drop(old);
		conn.unmanage_children(&self.id);
		let context = TabContext::new(self.id.clone(), self.rpc.clone(), self.options.clone(), conn);
		let lazy = register_lazy(conn, &self.id, &context);
		let mut inner = self.inner.lock();
		inner.context = context;
		inner.lazy = lazy;
	}
}

#[async_trait]
impl Actor for TabActor {
	fn actor_id(&self) -> &str {
		&self.id
	}

	fn spec(&self) -> &'static ActorSpec {
		&TAB_SPEC
	}

	async fn handle(&self, conn: &Arc<Connection>, packet: Packet) -> Result<Value> {
		match parse_request::<TabRequest>(&packet)? {
			TabRequest::Attach => self.attach(conn).await,
			TabRequest::Detach => {
				if self.is_attached() {
					self.reset(conn);
				}
				self.rpc.disconnect();
				Ok(json!({ "type": "detached" }))
			}
			TabRequest::NavigateTo { url } => {
				self.rpc.request("Page.navigate", json!({ "url": url })).await?;
				Ok(json!({}))
			}
			TabRequest::Reload { options } => {
				self.rpc.request("Page.reload", json!({ "ignoreCache": options.force })).await?;
				Ok(json!({}))
			}
		}
	}

	fn on_unmanaged(&self) {
		{
			let mut inner = self.inner.lock();
			inner.subscriptions.clear();
			inner.thread = None;
		}
		self.rpc.disconnect();
	}
}
