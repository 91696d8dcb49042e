//! The web console: cached and live console messages, page errors and
//! expression evaluation.

use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use bridge_protocol::Packet;
use bridge_protocol::target::{ConsoleApiCalled, EvaluateResult, ExceptionThrown, StackTrace};
use bridge_runtime::{Actor, ActorSpec, Connection, Error, Result, Subscription, parse_request};
use futures_util::future::join_all;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::context::TabContext;
use crate::grips::GripScope;
use crate::thread::FrameActor;

pub static CONSOLE_SPEC: ActorSpec = ActorSpec {
	type_name: "console",
	requests: &[
		"startListeners",
		"stopListeners",
		"getCachedMessages",
		"clearMessagesCache",
		"evaluateJS",
	],
	events: &["consoleAPICall", "pageError"],
};

const CONSOLE_API: &str = "ConsoleAPI";
const PAGE_ERROR: &str = "PageError";

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
enum ConsoleRequest {
	StartListeners {
		#[serde(default)]
		listeners: Vec<String>,
	},
	StopListeners {
		#[serde(default)]
		listeners: Vec<String>,
	},
	GetCachedMessages {
		#[serde(default)]
		message_types: Vec<String>,
	},
	ClearMessagesCache,
	#[serde(rename = "evaluateJS")]
	EvaluateJs {
		text: String,
		#[serde(default)]
		frame_actor: Option<String>,
	},
}

/// A raw target notification waiting to be mapped.
enum Raw {
	ConsoleApi(Value),
	PageError(Value),
}

#[derive(Default)]
struct ConsoleInner {
	listeners: HashSet<String>,
	/// Mapped messages tagged with `_type`, oldest first.
	cache: Vec<Value>,
	enabled: bool,
}

pub struct ConsoleActor {
	id: String,
	tab: Arc<TabContext>,
	inner: Mutex<ConsoleInner>,
	subscriptions: Mutex<Vec<Subscription>>,
}

impl std::fmt::Debug for ConsoleActor {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ConsoleActor")
			.field("id", &self.id)
			.field("cached", &self.inner.lock().cache.len())
			.finish()
	}
}

fn now_ms() -> f64 {
	SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|elapsed| elapsed.as_secs_f64() * 1000.0)
		.unwrap_or_default()
}

fn console_level(kind: &str) -> &str {
	match kind {
		"warning" => "warn",
		"startGroup" => "group",
		"startGroupCollapsed" => "groupCollapsed",
		"endGroup" => "groupEnd",
		other => other,
	}
}

/// `(filename, line, column, function)` of the innermost frame, 1-based.
fn origin(stack: Option<&StackTrace>) -> (String, u32, u32, String) {
	stack
		.and_then(|stack| stack.call_frames.first())
		.map_or_else(
			|| (String::new(), 0, 0, String::new()),
			|frame| {
				(
					frame.url.clone(),
					frame.line_number + 1,
					frame.column_number + 1,
					frame.function_name.clone(),
				)
			},
		)
}

impl ConsoleActor {
	/// Creates the actor and starts collecting messages in receipt order.
	pub fn new(id: String, tab: Arc<TabContext>) -> Arc<Self> {
		let actor = Arc::new(Self {
			id,
			tab,
			inner: Mutex::new(ConsoleInner::default()),
			subscriptions: Mutex::new(Vec::new()),
		});
		actor.start_worker();
		actor
	}

	fn start_worker(self: &Arc<Self>) {
		let Ok(handle) = tokio::runtime::Handle::try_current() else {
			tracing::warn!(console = %self.id, "no runtime, console messages disabled");
			return;
		};
		let (tx, mut rx) = mpsc::unbounded_channel::<Raw>();

		let api_tx = tx.clone();
		let api = self.tab.rpc.on("Runtime.consoleAPICalled", move |params| {
			let _ = api_tx.send(Raw::ConsoleApi(params.clone()));
		});
		let errors = self.tab.rpc.on("Runtime.exceptionThrown", move |params| {
			let _ = tx.send(Raw::PageError(params.clone()));
		});
		*self.subscriptions.lock() = vec![api, errors];

		let this: Weak<Self> = Arc::downgrade(self);
		handle.spawn(async move {
			while let Some(raw) = rx.recv().await {
				let Some(console) = this.upgrade() else { break };
				console.process(raw).await;
			}
		});
	}

	async fn process(&self, raw: Raw) {
		let mapped = match raw {
			Raw::ConsoleApi(params) => match ConsoleApiCalled::deserialize(&params) {
				Ok(call) => Ok((CONSOLE_API, self.map_console_call(call).await)),
				Err(e) => Err(e),
			},
			Raw::PageError(params) => match ExceptionThrown::deserialize(&params) {
				Ok(thrown) => Ok((PAGE_ERROR, self.map_page_error(thrown))),
				Err(e) => Err(e),
			},
		};
		match mapped {
			Ok((kind, message)) => self.record(kind, message),
			Err(e) => tracing::warn!(console = %self.id, error = %e, "dropping unmappable console message"),
		}
	}

	async fn map_console_call(&self, call: ConsoleApiCalled) -> Value {
		let scope = GripScope::new(Arc::clone(&self.tab), self.id.clone());
		let arguments = join_all(call.args.iter().map(|arg| scope.grip_with_preview(arg))).await;
		let (filename, line, column, function) = origin(call.stack_trace.as_ref());
		json!({
			"arguments": arguments,
			"level": console_level(&call.kind),
			"filename": filename,
			"lineNumber": line,
			"columnNumber": column,
			"functionName": function,
			"timeStamp": call.timestamp,
		})
	}

	fn map_page_error(&self, thrown: ExceptionThrown) -> Value {
		let scope = GripScope::new(Arc::clone(&self.tab), self.id.clone());
		let details = thrown.exception_details;
		let source = details
			.url
			.clone()
			.or_else(|| details.stack_trace.as_ref().and_then(|s| s.call_frames.first()).map(|f| f.url.clone()))
			.unwrap_or_default();
		json!({
			"errorMessage": scope.string(&details.message()),
			"sourceName": source,
			"lineNumber": details.line_number + 1,
			"columnNumber": details.column_number + 1,
			"category": "content javascript",
			"timeStamp": thrown.timestamp,
			"error": true,
			"warning": false,
			"exception": true,
			"strict": false,
		})
	}

	fn record(&self, kind: &'static str, message: Value) {
		let mut inner = self.inner.lock();
		let mut cached = message.clone();
		cached["_type"] = json!(kind);
		inner.cache.push(cached);
		if !inner.listeners.contains(kind) {
			return;
		}
		match kind {
			CONSOLE_API => self.tab.emit(&self.id, "consoleAPICall", json!({ "message": message })),
			_ => self.tab.emit(&self.id, "pageError", json!({ "pageError": message })),
		}
	}

	async fn start_listeners(&self, listeners: Vec<String>) -> Result<Value> {
		let started: Vec<String> = listeners
			.into_iter()
			.filter(|listener| matches!(listener.as_str(), CONSOLE_API | PAGE_ERROR))
			.collect();
		let enable = {
			let mut inner = self.inner.lock();
			inner.listeners.extend(started.iter().cloned());
			!std::mem::replace(&mut inner.enabled, true)
		};
		if enable {
			if let Err(e) = self.tab.rpc.request("Runtime.enable", json!({})).await {
				self.inner.lock().enabled = false;
				return Err(e);
			}
		}
		Ok(json!({
			"startedListeners": started,
			"nativeConsoleAPI": true,
			"traits": {},
		}))
	}

	async fn evaluate(&self, conn: &Arc<Connection>, text: String, frame_actor: Option<String>) -> Result<Value> {
		let (result, scope): (EvaluateResult, GripScope) = match frame_actor {
			Some(frame) => {
				let frame = conn
					.get_typed::<FrameActor>(&frame)
					.ok_or_else(|| Error::NoSuchActor(frame.clone()))?;
				let result = self
					.tab
					.rpc
					.request_as(
						"Debugger.evaluateOnCallFrame",
						json!({ "callFrameId": frame.call_frame_id(), "expression": text, "includeCommandLineAPI": true }),
					)
					.await?;
				(result, frame.scope())
			}
			None => {
				let result = self
					.tab
					.rpc
					.request_as(
						"Runtime.evaluate",
						json!({ "expression": text, "includeCommandLineAPI": true, "userGesture": true }),
					)
					.await?;
				(result, GripScope::new(Arc::clone(&self.tab), self.id.clone()))
			}
		};

		let mut reply = json!({
			"input": text,
			"timestamp": now_ms(),
			"exception": null,
			"exceptionMessage": null,
			"helperResult": null,
		});
		if result.threw() {
			let details = result.exception_details.clone().unwrap_or_default();
			let thrown = details.exception.as_ref().unwrap_or(&result.result);
			reply["result"] = json!({ "type": "undefined" });
			reply["exception"] = scope.grip_with_preview(thrown).await;
			reply["exceptionMessage"] = scope.string(&details.message());
		} else {
			reply["result"] = scope.grip_with_preview(&result.result).await;
		}
		Ok(reply)
	}
}

#[async_trait]
impl Actor for ConsoleActor {
	fn actor_id(&self) -> &str {
		&self.id
	}

	fn spec(&self) -> &'static ActorSpec {
		&CONSOLE_SPEC
	}

	async fn handle(&self, conn: &Arc<Connection>, packet: Packet) -> Result<Value> {
		match parse_request::<ConsoleRequest>(&packet)? {
			ConsoleRequest::StartListeners { listeners } => self.start_listeners(listeners).await,
			ConsoleRequest::StopListeners { listeners } => {
				let mut inner = self.inner.lock();
				let stopped: Vec<String> = listeners
					.into_iter()
					.filter(|listener| inner.listeners.remove(listener))
					.collect();
				Ok(json!({ "stoppedListeners": stopped }))
			}
			ConsoleRequest::GetCachedMessages { message_types } => {
				let inner = self.inner.lock();
				let messages: Vec<&Value> = inner
					.cache
					.iter()
					.filter(|message| {
						let kind = message["_type"].as_str().unwrap_or_default();
						message_types.iter().any(|wanted| wanted == kind)
					})
					.collect();
				Ok(json!({ "messages": messages }))
			}
			ConsoleRequest::ClearMessagesCache => {
				self.inner.lock().cache.clear();
				self.tab.rpc.request("Runtime.discardConsoleEntries", json!({})).await?;
				Ok(json!({}))
			}
			ConsoleRequest::EvaluateJs { text, frame_actor } => self.evaluate(conn, text, frame_actor).await,
		}
	}

	fn on_unmanaged(&self) {
		self.subscriptions.lock().clear();
	}
}
