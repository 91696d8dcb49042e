//! The JavaScript thread: attach, pause and resume, frames and sources.
//!
//! The front-end expects a paused thread right after `attach`, so attaching
//! asks the target to pause and answers with a synthetic `attached` pause
//! without waiting for it. The native pause that eventually answers is
//! absorbed into that pause, or silently resumed if the client resumed
//! first.
//!
//! Events raised while an `attach` or `resume` request is in flight are held
//! back and sent after its reply, so the client never sees a pause before
//! the resume that preceded it.

pub mod frame;
pub mod source;
pub mod stack;

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use bridge_protocol::Packet;
use bridge_protocol::target::{CallFrame, PausedEvent, RemoteObject, ScriptParsed};
use bridge_runtime::{Actor, ActorSpec, Connection, Error, Result, Subscription, parse_request};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};

pub use frame::FrameActor;
pub use source::{BreakpointActor, Breakpoints, SourceActor};
use stack::Stack;

use crate::context::TabContext;
use crate::grips::GripScope;

pub static THREAD_SPEC: ActorSpec = ActorSpec {
	type_name: "thread",
	requests: &[
		"attach",
		"resume",
		"reconfigure",
		"frames",
		"sources",
		"interrupt",
		"pauseOnExceptions",
		"detach",
	],
	events: &["paused", "resumed", "exited", "newSource"],
};

pub static PAUSE_SPEC: ActorSpec = ActorSpec {
	type_name: "pause",
	requests: &[],
	events: &[],
};

/// Owner of every actor that is only valid during one pause.
#[derive(Debug)]
pub struct PauseActor {
	id: String,
}

#[async_trait]
impl Actor for PauseActor {
	fn actor_id(&self) -> &str {
		&self.id
	}

	fn spec(&self) -> &'static ActorSpec {
		&PAUSE_SPEC
	}

	async fn handle(&self, _conn: &Arc<Connection>, packet: Packet) -> Result<Value> {
		Err(Error::UnrecognizedPacketType {
			actor: packet.to,
			kind: packet.kind,
		})
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
	Detached,
	Attaching,
	Running,
	Paused,
	/// The target went away. Terminal.
	Exited,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
enum ThreadRequest {
	Attach,
	Resume {
		#[serde(default)]
		resume_limit: Option<ResumeLimit>,
		#[serde(default)]
		force_completion: Option<Value>,
	},
	Reconfigure,
	Frames {
		#[serde(default)]
		start: usize,
		#[serde(default)]
		count: Option<usize>,
	},
	Sources,
	Interrupt,
	PauseOnExceptions {
		#[serde(default)]
		pause_on_exceptions: bool,
		#[serde(default)]
		ignore_caught_exceptions: bool,
	},
	Detach,
}

#[derive(Deserialize)]
struct ResumeLimit {
	#[serde(rename = "type")]
	kind: String,
}

struct ThreadInner {
	state: ThreadState,
	/// The target itself is stopped, as opposed to the synthetic attach pause.
	native_paused: bool,
	/// A `Debugger.pause` sent by attach has not been answered yet.
	pending_pause: bool,
	interrupting: bool,
	stepping: bool,
	/// An attach or resume reply has not been sent yet.
	busy: bool,
	deferred: Vec<(&'static str, Value)>,
	pause_actor: Option<String>,
	stack: Stack<Arc<FrameActor>>,
	/// Script id to source actor, in parse order.
	sources: IndexMap<String, Arc<SourceActor>>,
}

impl ThreadInner {
	fn new() -> Self {
		Self {
			state: ThreadState::Detached,
			native_paused: false,
			pending_pause: false,
			interrupting: false,
			stepping: false,
			busy: false,
			deferred: Vec::new(),
			pause_actor: None,
			stack: Stack::default(),
			sources: IndexMap::new(),
		}
	}
}

pub struct ThreadActor {
	id: String,
	tab: Arc<TabContext>,
	this: Weak<Self>,
	inner: Mutex<ThreadInner>,
	breakpoints: Arc<Breakpoints>,
	subscriptions: Mutex<Vec<Subscription>>,
}

impl std::fmt::Debug for ThreadActor {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ThreadActor")
			.field("id", &self.id)
			.field("state", &self.inner.lock().state)
			.finish()
	}
}

fn step_method(limit: Option<&ResumeLimit>) -> Result<&'static str> {
	match limit.map(|limit| limit.kind.as_str()) {
		None => Ok("Debugger.resume"),
		Some("next") => Ok("Debugger.stepOver"),
		Some("step") => Ok("Debugger.stepInto"),
		Some("finish") => Ok("Debugger.stepOut"),
		Some(other) => Err(Error::InvalidArgument(format!("unknown resume limit {other:?}"))),
	}
}

impl ThreadActor {
	pub fn new(id: String, tab: Arc<TabContext>) -> Arc<Self> {
		Arc::new_cyclic(|this| Self {
			id,
			tab,
			this: this.clone(),
			inner: Mutex::new(ThreadInner::new()),
			breakpoints: Arc::new(Breakpoints::default()),
			subscriptions: Mutex::new(Vec::new()),
		})
	}

	pub fn state(&self) -> ThreadState {
		self.inner.lock().state
	}

	fn on_event<E: DeserializeOwned + 'static>(&self, method: &str, handler: fn(&Self, E)) -> Subscription {
		let this = self.this.clone();
		self.tab.rpc.on(method, move |params| {
			let Some(thread) = this.upgrade() else { return };
			match E::deserialize(params) {
				Ok(event) => handler(&thread, event),
				Err(e) => tracing::debug!(error = %e, "malformed debugger event"),
			}
		})
	}

	fn subscribe(&self) {
		let subscriptions = vec![
			self.on_event("Debugger.paused", Self::on_paused),
			self.on_event("Debugger.resumed", |thread, _: Value| thread.on_resumed()),
			self.on_event("Debugger.scriptParsed", Self::on_script_parsed),
			self.on_event("Debugger.globalObjectCleared", |thread, _: Value| thread.on_global_cleared()),
		];
		*self.subscriptions.lock() = subscriptions;
	}

	/// Sends an event now, or after the in-flight reply.
	fn emit_locked(&self, inner: &mut ThreadInner, kind: &'static str, body: Value) {
		if inner.busy {
			inner.deferred.push((kind, body));
		} else {
			self.tab.emit(&self.id, kind, body);
		}
	}

	fn new_pause(&self, conn: &Connection, inner: &mut ThreadInner) -> String {
		self.end_pause(conn, inner);
		let id = conn.alloc_id("pause");
		conn.manage(&self.id, Arc::new(PauseActor { id: id.clone() }));
		inner.pause_actor = Some(id.clone());
		id
	}

	fn end_pause(&self, conn: &Connection, inner: &mut ThreadInner) {
		if let Some(pause) = inner.pause_actor.take() {
			conn.unmanage(&pause);
		}
	}

	/// Diffs the native stack (youngest first) into the frame actors and
	/// returns the ids of frames that fell off.
	fn load_stack(&self, conn: &Connection, inner: &mut ThreadInner, native: Vec<CallFrame>, pool: &str) -> Vec<String> {
		let frames: Vec<CallFrame> = native.into_iter().rev().collect();
		let ids = frames.iter().map(|frame| frame.call_frame_id.clone()).collect();
		let expired = inner.stack.update(ids, |index, _| {
			let actor = Arc::new(FrameActor::new(
				conn.alloc_id("frame"),
				Arc::clone(&self.tab),
				frames[index].clone(),
				pool.to_string(),
			));
			conn.manage(&self.id, actor.clone());
			actor
		});
		for (index, (depth, actor)) in inner.stack.iter().enumerate() {
			let frame = &frames[index];
			let source = inner
				.sources
				.get(&frame.location.script_id)
				.map(|source| source.actor_id().to_string());
			actor.update(frame.clone(), depth, pool, source);
		}

		let popped: Vec<String> = expired.iter().map(|frame| frame.actor_id().to_string()).collect();
		for id in &popped {
			conn.unmanage(id);
		}
		popped
	}

	fn clear_stack(&self, conn: &Connection, inner: &mut ThreadInner) {
		for frame in inner.stack.clear() {
			conn.unmanage(frame.actor_id());
		}
	}

	fn pause_reason(&self, inner: &ThreadInner, event: &PausedEvent, pool: &str) -> Value {
		let actors: Vec<String> = event
			.hit_breakpoints
			.iter()
			.filter_map(|id| self.breakpoints.actor_for(id))
			.collect();
		if !actors.is_empty() {
			return json!({ "type": "breakpoint", "actors": actors });
		}
		if matches!(event.reason.as_str(), "exception" | "promiseRejection") {
			let scope = GripScope::new(Arc::clone(&self.tab), pool);
			let exception = event
				.data
				.clone()
				.and_then(|data| serde_json::from_value::<RemoteObject>(data).ok())
				.map_or_else(|| json!({ "type": "undefined" }), |object| scope.grip(&object));
			return json!({ "type": "exception", "exception": exception });
		}
		if inner.stepping {
			return json!({ "type": "resumeLimit" });
		}
		if inner.interrupting {
			return json!({ "type": "interrupted" });
		}
		json!({ "type": "debuggerStatement" })
	}

	fn on_paused(&self, event: PausedEvent) {
		let Ok(conn) = self.tab.conn() else { return };
		let mut inner = self.inner.lock();
		let state = inner.state;
		match state {
			ThreadState::Detached | ThreadState::Exited => {}
			ThreadState::Attaching | ThreadState::Paused => {
				// Answer to the attach pause: fold it into the current pause.
				if !inner.native_paused {
					inner.native_paused = true;
					inner.pending_pause = false;
					let pool = inner.pause_actor.clone().unwrap_or_default();
					self.load_stack(&conn, &mut inner, event.call_frames, &pool);
				}
			}
			ThreadState::Running => {
				let unsolicited = event.reason == "other" && event.hit_breakpoints.is_empty();
				if inner.pending_pause && !inner.interrupting && unsolicited {
					inner.pending_pause = false;
					drop(inner);
					self.cancel_pending_pause();
					return;
				}
				inner.pending_pause = false;
				inner.native_paused = true;

				let pause = self.new_pause(&conn, &mut inner);
				let why = self.pause_reason(&inner, &event, &pause);
				let popped = self.load_stack(&conn, &mut inner, event.call_frames, &pause);
				inner.stepping = false;
				inner.interrupting = false;
				inner.state = ThreadState::Paused;
				let frame = inner.stack.youngest().map(|frame| frame.form());
				tracing::debug!(thread = %self.id, why = %why["type"], "paused");
				self.emit_locked(
					&mut inner,
					"paused",
					json!({ "actor": pause, "why": why, "frame": frame, "poppedFrames": popped }),
				);
			}
		}
	}

	/// The client resumed before the attach pause arrived; let the target run.
	fn cancel_pending_pause(&self) {
		let Ok(handle) = tokio::runtime::Handle::try_current() else {
			return;
		};
		let rpc = self.tab.rpc.clone();
		handle.spawn(async move {
			if let Err(e) = rpc.request("Debugger.resume", json!({})).await {
				tracing::debug!(error = %e, "resuming stale attach pause failed");
			}
		});
	}

	fn on_resumed(&self) {
		let Ok(conn) = self.tab.conn() else { return };
		let mut inner = self.inner.lock();
		inner.native_paused = false;
		if inner.state == ThreadState::Paused {
			// Our own resumes leave Paused before the target reports them.
			inner.state = ThreadState::Running;
			self.end_pause(&conn, &mut inner);
			self.emit_locked(&mut inner, "resumed", json!({}));
		}
	}

	fn on_script_parsed(&self, script: ScriptParsed) {
		let Ok(conn) = self.tab.conn() else { return };
		let mut inner = self.inner.lock();
		if matches!(inner.state, ThreadState::Detached | ThreadState::Exited)
			|| inner.sources.contains_key(&script.script_id)
		{
			return;
		}
		let script_id = script.script_id.clone();
		let actor = Arc::new(SourceActor::new(
			conn.alloc_id("source"),
			Arc::clone(&self.tab),
			script,
			Arc::clone(&self.breakpoints),
		));
		conn.manage(&self.id, actor.clone());
		let form = actor.form();
		inner.sources.insert(script_id, actor);
		self.emit_locked(&mut inner, "newSource", json!({ "source": form }));
	}

	fn on_global_cleared(&self) {
		let Ok(conn) = self.tab.conn() else { return };
		let sources: Vec<Arc<SourceActor>> = self.inner.lock().sources.drain(..).map(|(_, source)| source).collect();
		for source in sources {
			conn.unmanage(source.actor_id());
		}
	}

	async fn attach(&self, conn: &Arc<Connection>) -> Result<Value> {
		{
			let mut inner = self.inner.lock();
			if inner.state != ThreadState::Detached {
				return Err(Error::WrongState(format!("cannot attach while {:?}", inner.state)));
			}
			inner.state = ThreadState::Attaching;
			inner.busy = true;
			inner.pending_pause = true;
			self.new_pause(conn, &mut inner);
		}
		self.subscribe();

		let enabled = async {
			self.tab.rpc.request("Debugger.enable", json!({})).await?;
			self.tab.rpc.request("Runtime.enable", json!({})).await?;
			self.tab.rpc.request("Debugger.pause", json!({})).await
		}
		.await;

		let mut inner = self.inner.lock();
		if let Err(e) = enabled {
			self.subscriptions.lock().clear();
			self.end_pause(conn, &mut inner);
			inner.state = ThreadState::Detached;
			inner.pending_pause = false;
			inner.deferred.clear();
			return Err(e);
		}
		if inner.state != ThreadState::Attaching {
			return Err(Error::WrongState(format!("thread {:?} during attach", inner.state)));
		}
		inner.state = ThreadState::Paused;
		let pause = inner.pause_actor.clone().unwrap_or_default();
		let mut reply = json!({ "type": "paused", "actor": pause, "why": { "type": "attached" } });
		if let Some(frame) = inner.stack.youngest() {
			reply["frame"] = frame.form();
		}
		tracing::debug!(thread = %self.id, "attached");
		Ok(reply)
	}

	async fn resume(&self, conn: &Arc<Connection>, limit: Option<ResumeLimit>, force: Option<Value>) -> Result<Value> {
		if force.is_some_and(|force| !force.is_null()) {
			return Err(Error::NotImplemented("forceCompletion".to_string()));
		}
		let method = step_method(limit.as_ref())?;
		let native = {
			let mut inner = self.inner.lock();
			if inner.state != ThreadState::Paused {
				return Err(Error::WrongState(format!("cannot resume while {:?}", inner.state)));
			}
			inner.state = ThreadState::Running;
			inner.busy = true;
			inner.stepping = limit.is_some() && inner.native_paused;
			self.end_pause(conn, &mut inner);
			inner.native_paused
		};
		if native {
			if let Err(e) = self.tab.rpc.request(method, json!({})).await {
				// The target never left the pause; take it back up.
				let mut inner = self.inner.lock();
				if inner.state == ThreadState::Running && inner.native_paused {
					inner.state = ThreadState::Paused;
					inner.stepping = false;
					self.new_pause(conn, &mut inner);
				}
				return Err(e);
			}
		}
		Ok(json!({ "type": "resumed" }))
	}

	fn frames(&self, start: usize, count: Option<usize>) -> Result<Value> {
		let inner = self.inner.lock();
		if inner.state != ThreadState::Paused {
			return Err(Error::WrongState("frames are only available while paused".to_string()));
		}
		let youngest_first: Vec<&Arc<FrameActor>> = inner.stack.iter().map(|(_, frame)| frame).rev().collect();
		let forms: Vec<Value> = youngest_first
			.into_iter()
			.skip(start)
			.take(count.unwrap_or(usize::MAX))
			.map(|frame| frame.form())
			.collect();
		Ok(json!({ "frames": forms }))
	}

	async fn interrupt(&self) -> Result<Value> {
		{
			let mut inner = self.inner.lock();
			if inner.state != ThreadState::Running {
				return Err(Error::WrongState(format!("cannot interrupt while {:?}", inner.state)));
			}
			inner.interrupting = true;
		}
		self.tab.rpc.request("Debugger.pause", json!({})).await?;
		Ok(json!({}))
	}

	async fn detach(&self, conn: &Arc<Connection>) -> Result<Value> {
		if matches!(self.state(), ThreadState::Detached | ThreadState::Exited) {
			return Err(Error::WrongState("thread is not attached".to_string()));
		}
		if let Err(e) = self.tab.rpc.request("Debugger.disable", json!({})).await {
			tracing::debug!(error = %e, "Debugger.disable failed");
		}
		self.reset(conn, ThreadState::Detached);
		Ok(json!({ "type": "detached" }))
	}

	fn reset(&self, conn: &Connection, state: ThreadState) {
		self.subscriptions.lock().clear();
		let mut inner = self.inner.lock();
		self.clear_stack(conn, &mut inner);
		self.end_pause(conn, &mut inner);
		inner.sources.clear();
		inner.deferred.clear();
		inner.state = state;
		inner.native_paused = false;
		inner.pending_pause = false;
		inner.stepping = false;
		inner.interrupting = false;
		drop(inner);
		conn.unmanage_children(&self.id);
	}

	/// The target is gone: tells an attached client and drops every child.
	pub fn exit(&self) {
		let Ok(conn) = self.tab.conn() else { return };
		let was = self.state();
		if matches!(was, ThreadState::Detached | ThreadState::Exited) {
			return;
		}
		self.reset(&conn, ThreadState::Exited);
		self.tab.emit(&self.id, "exited", json!({}));
	}
}

#[async_trait]
impl Actor for ThreadActor {
	fn actor_id(&self) -> &str {
		&self.id
	}

	fn spec(&self) -> &'static ActorSpec {
		&THREAD_SPEC
	}

	async fn handle(&self, conn: &Arc<Connection>, packet: Packet) -> Result<Value> {
		match parse_request::<ThreadRequest>(&packet)? {
			ThreadRequest::Attach => self.attach(conn).await,
			ThreadRequest::Resume {
				resume_limit,
				force_completion,
			} => self.resume(conn, resume_limit, force_completion).await,
			ThreadRequest::Reconfigure => Ok(json!({})),
			ThreadRequest::Frames { start, count } => self.frames(start, count),
			ThreadRequest::Sources => {
				let forms: Vec<Value> = self.inner.lock().sources.values().map(|source| source.form()).collect();
				Ok(json!({ "sources": forms }))
			}
			ThreadRequest::Interrupt => self.interrupt().await,
			ThreadRequest::PauseOnExceptions {
				pause_on_exceptions,
				ignore_caught_exceptions,
			} => {
				let state = match (pause_on_exceptions, ignore_caught_exceptions) {
					(false, _) => "none",
					(true, true) => "uncaught",
					(true, false) => "all",
				};
				self.tab
					.rpc
					.request("Debugger.setPauseOnExceptions", json!({ "state": state }))
					.await?;
				Ok(json!({}))
			}
			ThreadRequest::Detach => self.detach(conn).await,
		}
	}

	fn on_replied(&self, _conn: &Arc<Connection>, kind: &str) {
		if !matches!(kind, "attach" | "resume") {
			return;
		}
		let mut inner = self.inner.lock();
		inner.busy = false;
		for (kind, body) in std::mem::take(&mut inner.deferred) {
			self.tab.emit(&self.id, kind, body);
		}
	}

	fn on_unmanaged(&self) {
		self.subscriptions.lock().clear();
	}
}
