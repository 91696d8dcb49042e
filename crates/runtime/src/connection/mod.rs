//! Front-end connection: actor registry and packet dispatch.
//!
//! A [`Connection`] owns every actor addressable by one front-end client.
//! Actors live in pools keyed by the id of the actor that manages them;
//! unmanaging an actor also unmanages everything in its pool, which is the
//! only way actors are destroyed.
//!
//! # Packet flow
//!
//! 1. The transport reader forwards each inbound packet to [`Connection::run`]
//! 2. `run` appends the packet to the addressed actor's FIFO queue, so one
//!    actor sees its packets in order while different actors proceed
//!    concurrently
//! 3. The queue worker calls [`Connection::dispatch`], which resolves the
//!    actor, checks the packet type against its [`ActorSpec`] and awaits
//!    [`Actor::handle`]
//! 4. The reply (or `{from, error, message}`) goes to the writer task

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bridge_protocol::packet::{self, ErrorReply};
use bridge_protocol::Packet;
use dashmap::DashMap;
use indexmap::IndexSet;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc;

use crate::actor::{Actor, ActorSpec};
use crate::error::{Error, Result};
use crate::transport::TransportParts;

/// Id of the connection's root actor.
pub const ROOT_ID: &str = "root";

/// Builds a lazily-instantiated actor from its pre-allocated id.
///
/// Factories run while the registry is locked and must not call back into
/// the connection's registry methods.
pub type LazyFactory = Box<dyn FnOnce(String) -> Arc<dyn Actor> + Send>;

struct ActorEntry {
	actor: Arc<dyn Actor>,
	parent: String,
}

struct LazyEntry {
	parent: String,
	factory: LazyFactory,
}

#[derive(Default)]
struct Registry {
	actors: HashMap<String, ActorEntry>,
	/// Owner id to the ids it manages, in insertion order.
	pools: HashMap<String, IndexSet<String>>,
	lazy: HashMap<String, LazyEntry>,
}

impl Registry {
	fn insert(&mut self, parent: &str, actor: Arc<dyn Actor>) {
		let id = actor.actor_id().to_string();
		let entry = ActorEntry {
			actor,
			parent: parent.to_string(),
		};
		if let Some(previous) = self.actors.insert(id.clone(), entry) {
			if previous.parent != parent {
				if let Some(pool) = self.pools.get_mut(&previous.parent) {
					pool.shift_remove(&id);
				}
			}
		}
		self.pools.entry(parent.to_string()).or_default().insert(id);
	}

	/// Removes `id` and everything it transitively manages.
	fn remove_tree(&mut self, id: &str, removed: &mut Vec<Arc<dyn Actor>>, ids: &mut Vec<String>) {
		let mut stack = vec![id.to_string()];
		while let Some(current) = stack.pop() {
			if let Some(entry) = self.actors.remove(&current) {
				if let Some(pool) = self.pools.get_mut(&entry.parent) {
					pool.shift_remove(&current);
				}
				removed.push(entry.actor);
			}
			self.lazy.retain(|_, lazy| lazy.parent != current);
			if let Some(children) = self.pools.remove(&current) {
				stack.extend(children.into_iter().rev());
			}
			ids.push(current);
		}
	}
}

/// One front-end client's actor registry.
pub struct Connection {
	prefix: String,
	last_id: AtomicU64,
	registry: Mutex<Registry>,
	root: Mutex<Option<Arc<dyn Actor>>>,
	outbound_tx: mpsc::UnboundedSender<Value>,
	outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<Value>>>,
	queues: DashMap<String, mpsc::UnboundedSender<Value>>,
}

impl std::fmt::Debug for Connection {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Connection")
			.field("prefix", &self.prefix)
			.field("actors", &self.registry.lock().actors.len())
			.finish()
	}
}

impl Connection {
	/// Creates a connection whose actor ids start with `prefix`, e.g. `conn0.`.
	pub fn new(prefix: impl Into<String>) -> Arc<Self> {
		let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
		Arc::new(Self {
			prefix: prefix.into(),
			last_id: AtomicU64::new(0),
			registry: Mutex::new(Registry::default()),
			root: Mutex::new(None),
			outbound_tx,
			outbound_rx: Mutex::new(Some(outbound_rx)),
			queues: DashMap::new(),
		})
	}

	pub fn prefix(&self) -> &str {
		&self.prefix
	}

	pub fn set_root(&self, root: Arc<dyn Actor>) {
		*self.root.lock() = Some(root);
	}

	pub fn root(&self) -> Option<Arc<dyn Actor>> {
		self.root.lock().clone()
	}

	/// Returns a fresh id such as `conn0.tab3`. Ids are never reused.
	pub fn alloc_id(&self, prefix: &str) -> String {
		let n = self.last_id.fetch_add(1, Ordering::SeqCst) + 1;
		format!("{}{}{}", self.prefix, prefix, n)
	}

	/// Places `actor` in the pool owned by `parent`, moving it out of any
	/// pool it was in before.
	pub fn manage(&self, parent: &str, actor: Arc<dyn Actor>) {
		tracing::trace!(parent, actor = actor.actor_id(), "manage");
		self.registry.lock().insert(parent, actor);
	}

	/// Registers a factory for an actor that is built on first address.
	/// Returns the id the actor will have.
	pub fn lazy(&self, parent: &str, prefix: &str, factory: LazyFactory) -> String {
		let id = self.alloc_id(prefix);
		self.registry.lock().lazy.insert(
			id.clone(),
			LazyEntry {
				parent: parent.to_string(),
				factory,
			},
		);
		id
	}

	/// Removes `id` and every actor it manages.
	pub fn unmanage(&self, id: &str) {
		let (removed, ids) = {
			let mut registry = self.registry.lock();
			let mut removed = Vec::new();
			let mut ids = Vec::new();
			registry.remove_tree(id, &mut removed, &mut ids);
			(removed, ids)
		};
		self.finish_removal(removed, ids);
	}

	/// Removes every actor managed by `owner`, keeping `owner` itself.
	pub fn unmanage_children(&self, owner: &str) {
		let (removed, ids) = {
			let mut registry = self.registry.lock();
			let children: Vec<String> = registry
				.pools
				.get(owner)
				.map(|pool| pool.iter().cloned().collect())
				.unwrap_or_default();
			registry.lazy.retain(|_, lazy| lazy.parent != owner);
			let mut removed = Vec::new();
			let mut ids = Vec::new();
			for child in children {
				registry.remove_tree(&child, &mut removed, &mut ids);
			}
			(removed, ids)
		};
		self.finish_removal(removed, ids);
	}

	fn finish_removal(&self, removed: Vec<Arc<dyn Actor>>, ids: Vec<String>) {
		for id in &ids {
			self.queues.remove(id);
		}
		for actor in removed {
			tracing::trace!(actor = actor.actor_id(), "unmanaged");
			actor.on_unmanaged();
		}
	}

	/// Resolves an id: a managed actor, else a pending lazy factory (run at
	/// most once), else the root actor for `"root"`.
	pub fn get_actor(&self, id: &str) -> Option<Arc<dyn Actor>> {
		{
			let mut registry = self.registry.lock();
			if let Some(entry) = registry.actors.get(id) {
				return Some(Arc::clone(&entry.actor));
			}
			if let Some(lazy) = registry.lazy.remove(id) {
				let actor = (lazy.factory)(id.to_string());
				registry.insert(&lazy.parent, Arc::clone(&actor));
				return Some(actor);
			}
		}
		if id == ROOT_ID {
			return self.root();
		}
		None
	}

	/// Resolves an id to a concrete actor type.
	pub fn get_typed<T: Actor>(&self, id: &str) -> Option<Arc<T>> {
		self.get_actor(id)?.downcast_arc::<T>().ok()
	}

	/// True if `id` is currently managed (lazy entries and root excluded).
	pub fn has_actor(&self, id: &str) -> bool {
		self.registry.lock().actors.contains_key(id)
	}

	fn is_addressable(&self, id: &str) -> bool {
		if id == ROOT_ID {
			return true;
		}
		let registry = self.registry.lock();
		registry.actors.contains_key(id) || registry.lazy.contains_key(id)
	}

	/// Ids managed by `owner`, in insertion order.
	pub fn pool_of(&self, owner: &str) -> Vec<String> {
		self.registry
			.lock()
			.pools
			.get(owner)
			.map(|pool| pool.iter().cloned().collect())
			.unwrap_or_default()
	}

	/// Queues a packet for the front-end.
	pub fn send(&self, packet: Value) {
		if self.outbound_tx.send(packet).is_err() {
			tracing::debug!("front-end writer gone, dropping packet");
		}
	}

	/// Sends an unsolicited event packet `{from, type, ...body}`.
	pub fn emit(&self, from: &str, kind: &str, body: Value) {
		tracing::debug!(from, kind, "event");
		self.send(packet::event(from, kind, body));
	}

	/// Dispatches one raw packet and returns the reply.
	pub async fn dispatch(self: &Arc<Self>, raw: Value) -> Value {
		self.dispatch_inner(raw).await.0
	}

	/// Dispatches one raw packet, sends the reply and runs the actor's
	/// [`Actor::on_replied`] hook.
	pub async fn serve(self: &Arc<Self>, raw: Value) {
		let (reply, handled) = self.dispatch_inner(raw).await;
		self.send(reply);
		if let Some((actor, kind)) = handled {
			actor.on_replied(self, &kind);
		}
	}

	async fn dispatch_inner(self: &Arc<Self>, raw: Value) -> (Value, Option<(Arc<dyn Actor>, String)>) {
		let Some(to) = raw.get("to").and_then(Value::as_str).map(str::to_string) else {
			let error = Error::InvalidArgument("packet has no `to` field".to_string());
			return (error_reply(ROOT_ID, &error), None);
		};
		let Some(packet) = Packet::from_value(raw) else {
			let error = Error::InvalidArgument("packet has no `type` field".to_string());
			return (error_reply(&to, &error), None);
		};
		let Some(actor) = self.get_actor(&to) else {
			return (error_reply(&to, &Error::NoSuchActor(to.clone())), None);
		};

		tracing::debug!(to = %packet.to, kind = %packet.kind, "dispatching packet");
		let from = actor.actor_id().to_string();
		let kind = packet.kind.clone();
		let reply = match self.handle(Arc::clone(&actor), packet).await {
			Ok(body) => packet::reply(&from, body),
			Err(e) => {
				tracing::debug!(from = %from, error = %e, "request failed");
				error_reply(&from, &e)
			}
		};
		(reply, Some((actor, kind)))
	}

	async fn handle(self: &Arc<Self>, actor: Arc<dyn Actor>, packet: Packet) -> Result<Value> {
		let spec: &ActorSpec = actor.spec();
		if packet.kind == "requestTypes" {
			return Ok(json!({ "requestTypes": spec.requests }));
		}
		if !spec.handles(&packet.kind) {
			return Err(Error::UnrecognizedPacketType {
				actor: packet.to,
				kind: packet.kind,
			});
		}
		actor.handle(self, packet).await
	}

	/// Serves the front-end until its transport closes.
	///
	/// The caller sends the greeting before calling `run`; it is the first
	/// packet written.
	pub async fn run(self: &Arc<Self>, parts: TransportParts) -> Result<()> {
		let TransportParts {
			mut sender,
			mut receiver,
			mut message_rx,
		} = parts;
		let mut outbound_rx = self
			.outbound_rx
			.lock()
			.take()
			.ok_or_else(|| Error::ProtocolError("connection is already running".to_string()))?;

		let reader_handle = tokio::spawn(async move { receiver.run().await });
		let writer_handle = tokio::spawn(async move {
			while let Some(packet) = outbound_rx.recv().await {
				if let Err(e) = sender.send(packet).await {
					tracing::warn!(error = %e, "front-end write failed");
					break;
				}
			}
		});

		while let Some(raw) = message_rx.recv().await {
			self.enqueue(raw);
		}

		self.shutdown();
		writer_handle.abort();
		match reader_handle.await {
			Ok(result) => result,
			Err(e) => Err(Error::TransportError(format!("reader task failed: {e}"))),
		}
	}

	fn enqueue(self: &Arc<Self>, raw: Value) {
		let to = raw.get("to").and_then(Value::as_str).map(str::to_string);
		let Some(to) = to.filter(|to| self.is_addressable(to)) else {
			let conn = Arc::clone(self);
			tokio::spawn(async move { conn.serve(raw).await });
			return;
		};

		let queue = self
			.queues
			.entry(to)
			.or_insert_with(|| spawn_queue(Arc::downgrade(self)))
			.clone();
		if let Err(mpsc::error::SendError(raw)) = queue.send(raw) {
			tracing::debug!(packet = %raw, "actor queue closed, dropping packet");
		}
	}

	/// Takes the outbound packet stream so tests can read replies and
	/// events without a transport.
	#[cfg(any(test, feature = "testing"))]
	pub fn take_outbound(&self) -> Option<mpsc::UnboundedReceiver<Value>> {
		self.outbound_rx.lock().take()
	}

	/// Unmanages every actor; called when the front-end disconnects.
	pub fn shutdown(&self) {
		let removed: Vec<Arc<dyn Actor>> = {
			let mut registry = self.registry.lock();
			registry.lazy.clear();
			registry.pools.clear();
			registry.actors.drain().map(|(_, entry)| entry.actor).collect()
		};
		self.queues.clear();
		for actor in removed {
			actor.on_unmanaged();
		}
		if let Some(root) = self.root.lock().take() {
			root.on_unmanaged();
		}
	}
}

fn spawn_queue(conn: Weak<Connection>) -> mpsc::UnboundedSender<Value> {
	let (tx, mut rx) = mpsc::unbounded_channel::<Value>();
	tokio::spawn(async move {
		while let Some(raw) = rx.recv().await {
			let Some(conn) = conn.upgrade() else { break };
			conn.serve(raw).await;
		}
	});
	tx
}

/// Builds `{from, error, message}` for a failed request.
pub fn error_reply(from: &str, error: &Error) -> Value {
	serde_json::to_value(ErrorReply {
		from: from.to_string(),
		error: error.code().to_string(),
		message: error.to_string(),
	})
	.unwrap_or_else(|_| json!({ "from": from, "error": error.code() }))
}
