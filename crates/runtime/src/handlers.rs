//! Event handler maps and RAII subscriptions.
//!
//! Handlers are stored in an [`IndexMap`] so removal is O(1) and dispatch
//! follows registration order. Handlers run synchronously on the task that
//! received the event, which keeps event processing in receipt order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;

/// Unique identifier for event handlers.
pub type HandlerId = u64;

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Returns a new globally-unique handler ID.
pub fn next_handler_id() -> HandlerId {
	NEXT_HANDLER_ID.fetch_add(1, Ordering::SeqCst)
}

/// Handler function receiving a borrowed event.
pub type HandlerFn<E> = Arc<dyn Fn(&E) + Send + Sync>;

/// Event handler entry with metadata `M`.
///
/// The RPC client stores the subscribed method name as `M`.
pub struct HandlerEntry<E, M = ()> {
	pub id: HandlerId,
	pub meta: M,
	pub handler: HandlerFn<E>,
}

impl<E, M: Clone> Clone for HandlerEntry<E, M> {
	fn clone(&self) -> Self {
		Self {
			id: self.id,
			meta: self.meta.clone(),
			handler: Arc::clone(&self.handler),
		}
	}
}

/// Handler storage: [`IndexMap`] for O(1) removal with stable insertion order.
pub type HandlerMap<E, M = ()> = Arc<Mutex<IndexMap<HandlerId, HandlerEntry<E, M>>>>;

/// Creates an empty handler map.
pub fn handler_map<E, M>() -> HandlerMap<E, M> {
	Arc::new(Mutex::new(IndexMap::new()))
}

/// Registers `handler` and returns the subscription that removes it.
pub fn subscribe<E, M>(handlers: &HandlerMap<E, M>, meta: M, handler: HandlerFn<E>) -> Subscription
where
	E: Send + Sync + 'static,
	M: Send + Sync + 'static,
{
	let id = next_handler_id();
	handlers.lock().insert(id, HandlerEntry { id, meta, handler });
	Subscription::from_handler_map(id, handlers)
}

/// Invokes every handler whose metadata satisfies `filter`.
///
/// Entries are cloned out of the lock first so a handler may subscribe or
/// unsubscribe without deadlocking.
pub fn dispatch<E, M: Clone>(handlers: &HandlerMap<E, M>, event: &E, filter: impl Fn(&M) -> bool) {
	let entries: Vec<HandlerEntry<E, M>> = handlers
		.lock()
		.values()
		.filter(|entry| filter(&entry.meta))
		.cloned()
		.collect();
	for entry in entries {
		(entry.handler)(event);
	}
}

/// RAII handle that unregisters an event handler on drop.
///
/// Holds a weak reference to the handler map, so dropping after the owner
/// is gone is a no-op.
pub struct Subscription {
	id: HandlerId,
	dropper: Option<Arc<dyn Fn(HandlerId) + Send + Sync>>,
}

impl Subscription {
	/// Creates a subscription with a custom dropper function.
	pub fn new(id: HandlerId, dropper: Arc<dyn Fn(HandlerId) + Send + Sync>) -> Self {
		Self {
			id,
			dropper: Some(dropper),
		}
	}

	/// Creates a subscription from a handler map using a weak reference.
	pub fn from_handler_map<E, M>(id: HandlerId, handlers: &HandlerMap<E, M>) -> Self
	where
		E: Send + Sync + 'static,
		M: Send + Sync + 'static,
	{
		let weak: Weak<Mutex<IndexMap<HandlerId, HandlerEntry<E, M>>>> = Arc::downgrade(handlers);
		let dropper = Arc::new(move |id: HandlerId| {
			if let Some(map) = weak.upgrade() {
				map.lock().shift_remove(&id);
			}
		});
		Self::new(id, dropper)
	}

	pub fn id(&self) -> HandlerId {
		self.id
	}

	/// Explicitly unsubscribes. Equivalent to dropping.
	pub fn unsubscribe(mut self) {
		if let Some(dropper) = self.dropper.take() {
			(dropper)(self.id);
		}
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		if let Some(dropper) = self.dropper.take() {
			(dropper)(self.id);
		}
	}
}

impl std::fmt::Debug for Subscription {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Subscription")
			.field("id", &self.id)
			.field("active", &self.dropper.is_some())
			.finish()
	}
}
