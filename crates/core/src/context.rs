//! State shared by every actor of one tab.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use bridge_runtime::{Connection, Error, Result, RpcClient};
use parking_lot::Mutex;
use serde_json::Value;

use crate::options::BridgeOptions;
use crate::styles::SheetRegistry;

/// Per-tab context handed to sub-actors at construction.
///
/// Owned by the tab actor and replaced when the tab resets, so caches
/// never outlive the attachment they were built for.
pub struct TabContext {
	pub tab_id: String,
	pub rpc: RpcClient,
	pub options: BridgeOptions,
	pub sheets: Arc<SheetRegistry>,
	conn: Weak<Connection>,
	grips: Mutex<GripIndex>,
}

/// Grip identity in both directions.
#[derive(Debug, Default)]
struct GripIndex {
	/// `(owning pool, remote object id)` to grip actor id.
	by_object: HashMap<(String, String), String>,
	by_actor: HashMap<String, (String, String)>,
}

impl std::fmt::Debug for TabContext {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TabContext").field("tab_id", &self.tab_id).finish_non_exhaustive()
	}
}

impl TabContext {
	pub fn new(tab_id: String, rpc: RpcClient, options: BridgeOptions, conn: &Arc<Connection>) -> Arc<Self> {
		Arc::new(Self {
			tab_id,
			rpc,
			options,
			sheets: SheetRegistry::new(),
			conn: Arc::downgrade(conn),
			grips: Mutex::new(GripIndex::default()),
		})
	}

	/// The owning connection, unless the front-end has gone away.
	pub fn conn(&self) -> Result<Arc<Connection>> {
		self.conn.upgrade().ok_or(Error::ChannelClosed)
	}

	pub fn emit(&self, from: &str, kind: &str, body: Value) {
		if let Some(conn) = self.conn.upgrade() {
			conn.emit(from, kind, body);
		}
	}

	pub(crate) fn cached_grip(&self, pool: &str, object_id: &str) -> Option<String> {
		self.grips
			.lock()
			.by_object
			.get(&(pool.to_string(), object_id.to_string()))
			.cloned()
	}

	pub(crate) fn remember_grip(&self, pool: &str, object_id: &str, actor_id: String) {
		let key = (pool.to_string(), object_id.to_string());
		let mut grips = self.grips.lock();
		if let Some(previous) = grips.by_object.insert(key.clone(), actor_id.clone()) {
			grips.by_actor.remove(&previous);
		}
		grips.by_actor.insert(actor_id, key);
	}

	pub(crate) fn forget_grip(&self, actor_id: &str) {
		let mut grips = self.grips.lock();
		if let Some(key) = grips.by_actor.remove(actor_id) {
			grips.by_object.remove(&key);
		}
	}
}

#[cfg(test)]
mod tests {
	use bridge_runtime::testing::MockTarget;

	use super::*;
	use crate::test_support::tab_fixture;

	#[tokio::test]
	async fn test_forget_grip_drops_only_that_actor() {
		let target = MockTarget::new();
		let (_conn, tab) = tab_fixture(&target);
		tab.remember_grip("conn0.pause1", "obj-1", "conn0.obj2".into());
		tab.remember_grip("conn0.pause1", "obj-2", "conn0.obj3".into());

		tab.forget_grip("conn0.obj2");
		assert_eq!(tab.cached_grip("conn0.pause1", "obj-1"), None);
		assert_eq!(tab.cached_grip("conn0.pause1", "obj-2").as_deref(), Some("conn0.obj3"));

		tab.remember_grip("conn0.pause1", "obj-2", "conn0.obj4".into());
		tab.forget_grip("conn0.obj3");
		assert_eq!(tab.cached_grip("conn0.pause1", "obj-2").as_deref(), Some("conn0.obj4"));
		assert_eq!(tab.grips.lock().by_actor.len(), 1);
	}
}
