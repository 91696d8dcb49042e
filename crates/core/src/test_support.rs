//! Fixtures shared by the actor tests.

use std::sync::Arc;
use std::time::Duration;

use bridge_runtime::testing::MockTarget;
use bridge_runtime::{Connection, RpcClient};
use serde_json::{Value, json};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::context::TabContext;
use crate::options::BridgeOptions;

pub fn tab_fixture(target: &MockTarget) -> (Arc<Connection>, Arc<TabContext>) {
	let conn = Connection::new("conn0.");
	let tab = TabContext::new("conn0.tab0".to_string(), target.client(), BridgeOptions::default(), &conn);
	(conn, tab)
}

/// Waits until every target message sent before this call has been handled.
pub async fn sync(rpc: &RpcClient) {
	rpc.request("Test.sync", json!({})).await.unwrap();
}

/// Next outbound packet whose `type` is `kind`, skipping others.
pub async fn next_event(outbound: &mut UnboundedReceiver<Value>, kind: &str) -> Value {
	loop {
		let packet = tokio::time::timeout(Duration::from_secs(2), outbound.recv())
			.await
			.unwrap_or_else(|_| panic!("timed out waiting for {kind}"))
			.expect("connection closed");
		if packet["type"] == kind {
			return packet;
		}
	}
}

/// Every packet queued so far.
pub fn drain(outbound: &mut UnboundedReceiver<Value>) -> Vec<Value> {
	let mut packets = Vec::new();
	while let Ok(packet) = outbound.try_recv() {
		packets.push(packet);
	}
	packets
}

pub fn count_events(packets: &[Value], kind: &str) -> usize {
	packets.iter().filter(|packet| packet["type"] == kind).count()
}

/// Waits until the target's socket has been closed by the client.
pub async fn disconnected(target: &MockTarget) {
	tokio::time::timeout(Duration::from_secs(2), async {
		while target.is_connected() {
			tokio::time::sleep(Duration::from_millis(5)).await;
		}
	})
	.await
	.expect("target socket still open");
}
