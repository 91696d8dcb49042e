//! In-memory debug target for tests.
//!
//! [`MockTarget`] implements [`Dialer`]: every dial produces a fresh fake
//! socket whose requests are answered by a responder closure. Tests inject
//! events with [`MockTarget::emit`] and simulate transport loss with
//! [`MockTarget::drop_connection`].

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::{Notify, mpsc};

use crate::error::{Error, Result};
use crate::rpc::{Dialer, RpcClient};
use crate::transport::{Transport, TransportParts, TransportReceiver};

/// What the fake target does with one request.
#[derive(Debug, Clone)]
pub enum MockReply {
	Result(Value),
	Error { code: i64, message: String },
	/// Never answer; the request stays pending.
	Silent,
}

impl MockReply {
	pub fn ok() -> Self {
		MockReply::Result(json!({}))
	}

	pub fn error(message: impl Into<String>) -> Self {
		MockReply::Error {
			code: -32000,
			message: message.into(),
		}
	}
}

impl From<Value> for MockReply {
	fn from(value: Value) -> Self {
		MockReply::Result(value)
	}
}

type Responder = Arc<dyn Fn(&str, &Value) -> MockReply + Send + Sync>;

struct Link {
	to_client: mpsc::WeakUnboundedSender<Value>,
	shutdown: Arc<Notify>,
}

struct MockState {
	responder: Mutex<Responder>,
	requests: Mutex<Vec<(String, Value)>>,
	link: Mutex<Option<Link>>,
	dials: AtomicUsize,
	refuse: AtomicUsize,
}

/// Scriptable fake target. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MockTarget {
	state: Arc<MockState>,
}

impl Default for MockTarget {
	fn default() -> Self {
		Self::new()
	}
}

impl MockTarget {
	/// A target that answers every request with `{}`.
	pub fn new() -> Self {
		Self::with_responder(|_, _| MockReply::ok())
	}

	pub fn with_responder<F>(responder: F) -> Self
	where
		F: Fn(&str, &Value) -> MockReply + Send + Sync + 'static,
	{
		Self {
			state: Arc::new(MockState {
				responder: Mutex::new(Arc::new(responder)),
				requests: Mutex::new(Vec::new()),
				link: Mutex::new(None),
				dials: AtomicUsize::new(0),
				refuse: AtomicUsize::new(0),
			}),
		}
	}

	pub fn set_responder<F>(&self, responder: F)
	where
		F: Fn(&str, &Value) -> MockReply + Send + Sync + 'static,
	{
		*self.state.responder.lock() = Arc::new(responder);
	}

	/// An [`RpcClient`] dialing this target, with a short request timeout.
	pub fn client(&self) -> RpcClient {
		RpcClient::with_dialer("ws://mock.target/devtools/page/1", Arc::new(self.clone()), Duration::from_secs(5))
	}

	/// Sends an unsolicited event over the current socket.
	pub fn emit(&self, method: &str, params: Value) {
		self.inject(json!({"method": method, "params": params}));
	}

	/// Sends a raw message over the current socket.
	pub fn inject(&self, message: Value) {
		let tx = self.state.link.lock().as_ref().and_then(|link| link.to_client.upgrade());
		match tx {
			Some(tx) => {
				let _ = tx.send(message);
			}
			None => tracing::debug!("mock target has no open socket"),
		}
	}

	/// Closes the current socket from the target side.
	pub fn drop_connection(&self) {
		if let Some(link) = self.state.link.lock().take() {
			link.shutdown.notify_one();
		}
	}

	/// Whether a socket is open and the client still holds its end.
	pub fn is_connected(&self) -> bool {
		self.state
			.link
			.lock()
			.as_ref()
			.and_then(|link| link.to_client.upgrade())
			.is_some_and(|tx| !tx.is_closed())
	}

	/// Makes the next `n` dials fail.
	pub fn refuse_next_dials(&self, n: usize) {
		self.state.refuse.store(n, Ordering::SeqCst);
	}

	pub fn dial_count(&self) -> usize {
		self.state.dials.load(Ordering::SeqCst)
	}

	/// Every request received so far as `(method, params)`.
	pub fn requests(&self) -> Vec<(String, Value)> {
		self.state.requests.lock().clone()
	}

	pub fn methods(&self) -> Vec<String> {
		self.state.requests.lock().iter().map(|(method, _)| method.clone()).collect()
	}

	/// Params of the most recent request for `method`.
	pub fn last_params(&self, method: &str) -> Option<Value> {
		self.state
			.requests
			.lock()
			.iter()
			.rev()
			.find(|(m, _)| m == method)
			.map(|(_, params)| params.clone())
	}
}

#[async_trait]
impl Dialer for MockTarget {
	async fn dial(&self, url: &str) -> Result<TransportParts> {
		self.state.dials.fetch_add(1, Ordering::SeqCst);
		let refused = self
			.state
			.refuse
			.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
			.is_ok();
		if refused {
			return Err(Error::ConnectionFailed(format!("{url}: connection refused")));
		}

		let (to_client, message_rx) = mpsc::unbounded_channel();
		let shutdown = Arc::new(Notify::new());
		*self.state.link.lock() = Some(Link {
			to_client: to_client.downgrade(),
			shutdown: Arc::clone(&shutdown),
		});

		Ok(TransportParts {
			sender: Box::new(MockSender {
				state: Arc::clone(&self.state),
				to_client: to_client.downgrade(),
				shutdown: Arc::clone(&shutdown),
			}),
			receiver: Box::new(MockReceiver {
				to_client: Some(to_client),
				shutdown,
			}),
			message_rx,
		})
	}
}

struct MockSender {
	state: Arc<MockState>,
	to_client: mpsc::WeakUnboundedSender<Value>,
	shutdown: Arc<Notify>,
}

#[async_trait]
impl Transport for MockSender {
	async fn send(&mut self, message: Value) -> Result<()> {
		let id = message.get("id").cloned().unwrap_or(Value::Null);
		let method = message.get("method").and_then(Value::as_str).unwrap_or_default().to_string();
		let params = message.get("params").cloned().unwrap_or_else(|| json!({}));
		self.state.requests.lock().push((method.clone(), params.clone()));

		let responder = Arc::clone(&*self.state.responder.lock());
		let reply = match responder(&method, &params) {
			MockReply::Result(result) => json!({"id": id, "result": result}),
			MockReply::Error { code, message } => json!({"id": id, "error": {"code": code, "message": message}}),
			MockReply::Silent => return Ok(()),
		};
		let tx = self.to_client.upgrade().ok_or(Error::ChannelClosed)?;
		tx.send(reply).map_err(|_| Error::ChannelClosed)
	}

	async fn close(&mut self) -> Result<()> {
		self.shutdown.notify_one();
		Ok(())
	}
}

struct MockReceiver {
	to_client: Option<mpsc::UnboundedSender<Value>>,
	shutdown: Arc<Notify>,
}

#[async_trait]
impl TransportReceiver for MockReceiver {
	async fn run(&mut self) -> Result<()> {
		self.shutdown.notified().await;
		self.to_client.take();
		Ok(())
	}
}
