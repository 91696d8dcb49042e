//! JSON-RPC client for a debug target.
//!
//! One [`RpcClient`] exists per target WebSocket URL. The socket is opened
//! lazily by [`RpcClient::connect`] (or the first [`RpcClient::request`]);
//! concurrent callers share a single pending attempt and a failed or closed
//! session is replaced on the next call.
//!
//! # Message flow
//!
//! 1. `request()` takes the next id (never reused for the client's lifetime)
//!    and registers a oneshot callback
//! 2. `{id, method, params}` is queued to the writer task
//! 3. The session's dispatch task reads messages in socket order
//! 4. Messages with an `id` resolve the matching callback; anything with a
//!    `method` is fanned out to the handlers subscribed to that method
//! 5. When the socket closes every outstanding callback fails with
//!    [`Error::ChannelClosed`] and the close handlers run

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bridge_protocol::target::ResponseError;
use futures_util::FutureExt;
use futures_util::future::{BoxFuture, Shared};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{Notify, mpsc, oneshot};

use crate::error::{Error, Result};
use crate::handlers::{self, HandlerMap, Subscription};
use crate::transport::{TransportParts, WebSocketTransport};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Opens the transport for a target URL.
#[async_trait]
pub trait Dialer: Send + Sync {
	async fn dial(&self, url: &str) -> Result<TransportParts>;
}

/// Dials real targets with [`WebSocketTransport`].
#[derive(Debug, Default, Clone, Copy)]
pub struct WebSocketDialer;

#[async_trait]
impl Dialer for WebSocketDialer {
	async fn dial(&self, url: &str) -> Result<TransportParts> {
		WebSocketTransport::connect(url).await
	}
}

/// Outbound request frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
	pub id: u64,
	pub method: String,
	#[serde(default, skip_serializing_if = "Value::is_null")]
	pub params: Value,
}

/// Completion of a request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
	pub id: u64,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub result: Option<Value>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub error: Option<ResponseError>,
}

/// Unsolicited notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
	pub method: String,
	#[serde(default)]
	pub params: Value,
}

/// Discriminated union of inbound target messages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Message {
	Response(Response),
	Event(Event),
	Unknown(Value),
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value>>>>>;

/// Connect attempts resolve to a session or the failure message; the
/// output must be `Clone` to be shared between waiters.
type ConnectAttempt = Shared<BoxFuture<'static, std::result::Result<Arc<Session>, String>>>;

/// Removes the pending callback when a request future is dropped early.
struct PendingGuard {
	id: u64,
	pending: PendingMap,
	completed: bool,
}

impl Drop for PendingGuard {
	fn drop(&mut self) {
		if !self.completed && self.pending.lock().remove(&self.id).is_some() {
			tracing::debug!(id = self.id, "removed orphaned request callback");
		}
	}
}

struct ResponseFuture {
	rx: oneshot::Receiver<Result<Value>>,
	guard: PendingGuard,
}

impl Future for ResponseFuture {
	type Output = Result<Value>;

	fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		match Pin::new(&mut self.rx).poll(cx) {
			Poll::Ready(result) => {
				self.guard.completed = true;
				Poll::Ready(result.map_err(|_| Error::ChannelClosed).and_then(|r| r))
			}
			Poll::Pending => Poll::Pending,
		}
	}
}

/// One open socket.
struct Session {
	outbound_tx: mpsc::UnboundedSender<Value>,
	pending: PendingMap,
	closed: AtomicBool,
	shutdown: Arc<Notify>,
}

impl Session {
	fn start(parts: TransportParts, client: Weak<ClientInner>) -> Arc<Self> {
		let TransportParts {
			mut sender,
			mut receiver,
			mut message_rx,
		} = parts;
		let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Value>();

		let shutdown = Arc::new(Notify::new());
		let session = Arc::new(Self {
			outbound_tx,
			pending: Arc::new(Mutex::new(HashMap::new())),
			closed: AtomicBool::new(false),
			shutdown: Arc::clone(&shutdown),
		});

		tokio::spawn(async move {
			if let Err(e) = receiver.run().await {
				tracing::debug!(error = %e, "target transport read ended");
			}
		});

		tokio::spawn(async move {
			loop {
				let message = tokio::select! {
					message = outbound_rx.recv() => message,
					_ = shutdown.notified() => None,
				};
				let Some(message) = message else { break };
				if let Err(e) = sender.send(message).await {
					tracing::warn!(error = %e, "target transport write failed");
					break;
				}
			}
			let _ = sender.close().await;
		});

		let reader = Arc::clone(&session);
		tokio::spawn(async move {
			while let Some(raw) = message_rx.recv().await {
				reader.dispatch(raw, &client);
			}
			reader.close();
			tracing::info!("target connection closed");
			if let Some(inner) = client.upgrade() {
				handlers::dispatch(&inner.close_handlers, &(), |_| true);
			}
		});

		session
	}

	fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}

	/// Marks the session closed, then fails every outstanding request.
	fn close(&self) {
		self.closed.store(true, Ordering::SeqCst);
		self.shutdown.notify_one();
		let drained: Vec<_> = self.pending.lock().drain().collect();
		for (id, callback) in drained {
			tracing::debug!(id, "failing request on closed connection");
			let _ = callback.send(Err(Error::ChannelClosed));
		}
	}

	fn dispatch(&self, raw: Value, client: &Weak<ClientInner>) {
		match serde_json::from_value::<Message>(raw) {
			Ok(Message::Response(response)) => {
				let Some(callback) = self.pending.lock().remove(&response.id) else {
					tracing::debug!(id = response.id, "response for unknown request (ignored)");
					return;
				};
				let result = match response.error {
					Some(error) => Err(Error::from(error)),
					None => Ok(response.result.unwrap_or(Value::Null)),
				};
				let _ = callback.send(result);
			}
			Ok(Message::Event(event)) => {
				tracing::trace!(method = %event.method, "target event");
				if let Some(inner) = client.upgrade() {
					handlers::dispatch(&inner.events, &event.params, |method| method == &event.method);
				}
			}
			Ok(Message::Unknown(value)) => {
				tracing::debug!(%value, "unknown target message (ignored)");
			}
			Err(e) => tracing::warn!(error = %e, "failed to parse target message"),
		}
	}
}

struct ClientInner {
	url: String,
	dialer: Arc<dyn Dialer>,
	next_id: AtomicU64,
	timeout: Duration,
	state: Mutex<Option<ConnectAttempt>>,
	events: HandlerMap<Value, String>,
	close_handlers: HandlerMap<()>,
}

/// Cloneable handle to one target's RPC connection.
#[derive(Clone)]
pub struct RpcClient {
	inner: Arc<ClientInner>,
}

impl std::fmt::Debug for RpcClient {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("RpcClient")
			.field("url", &self.inner.url)
			.field("connected", &self.is_connected())
			.finish()
	}
}

impl RpcClient {
	/// Client for a real target WebSocket.
	pub fn new(url: impl Into<String>) -> Self {
		Self::with_dialer(url, Arc::new(WebSocketDialer), DEFAULT_REQUEST_TIMEOUT)
	}

	pub fn with_dialer(url: impl Into<String>, dialer: Arc<dyn Dialer>, timeout: Duration) -> Self {
		Self {
			inner: Arc::new(ClientInner {
				url: url.into(),
				dialer,
				next_id: AtomicU64::new(1),
				timeout,
				state: Mutex::new(None),
				events: handlers::handler_map(),
				close_handlers: handlers::handler_map(),
			}),
		}
	}

	pub fn url(&self) -> &str {
		&self.inner.url
	}

	/// True while a session is open.
	pub fn is_connected(&self) -> bool {
		let state = self.inner.state.lock();
		matches!(
			state.as_ref().and_then(|attempt| attempt.peek()),
			Some(Ok(session)) if !session.is_closed()
		)
	}

	/// Opens the socket if needed. Idempotent.
	pub async fn connect(&self) -> Result<()> {
		self.session().await.map(|_| ())
	}

	/// Drops the current session; outstanding requests fail.
	pub fn disconnect(&self) {
		let attempt = self.inner.state.lock().take();
		if let Some(Ok(session)) = attempt.as_ref().and_then(|attempt| attempt.peek()) {
			session.close();
		}
	}

	async fn session(&self) -> Result<Arc<Session>> {
		let attempt = {
			let mut state = self.inner.state.lock();
			match state.as_ref() {
				Some(attempt) if is_live(attempt) => attempt.clone(),
				_ => {
					let attempt = self.dial_attempt();
					*state = Some(attempt.clone());
					attempt
				}
			}
		};
		attempt.await.map_err(Error::ConnectionFailed)
	}

	fn dial_attempt(&self) -> ConnectAttempt {
		let client = Arc::downgrade(&self.inner);
		async move {
			let inner = client.upgrade().ok_or_else(|| "client dropped".to_string())?;
			tracing::debug!(url = %inner.url, "dialing target");
			let parts = inner.dialer.dial(&inner.url).await.map_err(|e| e.to_string())?;
			Ok(Session::start(parts, client))
		}
		.boxed()
		.shared()
	}

	/// Sends `method` and resolves with the response's `result`.
	pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
		let session = self.session().await?;
		let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);

		let (tx, rx) = oneshot::channel();
		session.pending.lock().insert(id, tx);
		let guard = PendingGuard {
			id,
			pending: Arc::clone(&session.pending),
			completed: false,
		};
		if session.is_closed() {
			return Err(Error::ChannelClosed);
		}

		tracing::debug!(id, method, "sending target request");
		let request = serde_json::to_value(Request {
			id,
			method: method.to_string(),
			params,
		})?;
		session.outbound_tx.send(request).map_err(|_| Error::ChannelClosed)?;

		match tokio::time::timeout(self.inner.timeout, ResponseFuture { rx, guard }).await {
			Ok(result) => result,
			Err(_) => Err(Error::Timeout(format!(
				"{method} (id {id}) after {}ms",
				self.inner.timeout.as_millis()
			))),
		}
	}

	/// [`request`](Self::request) with the result deserialized into `T`.
	pub async fn request_as<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
		let result = self.request(method, params).await?;
		Ok(serde_json::from_value(result)?)
	}

	/// Subscribes to a target event by method name. Handlers receive `params`.
	pub fn on<F>(&self, method: &str, handler: F) -> Subscription
	where
		F: Fn(&Value) + Send + Sync + 'static,
	{
		handlers::subscribe(&self.inner.events, method.to_string(), Arc::new(handler))
	}

	/// Subscribes to socket closure.
	pub fn on_close<F>(&self, handler: F) -> Subscription
	where
		F: Fn() + Send + Sync + 'static,
	{
		handlers::subscribe(&self.inner.close_handlers, (), Arc::new(move |_: &()| handler()))
	}
}

fn is_live(attempt: &ConnectAttempt) -> bool {
	match attempt.peek() {
		None => true,
		Some(Ok(session)) => !session.is_closed(),
		Some(Err(_)) => false,
	}
}
