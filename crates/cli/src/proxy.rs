//! Forwarding proxy in front of a debugging endpoint.
//!
//! `GET /json*` is fetched from the backend with every `<backend host:port>`
//! rewritten to the proxy's own address, so the WebSocket URLs in the
//! listing point back here. `/devtools/page/{id}` is upgraded and piped to
//! the backend socket of the same page; client frames that arrive before
//! the backend socket is open are queued and flushed in order.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use axum::Router;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{OriginalUri, Path, State, WebSocketUpgrade};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_tungstenite::tungstenite::Message as BackendMessage;
use tracing::{debug, info, warn};

use crate::config::ProxyConfig;

#[derive(Clone)]
struct ProxyState {
	/// `host:port` of the real endpoint.
	backend: String,
	/// `host:port` clients reach the proxy on.
	public: String,
	http: reqwest::Client,
}

/// Replaces every occurrence of the backend address with the proxy's.
pub fn rewrite(body: &str, backend: &str, public: &str) -> String {
	body.replace(backend, public)
}

pub async fn run_proxy(config: &ProxyConfig) -> Result<()> {
	let addr: SocketAddr = format!("{}:{}", config.listen, config.port)
		.parse()
		.with_context(|| format!("Invalid host/port combination: {}:{}", config.listen, config.port))?;
	let listener = TcpListener::bind(addr)
		.await
		.with_context(|| format!("Failed to bind proxy to {addr}"))?;
	serve(listener, config.backend.clone()).await
}

/// Serves the proxy on `listener`, forwarding to `backend` (`host:port`).
pub async fn serve(listener: TcpListener, backend: String) -> Result<()> {
	let public = listener.local_addr().context("Proxy listener has no address")?.to_string();
	info!(target = "bridge.proxy", %public, %backend, "starting forwarding proxy");
	let state = ProxyState {
		backend,
		public,
		http: reqwest::Client::new(),
	};
	let app = Router::new()
		.route("/json", get(listing))
		.route("/json/{*rest}", get(listing))
		.route(
			"/devtools/page/{id}",
			get(
				|Path(id): Path<String>, ws: WebSocketUpgrade, State(state): State<ProxyState>| async move {
					ws.on_upgrade(move |socket| pipe_page(socket, state, id))
				},
			),
		)
		.with_state(state);

	axum::serve(listener, app.into_make_service())
		.await
		.context("Proxy server error")
}

async fn listing(State(state): State<ProxyState>, OriginalUri(uri): OriginalUri) -> Response {
	let path = uri.path_and_query().map_or("/json", |pq| pq.as_str());
	let url = format!("http://{}{}", state.backend, path);
	debug!(target = "bridge.proxy", %url, "forwarding listing");

	let body = match state.http.get(&url).send().await {
		Ok(response) => response.text().await,
		Err(e) => Err(e),
	};
	match body {
		Ok(body) => (
			[(header::CONTENT_TYPE, "application/json; charset=UTF-8")],
			rewrite(&body, &state.backend, &state.public),
		)
			.into_response(),
		Err(e) => {
			warn!(target = "bridge.proxy", %url, error = %e, "backend listing failed");
			(StatusCode::BAD_GATEWAY, e.to_string()).into_response()
		}
	}
}

fn to_backend(message: Message) -> Option<BackendMessage> {
	match message {
		Message::Text(text) => Some(BackendMessage::Text(text.as_str().to_string())),
		Message::Binary(data) => Some(BackendMessage::Binary(data.to_vec())),
		_ => None,
	}
}

fn to_client(message: BackendMessage) -> Option<Message> {
	match message {
		BackendMessage::Text(text) => Some(Message::Text(text.into())),
		BackendMessage::Binary(data) => Some(Message::Binary(data.into())),
		_ => None,
	}
}

async fn pipe_page(socket: WebSocket, state: ProxyState, id: String) {
	let (mut client_tx, mut client_rx) = socket.split();

	// Reads the client right away so nothing is lost while dialing.
	let (queue_tx, queue_rx) = mpsc::unbounded_channel();
	let reader = tokio::spawn(async move {
		while let Some(Ok(message)) = client_rx.next().await {
			if matches!(message, Message::Close(_)) {
				break;
			}
			if let Some(message) = to_backend(message) {
				if queue_tx.send(message).is_err() {
					break;
				}
			}
		}
	});

	let url = format!("ws://{}/devtools/page/{}", state.backend, id);
	let backend = match tokio_tungstenite::connect_async(url.as_str()).await {
		Ok((backend, _)) => backend,
		Err(e) => {
			warn!(target = "bridge.proxy", %url, error = %e, "backend socket failed");
			let _ = client_tx.send(Message::Close(None)).await;
			reader.abort();
			return;
		}
	};
	info!(target = "bridge.proxy", page = %id, "page socket open");
	pump(queue_rx, backend, &mut client_tx).await;
	reader.abort();
	let _ = client_tx.send(Message::Close(None)).await;
	info!(target = "bridge.proxy", page = %id, "page socket closed");
}

/// Flushes queued client frames to the backend and relays backend frames
/// back until either side closes.
async fn pump<S>(
	queue_rx: mpsc::UnboundedReceiver<BackendMessage>,
	backend: tokio_tungstenite::WebSocketStream<S>,
	client_tx: &mut futures::stream::SplitSink<WebSocket, Message>,
) where
	S: tokio::io::AsyncRead + tokio::io::AsyncWrite + Unpin,
{
	let (mut backend_tx, mut backend_rx) = backend.split();
	let upstream = async {
		let mut queued = UnboundedReceiverStream::new(queue_rx);
		while let Some(message) = queued.next().await {
			if backend_tx.send(message).await.is_err() {
				break;
			}
		}
	};
	let downstream = async {
		while let Some(Ok(message)) = backend_rx.next().await {
			if message.is_close() {
				break;
			}
			if let Some(message) = to_client(message) {
				if client_tx.send(message).await.is_err() {
					break;
				}
			}
		}
	};
	tokio::select! {
		_ = upstream => {}
		_ = downstream => {}
	}
}
