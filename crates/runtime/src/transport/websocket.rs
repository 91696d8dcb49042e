use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, connect_async};

use super::{Transport, TransportParts, TransportReceiver};
use crate::error::{Error, Result};

/// WebSocket transport for a debug target.
///
/// Text frames carry one JSON message each. Binary frames are accepted when
/// they hold UTF-8 JSON; anything else is logged and skipped.
pub struct WebSocketTransport;

pub struct WebSocketTransportSender<S> {
	sink: SplitSink<WebSocketStream<S>, Message>,
}

pub struct WebSocketTransportReceiver<S> {
	stream: SplitStream<WebSocketStream<S>>,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl WebSocketTransport {
	/// Opens `url` (a `webSocketDebuggerUrl`) and splits the socket.
	pub async fn connect(url: &str) -> Result<TransportParts> {
		tracing::debug!(url, "connecting to target");
		let (stream, _response) = connect_async(url)
			.await
			.map_err(|e| Error::ConnectionFailed(format!("{url}: {e}")))?;
		Ok(Self::from_stream(stream))
	}

	/// Wraps an already-established WebSocket stream.
	pub fn from_stream<S>(stream: WebSocketStream<S>) -> TransportParts
	where
		S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
	{
		let (sink, stream) = stream.split();
		let (message_tx, message_rx) = mpsc::unbounded_channel();
		TransportParts {
			sender: Box::new(WebSocketTransportSender { sink }),
			receiver: Box::new(WebSocketTransportReceiver { stream, message_tx }),
			message_rx,
		}
	}
}

#[async_trait]
impl<S> Transport for WebSocketTransportSender<S>
where
	S: AsyncRead + AsyncWrite + Unpin + Send,
{
	async fn send(&mut self, message: Value) -> Result<()> {
		let text = serde_json::to_string(&message)?;
		self.sink
			.send(Message::Text(text.into()))
			.await
			.map_err(|e| Error::TransportError(format!("WebSocket send failed: {e}")))
	}

	async fn close(&mut self) -> Result<()> {
		self.sink
			.close()
			.await
			.map_err(|e| Error::TransportError(format!("WebSocket close failed: {e}")))
	}
}

#[async_trait]
impl<S> TransportReceiver for WebSocketTransportReceiver<S>
where
	S: AsyncRead + AsyncWrite + Unpin + Send,
{
	async fn run(&mut self) -> Result<()> {
		while let Some(frame) = self.stream.next().await {
			let frame = frame.map_err(|e| Error::TransportError(format!("WebSocket read failed: {e}")))?;
			let text = match frame {
				Message::Text(text) => text.to_string(),
				Message::Binary(bytes) => match String::from_utf8(bytes.to_vec()) {
					Ok(text) => text,
					Err(_) => {
						tracing::warn!(len = bytes.len(), "skipping non-UTF-8 binary frame");
						continue;
					}
				},
				Message::Close(frame) => {
					tracing::debug!(?frame, "target closed the socket");
					break;
				}
				_ => continue,
			};

			match serde_json::from_str::<Value>(&text) {
				Ok(message) => {
					if self.message_tx.send(message).is_err() {
						break;
					}
				}
				Err(e) => tracing::warn!(error = %e, "skipping frame with invalid JSON"),
			}
		}
		Ok(())
	}
}
