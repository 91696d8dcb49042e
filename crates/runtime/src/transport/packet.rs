use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;

use super::{Transport, TransportParts, TransportReceiver};
use crate::error::{Error, Result};

/// Longest accepted decimal length prefix.
pub(crate) const MAX_PREFIX_DIGITS: usize = 20;

/// Length-prefixed packet transport for the front-end connection.
///
/// Each packet is framed as the decimal byte length of its UTF-8 JSON body,
/// a colon, then the body: `17:{"to":"root"...}`. Bulk packets are rejected.
pub struct PacketTransport<W, R> {
	sender: PacketTransportSender<W>,
	receiver: PacketTransportReceiver<R>,
}

pub struct PacketTransportSender<W> {
	writer: W,
}

pub struct PacketTransportReceiver<R> {
	reader: BufReader<R>,
	message_tx: mpsc::UnboundedSender<Value>,
}

impl<W, R> PacketTransport<W, R>
where
	W: AsyncWrite + Unpin + Send + 'static,
	R: AsyncRead + Unpin + Send + 'static,
{
	/// Creates a transport and the channel inbound packets are sent to.
	pub fn new(writer: W, reader: R) -> (Self, mpsc::UnboundedReceiver<Value>) {
		let (message_tx, message_rx) = mpsc::unbounded_channel();
		let transport = Self {
			sender: PacketTransportSender { writer },
			receiver: PacketTransportReceiver {
				reader: BufReader::new(reader),
				message_tx,
			},
		};
		(transport, message_rx)
	}

	pub async fn send(&mut self, message: Value) -> Result<()> {
		self.sender.send(message).await
	}

	pub async fn run(&mut self) -> Result<()> {
		self.receiver.run().await
	}

	pub fn into_parts(self) -> (PacketTransportSender<W>, PacketTransportReceiver<R>) {
		(self.sender, self.receiver)
	}

	pub fn into_transport_parts(self, message_rx: mpsc::UnboundedReceiver<Value>) -> TransportParts {
		TransportParts {
			sender: Box::new(self.sender),
			receiver: Box::new(self.receiver),
			message_rx,
		}
	}
}

#[async_trait]
impl<W> Transport for PacketTransportSender<W>
where
	W: AsyncWrite + Unpin + Send,
{
	async fn send(&mut self, message: Value) -> Result<()> {
		let body = serde_json::to_vec(&message)?;
		let header = format!("{}:", body.len());

		tracing::trace!(len = body.len(), "writing packet");

		self.writer
			.write_all(header.as_bytes())
			.await
			.map_err(|e| Error::TransportError(format!("Failed to write packet: {e}")))?;
		self.writer
			.write_all(&body)
			.await
			.map_err(|e| Error::TransportError(format!("Failed to write packet: {e}")))?;
		self.writer
			.flush()
			.await
			.map_err(|e| Error::TransportError(format!("Failed to flush packet: {e}")))?;
		Ok(())
	}

	async fn close(&mut self) -> Result<()> {
		self.writer.shutdown().await?;
		Ok(())
	}
}

impl<R> PacketTransportReceiver<R>
where
	R: AsyncRead + Unpin + Send,
{
	/// Reads one framed packet. `Ok(None)` means the peer closed between packets.
	async fn read_packet(&mut self) -> Result<Option<Vec<u8>>> {
		let mut digits = Vec::with_capacity(8);
		loop {
			let byte = match self.reader.read_u8().await {
				Ok(byte) => byte,
				Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof && digits.is_empty() => {
					return Ok(None);
				}
				Err(e) => {
					return Err(Error::TransportError(format!("Failed to read length prefix: {e}")));
				}
			};
			match byte {
				b':' => break,
				b'0'..=b'9' if digits.len() < MAX_PREFIX_DIGITS => digits.push(byte),
				b'0'..=b'9' => {
					return Err(Error::TransportError(format!(
						"Failed to read length prefix: more than {MAX_PREFIX_DIGITS} digits"
					)));
				}
				other => {
					return Err(Error::TransportError(format!(
						"Failed to read length prefix: unexpected byte 0x{other:02x}"
					)));
				}
			}
		}

		let length = std::str::from_utf8(&digits)
			.ok()
			.and_then(|s| s.parse::<usize>().ok())
			.ok_or_else(|| Error::TransportError("Failed to read length prefix: invalid length".to_string()))?;

		let mut body = vec![0u8; length];
		self.reader
			.read_exact(&mut body)
			.await
			.map_err(|e| Error::TransportError(format!("Failed to read packet body: {e}")))?;
		Ok(Some(body))
	}
}

#[async_trait]
impl<R> TransportReceiver for PacketTransportReceiver<R>
where
	R: AsyncRead + Unpin + Send,
{
	async fn run(&mut self) -> Result<()> {
		while let Some(body) = self.read_packet().await? {
			let message = match serde_json::from_slice::<Value>(&body) {
				Ok(message) => message,
				Err(e) => {
					tracing::warn!(error = %e, len = body.len(), "dropping packet with invalid JSON");
					continue;
				}
			};
			if self.message_tx.send(message).is_err() {
				tracing::debug!("packet channel closed, stopping reader");
				break;
			}
		}
		Ok(())
	}
}
