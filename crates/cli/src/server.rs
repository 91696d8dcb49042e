//! Front-end TCP listener: one [`Connection`] per accepted socket.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use bridge::{BridgeOptions, RootActor, TabSource};
use bridge_runtime::{Connection, PacketTransport};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// Accepts front-end connections on `listener` until the task is dropped.
pub async fn serve(listener: TcpListener, source: Arc<dyn TabSource>, options: BridgeOptions) -> Result<()> {
	let mut next = 0u64;
	loop {
		let (stream, peer) = listener.accept().await.context("Failed to accept front-end connection")?;
		let prefix = format!("conn{next}.");
		next += 1;
		let source = Arc::clone(&source);
		let options = options.clone();
		tokio::spawn(async move { handle(stream, peer, prefix, source, options).await });
	}
}

pub async fn bind(host: &str, port: u16) -> Result<TcpListener> {
	let addr: SocketAddr = format!("{host}:{port}")
		.parse()
		.with_context(|| format!("Invalid host/port combination: {host}:{port}"))?;
	TcpListener::bind(addr)
		.await
		.with_context(|| format!("Failed to bind front-end listener to {addr}"))
}

async fn handle(stream: TcpStream, peer: SocketAddr, prefix: String, source: Arc<dyn TabSource>, options: BridgeOptions) {
	info!(target = "bridge", %peer, prefix, "front-end connected");
	if let Err(e) = stream.set_nodelay(true) {
		debug!(target = "bridge", error = %e, "could not disable nagle");
	}
	let (reader, writer) = stream.into_split();
	let (transport, message_rx) = PacketTransport::new(writer, reader);

	let conn = Connection::new(prefix);
	conn.set_root(Arc::new(RootActor::new(source, options)));
	conn.send(RootActor::greeting());

	match conn.run(transport.into_transport_parts(message_rx)).await {
		Ok(()) => info!(target = "bridge", %peer, "front-end disconnected"),
		Err(e) => warn!(target = "bridge", %peer, error = %e, "front-end connection failed"),
	}
}

#[cfg(test)]
mod tests {
	use bridge::StaticTabSource;
	use serde_json::Value;
	use tokio::io::{AsyncReadExt, AsyncWriteExt};

	use super::*;

	async fn read_packet(stream: &mut TcpStream) -> Value {
		let mut length = Vec::new();
		loop {
			let byte = stream.read_u8().await.unwrap();
			if byte == b':' {
				break;
			}
			length.push(byte);
		}
		let length: usize = String::from_utf8(length).unwrap().parse().unwrap();
		let mut body = vec![0; length];
		stream.read_exact(&mut body).await.unwrap();
		serde_json::from_slice(&body).unwrap()
	}

	#[tokio::test]
	async fn test_greeting_then_requests() {
		let listener = bind("127.0.0.1", 0).await.unwrap();
		let addr = listener.local_addr().unwrap();
		let source: Arc<dyn TabSource> = Arc::new(StaticTabSource::default());
		tokio::spawn(serve(listener, source, BridgeOptions::default()));

		let mut stream = TcpStream::connect(addr).await.unwrap();
		let greeting = read_packet(&mut stream).await;
		assert_eq!(greeting["from"], "root");
		assert_eq!(greeting["applicationType"], "browser");

		let request = br#"{"to":"root","type":"listTabs"}"#;
		stream.write_all(format!("{}:", request.len()).as_bytes()).await.unwrap();
		stream.write_all(request).await.unwrap();
		let reply = read_packet(&mut stream).await;
		assert_eq!(reply["from"], "root");
		assert_eq!(reply["tabs"], serde_json::json!([]));
	}
}
