//! Bridge runtime: transports, the target RPC client and the actor registry.
//!
//! - **Transport**: `<length>:<json>` packets for the front-end, one JSON
//!   document per WebSocket frame for the debug target
//! - **RPC client**: request/response correlation and event fan-out for one
//!   target socket, with a shared idempotent connect
//! - **Connection**: actor pools, lazy actors, id allocation and dispatch of
//!   front-end packets with per-actor ordering
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │ bridge-core  │  Actors (root, tab, walker, thread, grips...)
//! └──────┬───────┘
//!        │ implements Actor
//! ┌──────▼───────┐
//! │bridge-runtime│  This crate
//! │  ┌────────┐  │
//! │  │  Conn  │  │  Actor registry, packet dispatch
//! │  └────────┘  │
//! │  ┌────────┐  │
//! │  │  RPC   │  │  Target JSON-RPC correlation
//! │  └────────┘  │
//! │  ┌────────┐  │
//! │  │ Trans  │  │  Packet / WebSocket transport
//! │  └────────┘  │
//! └──────────────┘
//! ```

pub mod actor;
pub mod connection;
pub mod error;
pub mod handlers;
pub mod rpc;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
pub mod transport;

pub use actor::{Actor, ActorSpec, parse_request};
pub use connection::{Connection, LazyFactory, ROOT_ID, error_reply};
pub use error::{Error, Result};
pub use handlers::{HandlerId, Subscription};
pub use rpc::{Dialer, RpcClient, WebSocketDialer};
pub use transport::{
	PacketTransport, PacketTransportReceiver, PacketTransportSender, Transport, TransportParts, TransportReceiver,
	WebSocketTransport, WebSocketTransportReceiver, WebSocketTransportSender,
};
