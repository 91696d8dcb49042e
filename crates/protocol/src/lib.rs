//! Wire types for both sides of the bridge.
//!
//! - [`packet`]: the actor-addressed packets exchanged with the debugging
//!   front-end (`{to, type, ...}` in, `{from, ...}` out).
//! - [`target`]: the payloads of the JSON-RPC protocol spoken by the debug
//!   target over its WebSocket (runtime values, call frames, DOM nodes,
//!   CSS rules and the `/json` target listing).
//!
//! Types in this crate are pure data. They mirror the wire shapes and carry
//! no behavior beyond serde; the actors in `bridge-core` build on them.

pub mod packet;
pub mod target;

pub use packet::{ErrorReply, Packet};
