//! Error types for the bridge runtime.

use thiserror::Error;

/// Result type alias for runtime operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by transports, the target RPC client and actors.
#[derive(Debug, Error)]
pub enum Error {
	/// Failed to open the target WebSocket.
	#[error("Failed to connect to target: {0}")]
	ConnectionFailed(String),

	/// Transport-level error (framing, socket I/O).
	#[error("Transport error: {0}")]
	TransportError(String),

	/// Malformed message on either protocol.
	#[error("Protocol error: {0}")]
	ProtocolError(String),

	/// The target answered a request with a JSON-RPC error.
	#[error("Target error {code}: {message}")]
	Remote {
		code: i64,
		message: String,
		data: Option<String>,
	},

	#[error("I/O error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	/// A target request did not complete in time.
	#[error("Timeout: {0}")]
	Timeout(String),

	/// The target socket closed before the request resolved.
	#[error("Channel closed unexpectedly")]
	ChannelClosed,

	/// No actor is registered under the addressed id.
	#[error("No such actor for ID: {0}")]
	NoSuchActor(String),

	/// The actor does not declare a handler for the packet type.
	#[error("Actor {actor} does not recognize the packet type {kind}")]
	UnrecognizedPacketType { actor: String, kind: String },

	/// Operation invoked from the wrong state, e.g. resuming a running thread.
	#[error("{0}")]
	WrongState(String),

	/// Option or request the bridged target cannot express.
	#[error("Not implemented: {0}")]
	NotImplemented(String),

	/// Packet arguments are missing or of the wrong type.
	#[error("Invalid argument: {0}")]
	InvalidArgument(String),

	/// Evaluated code threw.
	#[error("Evaluation failed: {0}")]
	Evaluation(String),
}

impl Error {
	/// Front-end error code carried in `{from, error, message}` replies.
	pub fn code(&self) -> &'static str {
		match self {
			Error::NoSuchActor(_) => "noSuchActor",
			Error::UnrecognizedPacketType { .. } => "unrecognizedPacketType",
			Error::WrongState(_) => "wrongState",
			Error::NotImplemented(_) => "notImplemented",
			Error::InvalidArgument(_) => "badParameterType",
			_ => "unknownError",
		}
	}

	/// Returns true if this is a timeout error.
	pub fn is_timeout(&self) -> bool {
		matches!(self, Error::Timeout(_))
	}

	/// Returns true if the target connection is gone.
	pub fn is_closed(&self) -> bool {
		matches!(self, Error::ChannelClosed | Error::ConnectionFailed(_))
	}

	pub(crate) fn bad_packet(err: serde_json::Error) -> Self {
		Error::InvalidArgument(err.to_string())
	}
}

impl From<bridge_protocol::target::ResponseError> for Error {
	fn from(err: bridge_protocol::target::ResponseError) -> Self {
		Error::Remote {
			code: err.code,
			message: err.message,
			data: err.data,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_error_codes() {
		assert_eq!(Error::NoSuchActor("conn0.x".into()).code(), "noSuchActor");
		assert_eq!(
			Error::UnrecognizedPacketType {
				actor: "root".into(),
				kind: "bogus".into()
			}
			.code(),
			"unrecognizedPacketType"
		);
		assert_eq!(Error::WrongState("not paused".into()).code(), "wrongState");
		assert_eq!(Error::InvalidArgument("node".into()).code(), "badParameterType");
		assert_eq!(Error::ChannelClosed.code(), "unknownError");
	}

	#[test]
	fn test_remote_from_response_error() {
		let err: Error = bridge_protocol::target::ResponseError {
			code: -32000,
			message: "No node with given id found".into(),
			data: None,
		}
		.into();
		assert_eq!(err.to_string(), "Target error -32000: No node with given id found");
	}
}
