//! Protocol error types
//!
//! Errors raised while framing, encoding or dispatching packets. Only
//! `ProtocolViolation`, `PeerClosed` and socket I/O errors end a connection;
//! everything storage-related is turned into a reply packet before it gets here.

use std::fmt;
use std::io;

/// Protocol error type
#[derive(Debug)]
pub enum ProtocolError {
	/// I/O error on the socket
	Io(io::Error),
	/// Metadata could not be serialized or parsed as JSON
	Json(String),
	/// Bad magic, unknown opcode, oversized lengths or a truncated buffer
	ProtocolViolation(String),
	/// Peer closed the stream in the middle of a packet
	PeerClosed,
	/// A reply lacked fields its handler requires
	MalformedReply(String),
}

impl fmt::Display for ProtocolError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ProtocolError::Io(e) => write!(f, "I/O error: {}", e),
			ProtocolError::Json(msg) => write!(f, "JSON error: {}", msg),
			ProtocolError::ProtocolViolation(msg) => write!(f, "Protocol violation: {}", msg),
			ProtocolError::PeerClosed => write!(f, "Peer closed the connection mid-packet"),
			ProtocolError::MalformedReply(msg) => write!(f, "Malformed reply: {}", msg),
		}
	}
}

impl std::error::Error for ProtocolError {
	fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
		match self {
			ProtocolError::Io(e) => Some(e),
			_ => None,
		}
	}
}

impl ProtocolError {
	/// True for errors that must close the connection
	pub fn is_fatal(&self) -> bool {
		matches!(
			self,
			ProtocolError::Io(_) | ProtocolError::ProtocolViolation(_) | ProtocolError::PeerClosed
		)
	}
}

// From implementations for automatic conversion
impl From<io::Error> for ProtocolError {
	fn from(e: io::Error) -> Self {
		ProtocolError::Io(e)
	}
}

impl From<serde_json::Error> for ProtocolError {
	fn from(e: serde_json::Error) -> Self {
		ProtocolError::Json(e.to_string())
	}
}


// vim: ts=4
