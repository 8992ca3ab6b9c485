//! Error types for dropr operations

use std::error::Error;
use std::fmt;
use std::io;

use crate::protocol::ProtocolError;

/// Main error type for the library entry points and the binary
#[derive(Debug)]
pub enum DropError {
	/// I/O error (bind, accept, local file access)
	Io(io::Error),

	/// Connection error (nested)
	Connection(ConnectionError),

	/// Protocol error (nested)
	Protocol(ProtocolError),

	/// Storage error (nested)
	Storage(StorageError),

	/// Configuration error (nested)
	Config(ConfigError),

	/// Generic error message
	Other { message: String },
}

impl fmt::Display for DropError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			DropError::Io(e) => write!(f, "I/O error: {}", e),
			DropError::Connection(e) => write!(f, "Connection error: {}", e),
			DropError::Protocol(e) => write!(f, "Protocol error: {}", e),
			DropError::Storage(e) => write!(f, "Storage error: {}", e),
			DropError::Config(e) => write!(f, "Configuration error: {}", e),
			DropError::Other { message } => write!(f, "{}", message),
		}
	}
}

impl Error for DropError {}

impl From<io::Error> for DropError {
	fn from(e: io::Error) -> Self {
		DropError::Io(e)
	}
}

impl From<String> for DropError {
	fn from(e: String) -> Self {
		DropError::Other { message: e }
	}
}

impl From<ConnectionError> for DropError {
	fn from(e: ConnectionError) -> Self {
		DropError::Connection(e)
	}
}

impl From<ProtocolError> for DropError {
	fn from(e: ProtocolError) -> Self {
		DropError::Protocol(e)
	}
}

impl From<StorageError> for DropError {
	fn from(e: StorageError) -> Self {
		DropError::Storage(e)
	}
}

impl From<ConfigError> for DropError {
	fn from(e: ConfigError) -> Self {
		DropError::Config(e)
	}
}

/// Connection-specific errors
#[derive(Debug)]
pub enum ConnectionError {
	/// Could not resolve or reach the server
	ConnectFailed { addr: String, source: io::Error },

	/// The network loop is gone; requests can no longer be queued
	Disconnected,
}

impl fmt::Display for ConnectionError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConnectionError::ConnectFailed { addr, source } => {
				write!(f, "Failed to connect to {}: {}", addr, source)
			}
			ConnectionError::Disconnected => write!(f, "Connection disconnected"),
		}
	}
}

impl Error for ConnectionError {}

/// Storage backend errors
#[derive(Debug)]
pub enum StorageError {
	/// File does not exist
	NotFound { name: String },

	/// Name is not a plain file name (empty, path separators, `.` or `..`)
	InvalidName { name: String },

	/// Underlying I/O failure
	Io { name: String, source: io::Error },
}

impl fmt::Display for StorageError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			StorageError::NotFound { name } => write!(f, "File not found: {}", name),
			StorageError::InvalidName { name } => write!(f, "Invalid file name: {:?}", name),
			StorageError::Io { name, source } => write!(f, "I/O error on {}: {}", name, source),
		}
	}
}

impl Error for StorageError {}

impl StorageError {
	/// Map an I/O error, folding `NotFound` into the dedicated variant
	pub fn from_io(name: &str, e: io::Error) -> Self {
		if e.kind() == io::ErrorKind::NotFound {
			StorageError::NotFound { name: name.to_string() }
		} else {
			StorageError::Io { name: name.to_string(), source: e }
		}
	}
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
	/// Config file could not be read
	Read { path: String, source: io::Error },

	/// Config file could not be parsed
	Parse { path: String, message: String },

	/// A value is out of range
	Invalid { message: String },
}

impl fmt::Display for ConfigError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ConfigError::Read { path, source } => {
				write!(f, "Cannot read config file {}: {}", path, source)
			}
			ConfigError::Parse { path, message } => {
				write!(f, "Cannot parse config file {}: {}", path, message)
			}
			ConfigError::Invalid { message } => write!(f, "Invalid configuration: {}", message),
		}
	}
}

impl Error for ConfigError {}


// vim: ts=4
