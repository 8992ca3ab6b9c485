//! Structured metadata record carried between the header and the payload

use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::ProtocolError;
use super::wire::Opcode;

/// Outcome reported by the server in every reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
	Ok,
	Fail,
	NotFound,
}

impl fmt::Display for Status {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Status::Ok => write!(f, "OK"),
			Status::Fail => write!(f, "FAIL"),
			Status::NotFound => write!(f, "NOT_FOUND"),
		}
	}
}

/// Metadata record; which optional fields are set depends on the operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
	pub operation: Opcode,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub file_name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub size: Option<u64>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub status: Option<Status>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub message: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub files: Option<Vec<String>>,
}

impl Metadata {
	/// Record carrying only the operation
	pub fn new(operation: Opcode) -> Self {
		Self { operation, file_name: None, size: None, status: None, message: None, files: None }
	}

	/// Request naming a file (DOWNLOAD, DELETE)
	pub fn for_file(operation: Opcode, file_name: &str) -> Self {
		Self { file_name: Some(file_name.to_string()), ..Self::new(operation) }
	}

	/// Reply with a status and a human-readable message
	pub fn reply(operation: Opcode, status: Status, message: impl Into<String>) -> Self {
		Self { status: Some(status), message: Some(message.into()), ..Self::new(operation) }
	}

	pub fn to_json(&self) -> Result<Vec<u8>, ProtocolError> {
		Ok(serde_json::to_vec(self)?)
	}

	pub fn from_json(bytes: &[u8]) -> Result<Self, ProtocolError> {
		Ok(serde_json::from_slice(bytes)?)
	}

	pub fn status_or_fail(&self) -> Status {
		self.status.unwrap_or(Status::Fail)
	}

	pub fn message_or_empty(&self) -> &str {
		self.message.as_deref().unwrap_or("")
	}
}


// vim: ts=4
