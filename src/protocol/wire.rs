//! Wire format of a dropr packet
//!
//! ```text
//! ┌─────────┬────────┬──────────────┬──────────────┬──────────┬─────────┐
//! │ Magic   │ Opcode │ Metadata len │ Payload len  │ Metadata │ Payload │
//! │ 2 bytes │ 1 byte │ u32 BE       │ u64 BE       │ JSON     │ raw     │
//! └─────────┴────────┴──────────────┴──────────────┴──────────┴─────────┘
//! ```
//!
//! The codec only checks structure (magic, opcode, lengths). What the metadata
//! must contain for a given operation is the dispatcher's business.

use serde::{Deserialize, Serialize};
use std::convert::TryFrom;
use std::fmt;

use super::error::ProtocolError;
use super::metadata::Metadata;

/// Magic constant opening every packet
pub const MAGIC: u16 = 0xCAFE;

/// Fixed header size: magic(2) + opcode(1) + metadata len(4) + payload len(8)
pub const HEADER_SIZE: usize = 15;

/// Packet operation codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Opcode {
	List = 1,
	ListReply = 2,
	Upload = 3,
	UploadOk = 4,
	Download = 5,
	DownloadReply = 6,
	Delete = 7,
	DeleteOk = 8,
	Error = 9,
}

impl Opcode {
	pub fn code(self) -> u8 {
		self as u8
	}

	/// Requests travel client → server, everything else is a reply
	pub fn is_request(self) -> bool {
		matches!(self, Opcode::List | Opcode::Upload | Opcode::Download | Opcode::Delete)
	}

	pub fn name(self) -> &'static str {
		match self {
			Opcode::List => "LIST",
			Opcode::ListReply => "LIST_REPLY",
			Opcode::Upload => "UPLOAD",
			Opcode::UploadOk => "UPLOAD_OK",
			Opcode::Download => "DOWNLOAD",
			Opcode::DownloadReply => "DOWNLOAD_REPLY",
			Opcode::Delete => "DELETE",
			Opcode::DeleteOk => "DELETE_OK",
			Opcode::Error => "ERROR",
		}
	}
}

impl TryFrom<u8> for Opcode {
	type Error = ProtocolError;

	fn try_from(code: u8) -> Result<Self, ProtocolError> {
		match code {
			1 => Ok(Opcode::List),
			2 => Ok(Opcode::ListReply),
			3 => Ok(Opcode::Upload),
			4 => Ok(Opcode::UploadOk),
			5 => Ok(Opcode::Download),
			6 => Ok(Opcode::DownloadReply),
			7 => Ok(Opcode::Delete),
			8 => Ok(Opcode::DeleteOk),
			9 => Ok(Opcode::Error),
			other => {
				Err(ProtocolError::ProtocolViolation(format!("Unknown opcode: {}", other)))
			}
		}
	}
}

impl fmt::Display for Opcode {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

/// Decoded fixed-size packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
	pub opcode: Opcode,
	pub metadata_len: u32,
	pub payload_len: u64,
}

impl Header {
	pub fn new(opcode: Opcode, metadata_len: u32, payload_len: u64) -> Self {
		Self { opcode, metadata_len, payload_len }
	}

	/// Encode header to bytes (Big Endian)
	pub fn encode(&self) -> [u8; HEADER_SIZE] {
		let mut buf = [0u8; HEADER_SIZE];
		buf[0..2].copy_from_slice(&MAGIC.to_be_bytes());
		buf[2] = self.opcode.code();
		buf[3..7].copy_from_slice(&self.metadata_len.to_be_bytes());
		buf[7..15].copy_from_slice(&self.payload_len.to_be_bytes());
		buf
	}

	/// Decode a complete header, rejecting a wrong magic or an unknown opcode
	pub fn decode(buf: &[u8; HEADER_SIZE]) -> Result<Self, ProtocolError> {
		let magic = u16::from_be_bytes([buf[0], buf[1]]);
		if magic != MAGIC {
			return Err(ProtocolError::ProtocolViolation(format!(
				"Invalid magic 0x{:04X} (expected 0x{:04X})",
				magic, MAGIC
			)));
		}

		let opcode = Opcode::try_from(buf[2])?;
		let metadata_len = u32::from_be_bytes([buf[3], buf[4], buf[5], buf[6]]);
		let mut payload_len = [0u8; 8];
		payload_len.copy_from_slice(&buf[7..15]);

		Ok(Self { opcode, metadata_len, payload_len: u64::from_be_bytes(payload_len) })
	}

	/// Bytes that follow the header
	pub fn body_len(&self) -> Result<u64, ProtocolError> {
		self.payload_len.checked_add(u64::from(self.metadata_len)).ok_or_else(|| {
			ProtocolError::ProtocolViolation(format!(
				"Body length overflows: metadata {} + payload {}",
				self.metadata_len, self.payload_len
			))
		})
	}
}

/// One complete protocol message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
	pub opcode: Opcode,
	/// UTF-8 JSON metadata record (may be empty)
	pub metadata: Vec<u8>,
	/// Raw binary payload (may be empty)
	pub payload: Vec<u8>,
}

impl Packet {
	pub fn new(opcode: Opcode, metadata: Vec<u8>, payload: Vec<u8>) -> Self {
		Self { opcode, metadata, payload }
	}

	/// Build a packet whose opcode is taken from the record's operation
	pub fn from_metadata(metadata: &Metadata, payload: Vec<u8>) -> Result<Self, ProtocolError> {
		Ok(Self { opcode: metadata.operation, metadata: metadata.to_json()?, payload })
	}

	/// Parse the metadata record; an empty section yields a bare record for the opcode
	pub fn metadata(&self) -> Result<Metadata, ProtocolError> {
		if self.metadata.is_empty() {
			return Ok(Metadata::new(self.opcode));
		}
		Metadata::from_json(&self.metadata)
	}

	/// Header describing this packet; metadata must fit the 32-bit length field
	pub fn header(&self) -> Result<Header, ProtocolError> {
		Ok(Header::new(self.opcode, metadata_len_field(self.metadata.len())?, self.payload.len() as u64))
	}

	pub fn encoded_len(&self) -> usize {
		HEADER_SIZE + self.metadata.len() + self.payload.len()
	}

	/// Flatten the packet into its on-wire byte sequence
	pub fn encode(&self) -> Result<Vec<u8>, ProtocolError> {
		let header = self.header()?;
		let mut buf = Vec::with_capacity(self.encoded_len());
		buf.extend_from_slice(&header.encode());
		buf.extend_from_slice(&self.metadata);
		buf.extend_from_slice(&self.payload);
		Ok(buf)
	}

	/// Decode one packet from a buffer holding exactly its bytes
	pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
		if buf.len() < HEADER_SIZE {
			return Err(ProtocolError::ProtocolViolation(format!(
				"Buffer of {} bytes is shorter than the {}-byte header",
				buf.len(),
				HEADER_SIZE
			)));
		}

		let mut raw = [0u8; HEADER_SIZE];
		raw.copy_from_slice(&buf[..HEADER_SIZE]);
		let header = Header::decode(&raw)?;

		let body = &buf[HEADER_SIZE..];
		let body_len = header.body_len()?;
		if body.len() as u64 != body_len {
			return Err(ProtocolError::ProtocolViolation(format!(
				"Expected {} bytes after header, got {}",
				body_len,
				body.len()
			)));
		}

		let (metadata, payload) = body.split_at(header.metadata_len as usize);
		Ok(Self::new(header.opcode, metadata.to_vec(), payload.to_vec()))
	}
}

fn metadata_len_field(len: usize) -> Result<u32, ProtocolError> {
	u32::try_from(len).map_err(|_| {
		ProtocolError::ProtocolViolation(format!("Metadata of {} bytes does not fit the length field", len))
	})
}


// vim: ts=4
