//! Incremental packet decoder
//!
//! Bytes arrive in whatever chunks the socket hands out. The decoder keeps a
//! cursor over three stages and only appends to the buffer of the current stage:
//!
//! - `AwaitingHeader`: fill the fixed 15-byte header
//! - `AwaitingMetadata`: fill a buffer of exactly `metadata_len` bytes
//! - `AwaitingPayload`: fill a buffer of exactly `payload_len` bytes
//!
//! A single push may complete any number of stages and packets. Buffers are
//! sized only after the header announcing them is complete and within limits.

use std::cmp;
use std::convert::TryFrom;

use super::error::ProtocolError;
use super::wire::{Header, Packet, HEADER_SIZE};

/// Default upper bound on the metadata section (1 MiB)
pub const DEFAULT_MAX_METADATA_LEN: u32 = 1024 * 1024;

/// Default upper bound on the payload section (1 GiB)
pub const DEFAULT_MAX_PAYLOAD_LEN: u64 = 1024 * 1024 * 1024;

/// Largest lengths a peer may announce before the connection is dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLimits {
	pub max_metadata_len: u32,
	pub max_payload_len: u64,
}

impl Default for FrameLimits {
	fn default() -> Self {
		Self { max_metadata_len: DEFAULT_MAX_METADATA_LEN, max_payload_len: DEFAULT_MAX_PAYLOAD_LEN }
	}
}

impl FrameLimits {
	fn check(&self, header: &Header) -> Result<(), ProtocolError> {
		if header.metadata_len > self.max_metadata_len {
			return Err(ProtocolError::ProtocolViolation(format!(
				"Metadata length {} exceeds maximum {}",
				header.metadata_len, self.max_metadata_len
			)));
		}
		if header.payload_len > self.max_payload_len {
			return Err(ProtocolError::ProtocolViolation(format!(
				"Payload length {} exceeds maximum {}",
				header.payload_len, self.max_payload_len
			)));
		}
		Ok(())
	}
}

/// Current framing stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
	AwaitingHeader,
	AwaitingMetadata,
	AwaitingPayload,
}

/// Per-connection read cursor
#[derive(Debug)]
pub struct FrameDecoder {
	stage: Stage,
	limits: FrameLimits,
	header_buf: [u8; HEADER_SIZE],
	header_filled: usize,
	/// Header of the packet being assembled (set outside `AwaitingHeader`)
	current: Option<Header>,
	metadata: Vec<u8>,
	/// Allocated on first entry into `AwaitingPayload`
	payload: Option<Vec<u8>>,
	payload_len: usize,
}

impl FrameDecoder {
	pub fn new() -> Self {
		Self::with_limits(FrameLimits::default())
	}

	pub fn with_limits(limits: FrameLimits) -> Self {
		Self {
			stage: Stage::AwaitingHeader,
			limits,
			header_buf: [0u8; HEADER_SIZE],
			header_filled: 0,
			current: None,
			metadata: Vec::new(),
			payload: None,
			payload_len: 0,
		}
	}

	pub fn stage(&self) -> Stage {
		self.stage
	}

	/// True while part of a packet has been received but not dispatched
	pub fn in_progress(&self) -> bool {
		self.stage != Stage::AwaitingHeader || self.header_filled > 0
	}

	/// Consume `data`, appending every completed packet to `out`
	///
	/// All bytes are consumed unless an error is returned. Packets completed
	/// before the error are still in `out`; the decoder must not be used again
	/// after an error since the stream position is lost.
	pub fn push(&mut self, mut data: &[u8], out: &mut Vec<Packet>) -> Result<(), ProtocolError> {
		loop {
			match self.stage {
				Stage::AwaitingHeader => {
					let take = cmp::min(HEADER_SIZE - self.header_filled, data.len());
					self.header_buf[self.header_filled..self.header_filled + take]
						.copy_from_slice(&data[..take]);
					self.header_filled += take;
					data = &data[take..];

					if self.header_filled < HEADER_SIZE {
						return Ok(());
					}
					self.header_filled = 0;
					self.on_header(out)?;
				}

				Stage::AwaitingMetadata => {
					let header = self.header()?;
					let want = header.metadata_len as usize - self.metadata.len();
					let take = cmp::min(want, data.len());
					self.metadata.extend_from_slice(&data[..take]);
					data = &data[take..];

					if take < want {
						return Ok(());
					}
					if header.payload_len > 0 {
						self.stage = Stage::AwaitingPayload;
					} else {
						self.finish(out)?;
					}
				}

				Stage::AwaitingPayload => {
					let payload_len = self.payload_len;
					let payload = self.payload.get_or_insert_with(|| Vec::with_capacity(payload_len));
					let take = cmp::min(payload_len - payload.len(), data.len());
					payload.extend_from_slice(&data[..take]);
					data = &data[take..];

					if payload.len() < payload_len {
						return Ok(());
					}
					self.finish(out)?;
				}
			}

			if data.is_empty() && self.stage == Stage::AwaitingHeader {
				return Ok(());
			}
		}
	}

	/// Header buffer is full: validate it and pick the next stage
	fn on_header(&mut self, out: &mut Vec<Packet>) -> Result<(), ProtocolError> {
		let header = Header::decode(&self.header_buf)?;
		self.limits.check(&header)?;

		self.payload_len = usize::try_from(header.payload_len).map_err(|_| {
			ProtocolError::ProtocolViolation(format!(
				"Payload length {} does not fit in memory",
				header.payload_len
			))
		})?;
		self.metadata = Vec::with_capacity(header.metadata_len as usize);
		self.payload = None;
		self.current = Some(header);

		match (header.metadata_len, header.payload_len) {
			(0, 0) => self.finish(out),
			(0, _) => {
				self.stage = Stage::AwaitingPayload;
				Ok(())
			}
			_ => {
				self.stage = Stage::AwaitingMetadata;
				Ok(())
			}
		}
	}

	/// Hand over the assembled packet and rearm for the next header
	fn finish(&mut self, out: &mut Vec<Packet>) -> Result<(), ProtocolError> {
		let header = self.header()?;
		let metadata = std::mem::take(&mut self.metadata);
		let payload = self.payload.take().unwrap_or_default();

		out.push(Packet::new(header.opcode, metadata, payload));

		self.current = None;
		self.payload_len = 0;
		self.stage = Stage::AwaitingHeader;
		Ok(())
	}

	fn header(&self) -> Result<Header, ProtocolError> {
		self.current.ok_or_else(|| {
			ProtocolError::ProtocolViolation("Decoder lost the current header".to_string())
		})
	}
}

impl Default for FrameDecoder {
	fn default() -> Self {
		Self::new()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::protocol::metadata::{Metadata, Status};
	use crate::protocol::wire::Opcode;

	fn upload_packet() -> Packet {
		let mut meta = Metadata::for_file(Opcode::Upload, "x.bin");
		meta.size = Some(5);
		Packet::from_metadata(&meta, vec![1, 2, 3, 4, 5]).unwrap()
	}

	fn feed_in_chunks(bytes: &[u8], chunk: usize) -> Vec<Packet> {
		let mut decoder = FrameDecoder::new();
		let mut out = Vec::new();
		for piece in bytes.chunks(chunk) {
			decoder.push(piece, &mut out).unwrap();
		}
		assert!(!decoder.in_progress());
		out
	}

	#[test]
	fn test_single_packet_in_one_push() {
		let packet = upload_packet();
		let out = feed_in_chunks(&packet.encode().unwrap(), usize::MAX);
		assert_eq!(out, vec![packet]);
	}

	#[test]
	fn test_byte_at_a_time() {
		let packet = upload_packet();
		let bytes = packet.encode().unwrap();

		let mut decoder = FrameDecoder::new();
		let mut out = Vec::new();
		for (i, byte) in bytes.iter().enumerate() {
			decoder.push(&[*byte], &mut out).unwrap();
			if i + 1 < bytes.len() {
				assert!(out.is_empty(), "dispatched early at byte {}", i);
			}
		}
		assert_eq!(out, vec![packet]);
	}

	#[test]
	fn test_any_chunking_yields_the_same_packets() {
		let meta = Metadata::reply(Opcode::ListReply, Status::Ok, "File list retrieved");
		let packets = vec![
			upload_packet(),
			Packet::new(Opcode::List, Vec::new(), Vec::new()),
			Packet::from_metadata(&meta, Vec::new()).unwrap(),
			Packet::new(Opcode::DownloadReply, Vec::new(), vec![7; 33]),
		];
		let stream: Vec<u8> = packets.iter().flat_map(|p| p.encode().unwrap()).collect();

		for chunk in 1..=stream.len() {
			assert_eq!(feed_in_chunks(&stream, chunk), packets, "chunk size {}", chunk);
		}
	}

	#[test]
	fn test_stage_transitions() {
		let packet = upload_packet();
		let bytes = packet.encode().unwrap();
		let mut decoder = FrameDecoder::new();
		let mut out = Vec::new();

		decoder.push(&bytes[..HEADER_SIZE - 1], &mut out).unwrap();
		assert_eq!(decoder.stage(), Stage::AwaitingHeader);
		assert!(decoder.in_progress());

		decoder.push(&bytes[HEADER_SIZE - 1..HEADER_SIZE + 1], &mut out).unwrap();
		assert_eq!(decoder.stage(), Stage::AwaitingMetadata);

		let payload_start = HEADER_SIZE + packet.metadata.len();
		decoder.push(&bytes[HEADER_SIZE + 1..payload_start], &mut out).unwrap();
		assert_eq!(decoder.stage(), Stage::AwaitingPayload);
		assert!(out.is_empty());

		decoder.push(&bytes[payload_start..], &mut out).unwrap();
		assert_eq!(decoder.stage(), Stage::AwaitingHeader);
		assert_eq!(out, vec![packet]);
	}

	#[test]
	fn test_header_only_packet_dispatches_immediately() {
		let packet = Packet::new(Opcode::List, Vec::new(), Vec::new());
		let mut decoder = FrameDecoder::new();
		let mut out = Vec::new();
		decoder.push(&packet.encode().unwrap(), &mut out).unwrap();
		assert_eq!(out, vec![packet]);
		assert_eq!(decoder.stage(), Stage::AwaitingHeader);
	}

	#[test]
	fn test_payload_without_metadata_skips_metadata_stage() {
		let packet = Packet::new(Opcode::DownloadReply, Vec::new(), vec![1, 2, 3]);
		let bytes = packet.encode().unwrap();
		let mut decoder = FrameDecoder::new();
		let mut out = Vec::new();

		decoder.push(&bytes[..HEADER_SIZE], &mut out).unwrap();
		assert_eq!(decoder.stage(), Stage::AwaitingPayload);
		decoder.push(&bytes[HEADER_SIZE..], &mut out).unwrap();
		assert_eq!(out, vec![packet]);
	}

	#[test]
	fn test_bad_magic_is_fatal_and_dispatches_nothing() {
		let mut bytes = upload_packet().encode().unwrap();
		bytes[0] = 0xBE;
		bytes[1] = 0xEF;

		let mut decoder = FrameDecoder::new();
		let mut out = Vec::new();
		let err = decoder.push(&bytes, &mut out).unwrap_err();
		assert!(matches!(err, ProtocolError::ProtocolViolation(_)));
		assert!(out.is_empty());
	}

	#[test]
	fn test_packets_before_violation_are_kept() {
		let good = Packet::new(Opcode::List, Vec::new(), Vec::new());
		let mut bytes = good.encode().unwrap();
		let mut bad = good.encode().unwrap();
		bad[2] = 0x7F;
		bytes.extend_from_slice(&bad);

		let mut decoder = FrameDecoder::new();
		let mut out = Vec::new();
		let err = decoder.push(&bytes, &mut out).unwrap_err();
		assert!(err.to_string().contains("Unknown opcode"));
		assert_eq!(out, vec![good]);
	}

	#[test]
	fn test_limits_reject_before_allocation() {
		let limits = FrameLimits { max_metadata_len: 16, max_payload_len: 100 };

		let header = Header::new(Opcode::Upload, 17, 0).encode();
		let mut decoder = FrameDecoder::with_limits(limits);
		let err = decoder.push(&header, &mut Vec::new()).unwrap_err();
		assert!(err.to_string().contains("Metadata length 17 exceeds maximum 16"));

		let header = Header::new(Opcode::Upload, 2, u64::MAX).encode();
		let mut decoder = FrameDecoder::with_limits(limits);
		let err = decoder.push(&header, &mut Vec::new()).unwrap_err();
		assert!(err.to_string().contains("exceeds maximum 100"));
	}

	#[test]
	fn test_truncated_stream_never_dispatches() {
		let bytes = upload_packet().encode().unwrap();
		let mut decoder = FrameDecoder::new();
		let mut out = Vec::new();
		decoder.push(&bytes[..bytes.len() - 1], &mut out).unwrap();
		assert!(out.is_empty());
		assert!(decoder.in_progress());
	}
}

// vim: ts=4
