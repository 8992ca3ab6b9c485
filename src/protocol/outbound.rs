//! Per-connection outbound queue
//!
//! Packets are encoded once on enqueue and written strictly in order. Each
//! write-readiness callback pushes as many bytes as the socket takes; a packet
//! that is only partly sent stays at the head until the next callback.
//!
//! The queue is independent of the socket type: `drain_with` takes the
//! non-blocking write as a closure, so the reactor passes
//! `|buf| stream.try_write(buf)` and tests pass a fake sink.

use std::collections::VecDeque;
use std::io;

use super::error::ProtocolError;
use super::wire::Packet;

/// An encoded packet and how much of it has gone out
#[derive(Debug)]
struct PendingPacket {
	bytes: Vec<u8>,
	sent: usize,
}

impl PendingPacket {
	fn remaining(&self) -> &[u8] {
		&self.bytes[self.sent..]
	}

	fn is_complete(&self) -> bool {
		self.sent == self.bytes.len()
	}
}

/// Result of one drain pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainStatus {
	/// Everything was written, write interest dropped
	Drained,
	/// Socket buffer is full; keep watching for write readiness
	Pending,
}

#[derive(Debug, Default)]
pub struct OutboundQueue {
	queue: VecDeque<PendingPacket>,
	write_interest: bool,
}

impl OutboundQueue {
	pub fn new() -> Self {
		Self::default()
	}

	/// Queue a packet for transmission
	///
	/// Returns `true` when write interest was not yet requested, i.e. the
	/// caller has to start watching (and possibly wake) the reactor. A packet
	/// that cannot be encoded is not queued.
	pub fn enqueue(&mut self, packet: &Packet) -> Result<bool, ProtocolError> {
		self.queue.push_back(PendingPacket { bytes: packet.encode()?, sent: 0 });
		if self.write_interest {
			Ok(false)
		} else {
			self.write_interest = true;
			Ok(true)
		}
	}

	/// Whether the reactor should watch for write readiness
	pub fn wants_write(&self) -> bool {
		self.write_interest
	}

	pub fn len(&self) -> usize {
		self.queue.len()
	}

	pub fn is_empty(&self) -> bool {
		self.queue.is_empty()
	}

	/// Bytes still waiting to be written across all queued packets
	pub fn pending_bytes(&self) -> usize {
		self.queue.iter().map(|p| p.bytes.len() - p.sent).sum()
	}

	/// Write queued bytes until the queue is empty or the sink would block
	pub fn drain_with<F>(&mut self, mut write: F) -> io::Result<DrainStatus>
	where
		F: FnMut(&[u8]) -> io::Result<usize>,
	{
		while let Some(head) = self.queue.front_mut() {
			match write(head.remaining()) {
				Ok(0) => {
					return Err(io::Error::new(
						io::ErrorKind::WriteZero,
						"socket accepted zero bytes",
					));
				}
				Ok(n) => {
					head.sent += n;
					if head.is_complete() {
						self.queue.pop_front();
					}
				}
				Err(ref e) if e.kind() == io::ErrorKind::WouldBlock => {
					return Ok(DrainStatus::Pending);
				}
				Err(ref e) if e.kind() == io::ErrorKind::Interrupted => continue,
				Err(e) => return Err(e),
			}
		}

		self.write_interest = false;
		Ok(DrainStatus::Drained)
	}
}


// vim: ts=4
