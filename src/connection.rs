//! One framed connection, driven by socket readiness
//!
//! Client and server share this engine. It owns the socket, the decoder and
//! the outbound queue; what a packet means is up to the `PacketHandler`.
//! Readiness is awaited with `TcpStream::ready`, then the socket is read or
//! written with the non-blocking `try_*` calls until it would block.

use tokio::io::Interest;
use tokio::net::TcpStream;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::logging::*;
use crate::protocol::{DrainStatus, FrameDecoder, FrameLimits, OutboundQueue, Packet, PacketHandler, ProtocolError};

/// Default size of the per-connection read buffer
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
	Open,
	Closed,
}

/// Connection to a single peer
pub struct Connection<H: PacketHandler> {
	stream: TcpStream,
	peer: String,
	decoder: FrameDecoder,
	outbound: OutboundQueue,
	handler: H,
	read_buf: Vec<u8>,
}

impl<H: PacketHandler> std::fmt::Debug for Connection<H> {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Connection")
			.field("peer", &self.peer)
			.field("stage", &self.decoder.stage())
			.field("queued", &self.outbound.len())
			.finish()
	}
}

impl<H: PacketHandler> Connection<H> {
	pub fn new(stream: TcpStream, handler: H, limits: FrameLimits, read_buffer_size: usize) -> Self {
		let peer = match stream.peer_addr() {
			Ok(addr) => addr.to_string(),
			Err(_) => "unknown".to_string(),
		};
		if let Err(e) = stream.set_nodelay(true) {
			debug!("[{}] Cannot set TCP_NODELAY: {}", peer, e);
		}

		Self {
			stream,
			peer,
			decoder: FrameDecoder::with_limits(limits),
			outbound: OutboundQueue::new(),
			handler,
			read_buf: vec![0u8; read_buffer_size.max(1)],
		}
	}

	/// Run until the peer goes away or the stream breaks.
	///
	/// `commands` carries packets submitted from outside the loop (the
	/// client's requests); receiving on it is what wakes the loop for them.
	/// A close at a packet boundary is `Ok(())`, a close in the middle of a
	/// packet is `ProtocolError::PeerClosed`.
	pub async fn run(mut self, commands: Option<&mut UnboundedReceiver<Packet>>) -> Result<(), ProtocolError> {
		if let Some(packet) = self.handler.on_connect().await {
			self.enqueue(packet);
		}

		let result = self.event_loop(commands).await;
		match &result {
			Ok(()) => debug!("[{}] Connection closed", self.peer),
			Err(e) => debug!("[{}] Connection terminated: {}", self.peer, e),
		}

		self.handler.on_disconnect();
		result
	}

	async fn event_loop(
		&mut self,
		mut commands: Option<&mut UnboundedReceiver<Packet>>,
	) -> Result<(), ProtocolError> {
		let mut commands_open = commands.is_some();

		loop {
			let interest = if self.outbound.wants_write() {
				Interest::READABLE | Interest::WRITABLE
			} else {
				Interest::READABLE
			};

			tokio::select! {
				ready = self.stream.ready(interest) => {
					let ready = ready?;
					if ready.is_readable() && self.read_available().await? == ReadState::Closed {
						return Ok(());
					}
					if ready.is_writable() && self.outbound.wants_write() {
						self.flush()?;
					}
				}
				command = next_command(&mut commands), if commands_open => {
					match command {
						Some(packet) => {
							trace!("[{}] Queued {} from command channel", self.peer, packet.opcode);
							self.enqueue(packet);
						}
						None => {
							// All senders gone; keep serving the socket
							commands_open = false;
						}
					}
				}
			}
		}
	}

	/// Read until the socket would block, dispatching every complete packet
	async fn read_available(&mut self) -> Result<ReadState, ProtocolError> {
		loop {
			let n = match self.stream.try_read(&mut self.read_buf) {
				Ok(0) => {
					if self.decoder.in_progress() {
						return Err(ProtocolError::PeerClosed);
					}
					return Ok(ReadState::Closed);
				}
				Ok(n) => n,
				Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Ok(ReadState::Open),
				Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
				Err(e) => return Err(e.into()),
			};
			trace!("[{}] Read {} bytes", self.peer, n);

			let mut packets = Vec::new();
			let pushed = self.decoder.push(&self.read_buf[..n], &mut packets);

			// Packets completed before a violation are still served
			for packet in packets {
				self.dispatch(packet).await;
			}
			pushed?;
		}
	}

	async fn dispatch(&mut self, packet: Packet) {
		debug!(
			"[{}] Received {} (metadata {} bytes, payload {} bytes)",
			self.peer,
			packet.opcode,
			packet.metadata.len(),
			packet.payload.len()
		);
		if let Some(reply) = self.handler.handle(packet).await {
			self.enqueue(reply);
		}
	}

	fn enqueue(&mut self, packet: Packet) {
		match self.outbound.enqueue(&packet) {
			Ok(true) => trace!("[{}] Write interest raised", self.peer),
			Ok(false) => {}
			Err(e) => error!("[{}] Dropping {}: {}", self.peer, packet.opcode, e),
		}
	}

	/// Write queued bytes until drained or the socket would block
	fn flush(&mut self) -> Result<(), ProtocolError> {
		let stream = &self.stream;
		match self.outbound.drain_with(|buf| stream.try_write(buf))? {
			DrainStatus::Drained => trace!("[{}] Outbound queue drained", self.peer),
			DrainStatus::Pending => {
				trace!("[{}] {} bytes still pending", self.peer, self.outbound.pending_bytes())
			}
		}
		Ok(())
	}
}

async fn next_command(commands: &mut Option<&mut UnboundedReceiver<Packet>>) -> Option<Packet> {
	match commands {
		Some(rx) => rx.recv().await,
		None => std::future::pending().await,
	}
}


// vim: ts=4
