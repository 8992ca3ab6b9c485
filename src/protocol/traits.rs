//! The one capability that differs between client and server
//!
//! The connection engine frames, buffers and writes packets the same way on
//! both sides. What happens to a decoded packet is delegated to a
//! `PacketHandler`: the server answers requests, the client presents replies.

use async_trait::async_trait;

use super::wire::Packet;

#[async_trait]
pub trait PacketHandler: Send {
	/// Packet pushed unsolicited right after the connection is established
	async fn on_connect(&mut self) -> Option<Packet> {
		None
	}

	/// Handle one fully decoded packet, producing at most one outbound packet
	async fn handle(&mut self, packet: Packet) -> Option<Packet>;

	/// Called once when the connection ends, whatever the reason
	fn on_disconnect(&mut self) {}
}

// vim: ts=4
