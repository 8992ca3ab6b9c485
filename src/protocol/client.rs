//! Reply handling on the client side
//!
//! The client never answers the server. Decoded replies are turned into
//! `ClientEvent`s for whoever presents them; downloads are persisted first.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

use super::error::ProtocolError;
use super::metadata::{Metadata, Status};
use super::traits::PacketHandler;
use super::wire::{Opcode, Packet};
use crate::logging::*;
use crate::storage::Storage;

/// Notifications delivered to the presentation thread
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
	/// Network loop established a connection
	Connected { addr: String },

	/// Connection ended; the loop will retry unless shut down
	Disconnected { reason: String },

	/// Current server file list (pushed on connect and after LIST)
	FileList(Vec<String>),

	Uploaded { status: Status, message: String },

	Deleted { status: Status, message: String },

	/// Downloaded file persisted in the download directory
	Downloaded { file_name: String, size: u64 },

	/// Download arrived but could not be stored locally
	DownloadFailed { file_name: String, message: String },

	ServerError { status: Status, message: String },
}

/// Presents replies and stores downloads
pub struct ReplyDispatcher {
	downloads: Arc<dyn Storage>,
	events: UnboundedSender<ClientEvent>,
}

impl ReplyDispatcher {
	pub fn new(downloads: Arc<dyn Storage>, events: UnboundedSender<ClientEvent>) -> Self {
		Self { downloads, events }
	}

	/// Turn one reply into at most one event
	pub async fn dispatch(&self, packet: Packet) -> Result<Option<ClientEvent>, ProtocolError> {
		if packet.opcode.is_request() {
			warn!("Ignoring request {} sent by server", packet.opcode);
			return Ok(None);
		}

		let reply = packet.metadata()?;
		debug!("Got operation: {}", packet.opcode);

		let event = match packet.opcode {
			Opcode::ListReply => match reply.files {
				Some(files) => ClientEvent::FileList(files),
				None => {
					return Err(ProtocolError::MalformedReply(
						"LIST_REPLY without a file list".to_string(),
					))
				}
			},
			Opcode::UploadOk => ClientEvent::Uploaded {
				status: reply.status_or_fail(),
				message: reply.message_or_empty().to_string(),
			},
			Opcode::DeleteOk => ClientEvent::Deleted {
				status: reply.status_or_fail(),
				message: reply.message_or_empty().to_string(),
			},
			Opcode::DownloadReply => return Ok(self.store_download(&reply, packet.payload).await),
			Opcode::Error => ClientEvent::ServerError {
				status: reply.status_or_fail(),
				message: reply.message_or_empty().to_string(),
			},
			// Requests were filtered above
			_ => return Ok(None),
		};
		Ok(Some(event))
	}

	async fn store_download(&self, reply: &Metadata, payload: Vec<u8>) -> Option<ClientEvent> {
		let (file_name, size) = match (reply.file_name.as_deref(), reply.size) {
			(Some(name), Some(size)) if size > 0 && !payload.is_empty() => (name, size),
			_ => {
				warn!("Invalid DOWNLOAD_REPLY");
				return None;
			}
		};

		match self.downloads.write(file_name, &payload).await {
			Ok(()) => {
				info!("File downloaded: {} ({} bytes)", file_name, size);
				Some(ClientEvent::Downloaded { file_name: file_name.to_string(), size })
			}
			Err(e) => {
				warn!("Failed to save file {}: {}", file_name, e);
				Some(ClientEvent::DownloadFailed {
					file_name: file_name.to_string(),
					message: e.to_string(),
				})
			}
		}
	}

	fn emit(&self, event: ClientEvent) {
		// Presentation side may already be gone during shutdown
		if self.events.send(event).is_err() {
			debug!("Event receiver dropped");
		}
	}
}

#[async_trait]
impl PacketHandler for ReplyDispatcher {
	async fn handle(&mut self, packet: Packet) -> Option<Packet> {
		match self.dispatch(packet).await {
			Ok(Some(event)) => self.emit(event),
			Ok(None) => {}
			Err(e) => warn!("Discarding reply: {}", e),
		}
		None
	}
}


// vim: ts=4
