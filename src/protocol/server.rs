//! Request handling on the server side
//!
//! Every request gets exactly one reply. Storage failures never escape: they
//! become a `FAIL` / `NOT_FOUND` status on the reply while the connection
//! stays open.

use async_trait::async_trait;
use std::sync::Arc;

use super::metadata::{Metadata, Status};
use super::traits::PacketHandler;
use super::wire::{Opcode, Packet};
use crate::error::StorageError;
use crate::logging::*;
use crate::storage::{DeleteOutcome, Storage};

/// Maps LIST / UPLOAD / DOWNLOAD / DELETE onto storage calls
pub struct RequestDispatcher {
	storage: Arc<dyn Storage>,
	peer: String,
}

impl RequestDispatcher {
	pub fn new(storage: Arc<dyn Storage>, peer: impl Into<String>) -> Self {
		Self { storage, peer: peer.into() }
	}

	/// Build the reply for one request
	pub async fn dispatch(&self, packet: Packet) -> (Metadata, Vec<u8>) {
		let request = match packet.metadata() {
			Ok(meta) => meta,
			Err(e) => {
				return error_reply(format!("Malformed metadata: {}", e));
			}
		};
		debug!("[{}] Got operation: {}", self.peer, packet.opcode);

		match packet.opcode {
			Opcode::List => self.handle_list().await,
			Opcode::Upload => self.handle_upload(&request, packet.payload).await,
			Opcode::Download => self.handle_download(&request).await,
			Opcode::Delete => self.handle_delete(&request).await,
			other => error_reply(format!("Unsupported operation: {}", other)),
		}
	}

	/// LIST_REPLY with the current file names (also the welcome push)
	pub async fn handle_list(&self) -> (Metadata, Vec<u8>) {
		match self.storage.list().await {
			Ok(files) => {
				let mut reply = Metadata::reply(Opcode::ListReply, Status::Ok, "File list retrieved");
				reply.files = Some(files);
				(reply, Vec::new())
			}
			Err(e) => error_reply(format!("Cannot list files: {}", e)),
		}
	}

	async fn handle_upload(&self, request: &Metadata, payload: Vec<u8>) -> (Metadata, Vec<u8>) {
		let name = match request.file_name.as_deref() {
			Some(name) if !payload.is_empty() => name,
			_ => return upload_reply(Status::Fail, "Missing file or metadata"),
		};

		if let Some(size) = request.size {
			if size != payload.len() as u64 {
				return upload_reply(
					Status::Fail,
					format!("Size mismatch: declared {}, received {}", size, payload.len()),
				);
			}
		}

		match self.storage.write(name, &payload).await {
			Ok(()) => {
				info!("[{}] Saved file: {} ({} bytes)", self.peer, name, payload.len());
				upload_reply(Status::Ok, format!("File uploaded: {}", name))
			}
			Err(e) => {
				warn!("[{}] Upload of {} failed: {}", self.peer, name, e);
				upload_reply(Status::Fail, e.to_string())
			}
		}
	}

	async fn handle_download(&self, request: &Metadata) -> (Metadata, Vec<u8>) {
		let name = match request.file_name.as_deref() {
			Some(name) => name,
			None => return error_reply("Filename is missing"),
		};

		match self.storage.read(name).await {
			Ok(data) => {
				let mut reply = Metadata::reply(Opcode::DownloadReply, Status::Ok, "File sent");
				reply.file_name = Some(name.to_string());
				reply.size = Some(data.len() as u64);
				(reply, data)
			}
			Err(e @ StorageError::NotFound { .. }) => error_reply(e.to_string()),
			Err(e) => error_reply(format!("Download of {} failed: {}", name, e)),
		}
	}

	async fn handle_delete(&self, request: &Metadata) -> (Metadata, Vec<u8>) {
		let name = match request.file_name.as_deref() {
			Some(name) => name,
			None => return delete_reply(Status::Fail, "Filename is missing"),
		};

		match self.storage.delete(name).await {
			Ok(DeleteOutcome::Deleted) => {
				info!("[{}] Deleted file: {}", self.peer, name);
				delete_reply(Status::Ok, format!("File deleted: {}", name))
			}
			Ok(DeleteOutcome::NotFound) => delete_reply(Status::NotFound, "File does not exist"),
			Err(e) => delete_reply(Status::Fail, format!("Failed to delete file: {}", e)),
		}
	}
}

fn error_reply(message: impl Into<String>) -> (Metadata, Vec<u8>) {
	let message = message.into();
	warn!("Replying with error: {}", message);
	(Metadata::reply(Opcode::Error, Status::Fail, message), Vec::new())
}

fn upload_reply(status: Status, message: impl Into<String>) -> (Metadata, Vec<u8>) {
	(Metadata::reply(Opcode::UploadOk, status, message), Vec::new())
}

fn delete_reply(status: Status, message: impl Into<String>) -> (Metadata, Vec<u8>) {
	(Metadata::reply(Opcode::DeleteOk, status, message), Vec::new())
}

/// Encode a reply, logging instead of failing the connection
fn into_packet(reply: (Metadata, Vec<u8>)) -> Option<Packet> {
	let (meta, payload) = reply;
	match Packet::from_metadata(&meta, payload) {
		Ok(packet) => Some(packet),
		Err(e) => {
			error!("Cannot encode {} reply: {}", meta.operation, e);
			None
		}
	}
}

#[async_trait]
impl PacketHandler for RequestDispatcher {
	async fn on_connect(&mut self) -> Option<Packet> {
		into_packet(self.handle_list().await)
	}

	async fn handle(&mut self, packet: Packet) -> Option<Packet> {
		into_packet(self.dispatch(packet).await)
	}
}


// vim: ts=4
