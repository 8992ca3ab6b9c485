//! Client side: reconnecting network loop and the handle used to drive it
//!
//! The loop runs on its own runtime thread. Other threads talk to it only
//! through channels: requests go in through a `ClientHandle`, reply
//! notifications come out as `ClientEvent`s.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::sync::Notify;

use crate::config::{Config, DEFAULT_RECONNECT_DELAY_MS};
use crate::connection::{Connection, DEFAULT_READ_BUFFER_SIZE};
use crate::error::{ConnectionError, DropError, StorageError};
use crate::logging::*;
use crate::protocol::{ClientEvent, FrameLimits, Metadata, Opcode, Packet, ProtocolError, ReplyDispatcher};
use crate::storage::{validate_name, Storage};

/// Cloneable, thread-safe request submitter
#[derive(Debug, Clone)]
pub struct ClientHandle {
	packets: UnboundedSender<Packet>,
	shutdown: Arc<Notify>,
}

impl ClientHandle {
	pub fn list(&self) -> Result<(), DropError> {
		self.submit(Metadata::new(Opcode::List), Vec::new())
	}

	pub fn upload(&self, name: &str, data: Vec<u8>) -> Result<(), DropError> {
		validate_name(name)?;
		let mut meta = Metadata::for_file(Opcode::Upload, name);
		meta.size = Some(data.len() as u64);
		self.submit(meta, data)
	}

	/// Upload a local file under its own file name
	pub fn upload_file(&self, path: &Path) -> Result<(), DropError> {
		let name = path
			.file_name()
			.and_then(|n| n.to_str())
			.ok_or_else(|| StorageError::InvalidName { name: path.display().to_string() })?;
		let data = std::fs::read(path)?;
		self.upload(name, data)
	}

	pub fn download(&self, name: &str) -> Result<(), DropError> {
		self.submit(Metadata::for_file(Opcode::Download, name), Vec::new())
	}

	pub fn delete(&self, name: &str) -> Result<(), DropError> {
		self.submit(Metadata::for_file(Opcode::Delete, name), Vec::new())
	}

	/// Stop the network loop (takes effect even if it is not waiting yet)
	pub fn shutdown(&self) {
		self.shutdown.notify_one();
	}

	fn submit(&self, meta: Metadata, payload: Vec<u8>) -> Result<(), DropError> {
		let packet = Packet::from_metadata(&meta, payload)?;
		self.packets.send(packet).map_err(|_| ConnectionError::Disconnected)?;
		Ok(())
	}
}

/// Reconnecting client network loop
pub struct Client {
	addr: String,
	downloads: Arc<dyn Storage>,
	limits: FrameLimits,
	read_buffer_size: usize,
	reconnect_delay: Duration,
	packets: UnboundedReceiver<Packet>,
	events: UnboundedSender<ClientEvent>,
	shutdown: Arc<Notify>,
}

impl Client {
	/// Create the loop, its handle and the event stream for presentation
	pub fn new(
		addr: impl Into<String>,
		downloads: Arc<dyn Storage>,
	) -> (Self, ClientHandle, UnboundedReceiver<ClientEvent>) {
		let (packet_tx, packet_rx) = mpsc::unbounded_channel();
		let (event_tx, event_rx) = mpsc::unbounded_channel();
		let shutdown = Arc::new(Notify::new());

		let client = Self {
			addr: addr.into(),
			downloads,
			limits: FrameLimits::default(),
			read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
			reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
			packets: packet_rx,
			events: event_tx,
			shutdown: shutdown.clone(),
		};
		let handle = ClientHandle { packets: packet_tx, shutdown };
		(client, handle, event_rx)
	}

	pub fn from_config(
		config: &Config,
		downloads: Arc<dyn Storage>,
	) -> (Self, ClientHandle, UnboundedReceiver<ClientEvent>) {
		let (client, handle, events) = Self::new(config.server_addr.clone(), downloads);
		let client = client
			.with_limits(config.limits())
			.with_read_buffer_size(config.read_buffer_size)
			.with_reconnect_delay(config.reconnect_delay());
		(client, handle, events)
	}

	pub fn with_limits(mut self, limits: FrameLimits) -> Self {
		self.limits = limits;
		self
	}

	pub fn with_read_buffer_size(mut self, size: usize) -> Self {
		self.read_buffer_size = size;
		self
	}

	pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
		self.reconnect_delay = delay;
		self
	}

	/// Connect, serve the connection, wait, repeat until shut down
	pub async fn run(mut self) {
		let shutdown = self.shutdown.clone();

		loop {
			info!("Connecting to server {}...", self.addr);
			tokio::select! {
				_ = shutdown.notified() => break,
				result = self.session() => {
					if let Err(e) = result {
						warn!("Connection error: {}", e);
					}
				}
			}

			info!("Reconnecting in {} ms...", self.reconnect_delay.as_millis());
			tokio::select! {
				_ = shutdown.notified() => break,
				_ = tokio::time::sleep(self.reconnect_delay) => {}
			}
		}

		info!("Client stopped");
	}

	/// One connection lifetime
	async fn session(&mut self) -> Result<(), DropError> {
		let stream = TcpStream::connect(&self.addr)
			.await
			.map_err(|e| ConnectionError::ConnectFailed { addr: self.addr.clone(), source: e })?;
		info!("Connected to server {}", self.addr);
		self.emit(ClientEvent::Connected { addr: self.addr.clone() });

		let handler = ReplyDispatcher::new(self.downloads.clone(), self.events.clone());
		let conn = Connection::new(stream, handler, self.limits, self.read_buffer_size);
		let result = conn.run(Some(&mut self.packets)).await;

		let reason = match &result {
			Ok(()) => "Server closed connection".to_string(),
			Err(ProtocolError::PeerClosed) => "Server closed connection mid-packet".to_string(),
			Err(e) => e.to_string(),
		};
		match &result {
			Err(e) if e.is_fatal() => warn!("Disconnected: {}", reason),
			_ => info!("Disconnected: {}", reason),
		}
		self.emit(ClientEvent::Disconnected { reason });

		result.map_err(DropError::from)
	}

	fn emit(&self, event: ClientEvent) {
		if self.events.send(event).is_err() {
			debug!("Event receiver dropped");
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::storage::DirStorage;
	use tempfile::TempDir;
	use tokio::net::TcpListener;

	fn client(addr: &str, dir: &TempDir) -> (Client, ClientHandle, UnboundedReceiver<ClientEvent>) {
		let (client, handle, events) = Client::new(addr, Arc::new(DirStorage::new(dir.path())));
		(client.with_reconnect_delay(Duration::from_millis(20)), handle, events)
	}

	#[tokio::test]
	async fn test_shutdown_stops_retry_loop() {
		let dir = TempDir::new().unwrap();
		// Grab a free port, then close it so connects are refused
		let addr = {
			let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
			listener.local_addr().unwrap().to_string()
		};

		let (client, handle, _events) = client(&addr, &dir);
		let task = tokio::spawn(client.run());
		tokio::time::sleep(Duration::from_millis(50)).await;

		handle.shutdown();
		tokio::time::timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
	}

	#[tokio::test]
	async fn test_handle_fails_after_client_dropped() {
		let dir = TempDir::new().unwrap();
		let (client, handle, _events) = client("127.0.0.1:1", &dir);
		drop(client);

		assert!(matches!(handle.list(), Err(DropError::Connection(ConnectionError::Disconnected))));
	}

	#[tokio::test]
	async fn test_upload_rejects_bad_name() {
		let dir = TempDir::new().unwrap();
		let (_client, handle, _events) = client("127.0.0.1:1", &dir);

		assert!(matches!(handle.upload("a/b", vec![1]), Err(DropError::Storage(_))));
	}

	#[tokio::test]
	async fn test_requests_queue_while_disconnected() {
		let dir = TempDir::new().unwrap();
		let (mut client, handle, _events) = client("127.0.0.1:1", &dir);

		handle.download("a.txt").unwrap();
		let packet = client.packets.try_recv().unwrap();
		assert_eq!(packet.opcode, Opcode::Download);
		assert_eq!(packet.metadata().unwrap().file_name.as_deref(), Some("a.txt"));
	}

	#[tokio::test]
	async fn test_upload_file_uses_file_name() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("report.txt");
		std::fs::write(&path, b"data").unwrap();
		let (mut client, handle, _events) = client("127.0.0.1:1", &dir);

		handle.upload_file(&path).unwrap();
		let packet = client.packets.try_recv().unwrap();
		let meta = packet.metadata().unwrap();
		assert_eq!(meta.file_name.as_deref(), Some("report.txt"));
		assert_eq!(meta.size, Some(4));
		assert_eq!(packet.payload, b"data".to_vec());
	}
}

// vim: ts=4
