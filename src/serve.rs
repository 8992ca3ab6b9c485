//! Server side: accept loop and per-connection tasks

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use crate::config::Config;
use crate::connection::{Connection, DEFAULT_READ_BUFFER_SIZE};
use crate::error::DropError;
use crate::logging::*;
use crate::protocol::{FrameLimits, ProtocolError, RequestDispatcher};
use crate::storage::{DirStorage, Storage};

/// Pause after a failed accept (e.g. out of file descriptors)
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Listening server sharing one storage between all connections
pub struct Server {
	listener: TcpListener,
	storage: Arc<dyn Storage>,
	limits: FrameLimits,
	read_buffer_size: usize,
}

impl Server {
	pub async fn bind(addr: &str, storage: Arc<dyn Storage>, limits: FrameLimits) -> Result<Self, DropError> {
		let listener = TcpListener::bind(addr).await.map_err(|e| {
			error!("Cannot bind {}: {}", addr, e);
			DropError::Io(e)
		})?;
		Ok(Self { listener, storage, limits, read_buffer_size: DEFAULT_READ_BUFFER_SIZE })
	}

	pub fn with_read_buffer_size(mut self, size: usize) -> Self {
		self.read_buffer_size = size;
		self
	}

	pub fn local_addr(&self) -> io::Result<SocketAddr> {
		self.listener.local_addr()
	}

	/// Accept connections forever
	///
	/// A failing connection only ends its own task. Accept errors are logged
	/// and the loop keeps going.
	pub async fn run(self) -> Result<(), DropError> {
		match self.local_addr() {
			Ok(addr) => info!("Server started on {}", addr),
			Err(_) => info!("Server started"),
		}

		loop {
			match self.listener.accept().await {
				Ok((stream, addr)) => {
					info!("Client connected: {}", addr);
					let handler = RequestDispatcher::new(self.storage.clone(), addr.to_string());
					let conn = Connection::new(stream, handler, self.limits, self.read_buffer_size);
					tokio::spawn(async move {
						match conn.run(None).await {
							Ok(()) => info!("Client disconnected: {}", addr),
							Err(ProtocolError::PeerClosed) => {
								info!("Client disconnected mid-packet: {}", addr)
							}
							Err(e) => warn!("Client {} dropped: {}", addr, e),
						}
					});
				}
				Err(e) => {
					warn!("Accept failed: {}", e);
					tokio::time::sleep(ACCEPT_BACKOFF).await;
				}
			}
		}
	}
}

/// Serve `config.storage_dir` on `config.listen_addr`
pub async fn serve(config: &Config) -> Result<(), DropError> {
	let storage = DirStorage::open(&config.storage_dir).await?;
	info!("Serving directory {}", storage.root().display());

	let server = Server::bind(&config.listen_addr, Arc::new(storage), config.limits())
		.await?
		.with_read_buffer_size(config.read_buffer_size);
	server.run().await
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::protocol::{Opcode, Packet, HEADER_SIZE};
	use tempfile::TempDir;
	use tokio::io::{AsyncReadExt, AsyncWriteExt};
	use tokio::net::TcpStream;

	async fn read_packet(stream: &mut TcpStream) -> Packet {
		let mut header = [0u8; HEADER_SIZE];
		stream.read_exact(&mut header).await.unwrap();
		let decoded = crate::protocol::Header::decode(&header).unwrap();
		let mut buf = header.to_vec();
		buf.resize(HEADER_SIZE + decoded.body_len().unwrap() as usize, 0);
		stream.read_exact(&mut buf[HEADER_SIZE..]).await.unwrap();
		Packet::decode(&buf).unwrap()
	}

	#[tokio::test]
	async fn test_bad_client_does_not_stop_server() {
		let dir = TempDir::new().unwrap();
		let server = Server::bind("127.0.0.1:0", Arc::new(DirStorage::new(dir.path())), FrameLimits::default())
			.await
			.unwrap();
		let addr = server.local_addr().unwrap();
		tokio::spawn(server.run());

		let mut bad = TcpStream::connect(addr).await.unwrap();
		assert_eq!(read_packet(&mut bad).await.opcode, Opcode::ListReply);
		bad.write_all(&[0u8; HEADER_SIZE]).await.unwrap();
		let mut buf = [0u8; 1];
		assert_eq!(bad.read(&mut buf).await.unwrap(), 0);

		let mut good = TcpStream::connect(addr).await.unwrap();
		assert_eq!(read_packet(&mut good).await.opcode, Opcode::ListReply);
	}

	#[tokio::test]
	async fn test_serve_creates_storage_dir() {
		let dir = TempDir::new().unwrap();
		let config = Config {
			listen_addr: "127.0.0.1:0".to_string(),
			storage_dir: dir.path().join("store"),
			..Config::default()
		};

		let task = tokio::spawn(async move { serve(&config).await });
		for _ in 0..100 {
			if dir.path().join("store").is_dir() {
				break;
			}
			tokio::time::sleep(Duration::from_millis(10)).await;
		}
		assert!(dir.path().join("store").is_dir());
		task.abort();
	}
}

// vim: ts=4
