//! # dropr - Drop Box over a Framed TCP Protocol
//!
//! A server exposes one directory; clients list, upload, download and delete
//! whole files in it. Both sides speak a small binary protocol (magic,
//! opcode, two length fields, JSON metadata, raw payload) over plain TCP and
//! run a single-threaded, readiness-driven loop per connection.
//!
//! ## Server
//!
//! ```rust,ignore
//! use dropr::config::Config;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), dropr::DropError> {
//!     dropr::serve::serve(&Config::default()).await
//! }
//! ```
//!
//! ## Client
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use dropr::connect::Client;
//! use dropr::storage::DirStorage;
//!
//! let (client, handle, mut events) = Client::new("127.0.0.1:8888", Arc::new(DirStorage::new("downloads")));
//! tokio::spawn(client.run());
//! handle.download("report.pdf")?;
//! while let Some(event) = events.recv().await {
//!     println!("{:?}", event);
//! }
//! ```

pub mod config;
pub mod connect;
pub mod console;
pub mod connection;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod serve;
pub mod storage;

// Re-export commonly used types
pub use config::Config;
pub use connect::{Client, ClientHandle};
pub use error::{ConfigError, ConnectionError, DropError, StorageError};
pub use protocol::{ClientEvent, Metadata, Opcode, Packet, ProtocolError, Status};
pub use serve::Server;

// vim: ts=4
