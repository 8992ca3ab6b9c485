//! Configuration for both sides of dropr
//!
//! The configuration follows a priority chain:
//! 1. Built-in defaults (Config::default())
//! 2. Config file (`.toml`, anything else is read as JSON5)
//! 3. Environment variables (DROPR_* prefix)
//! 4. CLI flags (highest priority, applied by the binary)

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::connection::DEFAULT_READ_BUFFER_SIZE;
use crate::error::ConfigError;
use crate::protocol::framing::{DEFAULT_MAX_METADATA_LEN, DEFAULT_MAX_PAYLOAD_LEN};
use crate::protocol::FrameLimits;

/// Default TCP port of the server
pub const DEFAULT_PORT: u16 = 8888;

/// Delay between reconnect attempts of the client
pub const DEFAULT_RECONNECT_DELAY_MS: u64 = 2000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
	/// Address the server binds to
	pub listen_addr: String,

	/// Address the client connects to
	pub server_addr: String,

	/// Directory served by the server
	pub storage_dir: PathBuf,

	/// Directory where the client stores downloads
	pub download_dir: PathBuf,

	/// Fixed delay between client reconnect attempts
	pub reconnect_delay_ms: u64,

	/// Largest metadata section accepted from a peer
	pub max_metadata_len: u32,

	/// Largest payload accepted from a peer
	pub max_payload_len: u64,

	/// Size of the per-connection read buffer
	pub read_buffer_size: usize,

	/// Default log filter when RUST_LOG is not set
	pub log_level: String,
}

impl Default for Config {
	fn default() -> Self {
		Self {
			listen_addr: format!("0.0.0.0:{}", DEFAULT_PORT),
			server_addr: format!("127.0.0.1:{}", DEFAULT_PORT),
			storage_dir: PathBuf::from("storage"),
			download_dir: PathBuf::from("downloads"),
			reconnect_delay_ms: DEFAULT_RECONNECT_DELAY_MS,
			max_metadata_len: DEFAULT_MAX_METADATA_LEN,
			max_payload_len: DEFAULT_MAX_PAYLOAD_LEN,
			read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
			log_level: "info".to_string(),
		}
	}
}

impl Config {
	/// Parse a config file; missing keys keep their defaults
	pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
		let display = path.display().to_string();
		let text = std::fs::read_to_string(path)
			.map_err(|e| ConfigError::Read { path: display.clone(), source: e })?;

		let is_toml = path.extension().map(|ext| ext == "toml").unwrap_or(false);
		if is_toml {
			toml::from_str(&text)
				.map_err(|e| ConfigError::Parse { path: display, message: e.to_string() })
		} else {
			json5::from_str(&text)
				.map_err(|e| ConfigError::Parse { path: display, message: e.to_string() })
		}
	}

	/// Defaults, then the optional file, then the process environment
	pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
		let mut config = match path {
			Some(path) => Self::from_file(path)?,
			None => Self::default(),
		};
		config.apply_env(|key| std::env::var(key).ok())?;
		Ok(config)
	}

	/// Apply DROPR_* overrides obtained through `lookup`
	pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		if let Some(v) = lookup("DROPR_LISTEN") {
			self.listen_addr = v;
		}
		if let Some(v) = lookup("DROPR_SERVER") {
			self.server_addr = v;
		}
		if let Some(v) = lookup("DROPR_STORAGE_DIR") {
			self.storage_dir = PathBuf::from(v);
		}
		if let Some(v) = lookup("DROPR_DOWNLOAD_DIR") {
			self.download_dir = PathBuf::from(v);
		}
		if let Some(v) = lookup("DROPR_RECONNECT_DELAY_MS") {
			self.reconnect_delay_ms = v.trim().parse().map_err(|_| ConfigError::Invalid {
				message: format!("DROPR_RECONNECT_DELAY_MS is not a number: {:?}", v),
			})?;
		}
		if let Some(v) = lookup("DROPR_LOG") {
			self.log_level = v;
		}
		Ok(())
	}

	pub fn validate(&self) -> Result<(), ConfigError> {
		let invalid = |message: &str| -> Result<(), ConfigError> {
			Err(ConfigError::Invalid { message: message.to_string() })
		};

		if self.max_metadata_len == 0 {
			return invalid("maxMetadataLen must be greater than zero");
		}
		if self.max_payload_len == 0 {
			return invalid("maxPayloadLen must be greater than zero");
		}
		if self.read_buffer_size == 0 {
			return invalid("readBufferSize must be greater than zero");
		}
		if self.reconnect_delay_ms == 0 {
			return invalid("reconnectDelayMs must be greater than zero");
		}
		if self.listen_addr.is_empty() {
			return invalid("listenAddr is empty");
		}
		if self.server_addr.is_empty() {
			return invalid("serverAddr is empty");
		}
		Ok(())
	}

	pub fn limits(&self) -> FrameLimits {
		FrameLimits { max_metadata_len: self.max_metadata_len, max_payload_len: self.max_payload_len }
	}

	pub fn reconnect_delay(&self) -> Duration {
		Duration::from_millis(self.reconnect_delay_ms)
	}
}


// vim: ts=4
