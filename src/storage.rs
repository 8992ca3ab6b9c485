//! Flat file storage used by both sides
//!
//! The protocol only ever needs whole-file operations on plain names, so the
//! backend is a trait with four calls and a directory implementation. Names
//! that could escape the directory are rejected before touching the disk.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs as afs;

use crate::error::StorageError;
use crate::logging::*;

/// What a delete actually did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
	Deleted,
	NotFound,
}

#[async_trait]
pub trait Storage: Send + Sync {
	/// Names of stored files, sorted
	async fn list(&self) -> Result<Vec<String>, StorageError>;

	/// Whole file contents; `StorageError::NotFound` if absent
	async fn read(&self, name: &str) -> Result<Vec<u8>, StorageError>;

	/// Create or replace a file
	async fn write(&self, name: &str, data: &[u8]) -> Result<(), StorageError>;

	async fn delete(&self, name: &str) -> Result<DeleteOutcome, StorageError>;
}

/// Storage rooted at one directory, holding regular files only
#[derive(Debug, Clone)]
pub struct DirStorage {
	root: PathBuf,
}

impl DirStorage {
	pub fn new(root: impl Into<PathBuf>) -> Self {
		Self { root: root.into() }
	}

	/// Create the directory if needed
	pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
		let storage = Self::new(root);
		afs::create_dir_all(&storage.root).await.map_err(|e| StorageError::Io {
			name: storage.root.display().to_string(),
			source: e,
		})?;
		Ok(storage)
	}

	pub fn root(&self) -> &Path {
		&self.root
	}

	fn path_for(&self, name: &str) -> Result<PathBuf, StorageError> {
		validate_name(name)?;
		Ok(self.root.join(name))
	}
}

/// Accept only a single, plain path component
pub fn validate_name(name: &str) -> Result<(), StorageError> {
	let bad = name.is_empty()
		|| name == "."
		|| name == ".."
		|| name.contains('/')
		|| name.contains('\\')
		|| name.contains('\0');
	if bad {
		return Err(StorageError::InvalidName { name: name.to_string() });
	}
	Ok(())
}

#[async_trait]
impl Storage for DirStorage {
	async fn list(&self) -> Result<Vec<String>, StorageError> {
		let root_name = self.root.display().to_string();
		let mut entries = afs::read_dir(&self.root)
			.await
			.map_err(|e| StorageError::Io { name: root_name.clone(), source: e })?;

		let mut names = Vec::new();
		loop {
			let entry = match entries.next_entry().await {
				Ok(Some(entry)) => entry,
				Ok(None) => break,
				Err(e) => return Err(StorageError::Io { name: root_name, source: e }),
			};

			let file_type = match entry.file_type().await {
				Ok(t) => t,
				Err(e) => {
					debug!("Cannot stat {}: {}", entry.path().display(), e);
					continue;
				}
			};
			if !file_type.is_file() {
				continue;
			}

			match entry.file_name().into_string() {
				Ok(name) => names.push(name),
				Err(raw) => warn!("Skipping non UTF-8 file name {:?}", raw),
			}
		}

		names.sort();
		Ok(names)
	}

	async fn read(&self, name: &str) -> Result<Vec<u8>, StorageError> {
		let path = self.path_for(name)?;
		match afs::metadata(&path).await {
			Ok(meta) if meta.is_file() => {}
			Ok(_) => return Err(StorageError::NotFound { name: name.to_string() }),
			Err(e) => return Err(StorageError::from_io(name, e)),
		}
		afs::read(&path).await.map_err(|e| StorageError::from_io(name, e))
	}

	async fn write(&self, name: &str, data: &[u8]) -> Result<(), StorageError> {
		let path = self.path_for(name)?;
		afs::write(&path, data).await.map_err(|e| StorageError::Io {
			name: name.to_string(),
			source: e,
		})?;
		debug!("Stored {} ({} bytes)", path.display(), data.len());
		Ok(())
	}

	async fn delete(&self, name: &str) -> Result<DeleteOutcome, StorageError> {
		let path = self.path_for(name)?;
		match afs::metadata(&path).await {
			Ok(meta) if meta.is_file() => {}
			Ok(_) => return Ok(DeleteOutcome::NotFound),
			Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(DeleteOutcome::NotFound),
			Err(e) => return Err(StorageError::Io { name: name.to_string(), source: e }),
		}

		match afs::remove_file(&path).await {
			Ok(()) => Ok(DeleteOutcome::Deleted),
			// Removed between the stat and the unlink
			Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(DeleteOutcome::NotFound),
			Err(e) => Err(StorageError::Io { name: name.to_string(), source: e }),
		}
	}
}


// vim: ts=4
