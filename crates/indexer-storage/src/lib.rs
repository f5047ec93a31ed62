//! Storage module for the task indexer.
//!
//! Backends implement a small byte-level key-value interface;
//! [`TaskStore`] layers the task and accept records, their secondary
//! indexes and the lifecycle transitions on top of any backend.

use async_trait::async_trait;
use thiserror::Error;

mod store;

pub use store::{StoredTransition, TaskStore};

/// Re-export implementations
pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
	/// A requested record does not exist.
	#[error("Not found: {0}")]
	NotFound(String),
	/// A unique key is already taken or the record is not in a state that
	/// allows the requested change.
	#[error("Conflict: {0}")]
	Conflict(String),
	#[error("Serialization error: {0}")]
	Serialization(String),
	#[error("Backend error: {0}")]
	Backend(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Low-level interface implemented by every storage backend.
#[async_trait]
pub trait StorageInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError>;

	/// Stores raw bytes, replacing any existing value.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;

	/// Deletes the value associated with the given key. Missing keys are not an error.
	async fn delete(&self, key: &str) -> Result<(), StorageError>;

	async fn exists(&self, key: &str) -> Result<bool, StorageError>;

	/// Lists every stored key starting with `prefix`.
	async fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError>;
}

/// Builds a backend from its `[storage.config]` table.
pub type StorageFactory = fn(&toml::Value) -> Result<Box<dyn StorageInterface>, StorageError>;

/// Returns the factory registered under `backend`, if any.
pub fn storage_factory(backend: &str) -> Option<StorageFactory> {
	match backend {
		"file" => Some(implementations::file::create_storage),
		"memory" => Some(implementations::memory::create_storage),
		_ => None,
	}
}
