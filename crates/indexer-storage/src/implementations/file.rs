//! File-backed storage.
//!
//! Each key is stored in its own file under a base directory. The file is
//! named by the keccak256 digest of the key, so names stay fixed-length for
//! arbitrarily long task ids. The first line of every file holds the
//! hex-encoded key, followed by the raw value.

use crate::{StorageError, StorageInterface};
use alloy_primitives::keccak256;
use async_trait::async_trait;
use indexer_types::{ConfigSchema, Field, FieldType, Schema, ValidationError};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;

const EXTENSION: &str = "rec";

pub struct FileStorage {
	base_path: PathBuf,
}

impl FileStorage {
	pub fn new(base_path: PathBuf) -> Self {
		Self { base_path }
	}

	fn get_file_path(&self, key: &str) -> PathBuf {
		self.base_path
			.join(format!("{}.{}", hex::encode(keccak256(key.as_bytes())), EXTENSION))
	}

	fn encode_record(key: &str, value: &[u8]) -> Vec<u8> {
		let header = hex::encode(key.as_bytes());
		let mut record = Vec::with_capacity(header.len() + 1 + value.len());
		record.extend_from_slice(header.as_bytes());
		record.push(b'\n');
		record.extend_from_slice(value);
		record
	}

	/// Splits a record into its key and value.
	fn decode_record(record: &[u8]) -> Option<(String, &[u8])> {
		let split = record.iter().position(|b| *b == b'\n')?;
		let key = hex::decode(&record[..split]).ok()?;
		Some((String::from_utf8(key).ok()?, &record[split + 1..]))
	}

	async fn read_record(path: &Path) -> Result<Option<Vec<u8>>, StorageError> {
		match fs::read(path).await {
			Ok(data) => Ok(Some(data)),
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}
}

pub struct FileStorageSchema;

impl ConfigSchema for FileStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![],
			vec![
				Field::new("storage_path", FieldType::String).with_validator(|value| {
					match value.as_str() {
						Some(path) if !path.trim().is_empty() => Ok(()),
						_ => Err("storage_path cannot be empty".to_string()),
					}
				}),
			],
		);
		schema.validate(config)
	}
}

#[async_trait]
impl StorageInterface for FileStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let record = Self::read_record(&self.get_file_path(key))
			.await?
			.ok_or_else(|| StorageError::NotFound(key.to_string()))?;
		match Self::decode_record(&record) {
			Some((stored_key, value)) if stored_key == key => Ok(value.to_vec()),
			Some(_) => Err(StorageError::Backend(format!("digest collision for key {}", key))),
			None => Err(StorageError::Serialization(format!("corrupt record for key {}", key))),
		}
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		let path = self.get_file_path(key);

		fs::create_dir_all(&self.base_path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;

		// Readers never observe a partially written record.
		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, Self::encode_record(key, &value))
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?;
		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		match fs::remove_file(self.get_file_path(key)).await {
			Ok(()) => Ok(()),
			Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
			Err(e) => Err(StorageError::Backend(e.to_string())),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		fs::try_exists(self.get_file_path(key))
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))
	}

	async fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
		let mut entries = match fs::read_dir(&self.base_path).await {
			Ok(entries) => entries,
			Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
			Err(e) => return Err(StorageError::Backend(e.to_string())),
		};

		let mut keys = Vec::new();
		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| StorageError::Backend(e.to_string()))?
		{
			let path = entry.path();
			if path.extension().and_then(|ext| ext.to_str()) != Some(EXTENSION) {
				continue;
			}
			// A record deleted since the directory was read is skipped.
			let Some(record) = Self::read_record(&path).await? else {
				continue;
			};
			if let Some((key, _)) = Self::decode_record(&record) {
				if key.starts_with(prefix) {
					keys.push(key);
				}
			}
		}
		Ok(keys)
	}
}

/// Creates a file backend from configuration.
///
/// Configuration parameters:
/// - `storage_path`: base directory (default: "./data/storage")
pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	FileStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or("./data/storage");

	Ok(Box::new(FileStorage::new(PathBuf::from(storage_path))))
}
