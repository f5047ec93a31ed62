//! In-memory storage. Contents are lost on restart.

use crate::{StorageError, StorageInterface};
use async_trait::async_trait;
use dashmap::DashMap;
use indexer_types::{ConfigSchema, Schema, ValidationError};

#[derive(Default)]
pub struct MemoryStorage {
	entries: DashMap<String, Vec<u8>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::default()
	}
}

pub struct MemoryStorageSchema;

impl ConfigSchema for MemoryStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		self.entries
			.get(key)
			.map(|entry| entry.value().clone())
			.ok_or_else(|| StorageError::NotFound(key.to_string()))
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
		self.entries.insert(key.to_string(), value);
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		self.entries.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		Ok(self.entries.contains_key(key))
	}

	async fn keys(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
		Ok(self
			.entries
			.iter()
			.filter(|entry| entry.key().starts_with(prefix))
			.map(|entry| entry.key().clone())
			.collect())
	}
}

pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	MemoryStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;
	Ok(Box::new(MemoryStorage::new()))
}
