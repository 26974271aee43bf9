//! Process-local storage. Entries written with a TTL expire; entries
//! written without one live until deleted.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use forwarder_types::{ConfigSchema, ImplementationRegistry, Schema, ValidationError};
use tokio::sync::RwLock;

use crate::{StorageError, StorageFactory, StorageInterface, StorageRegistry};

struct Entry {
	value: Vec<u8>,
	expires: Option<Instant>,
}

impl Entry {
	fn live(&self, now: Instant) -> bool {
		self.expires.is_none_or(|at| now < at)
	}
}

#[derive(Default)]
pub struct MemoryStorage {
	entries: RwLock<HashMap<String, Entry>>,
}

impl MemoryStorage {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl StorageInterface for MemoryStorage {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StorageError> {
		let entries = self.entries.read().await;
		match entries.get(key) {
			Some(entry) if entry.live(Instant::now()) => Ok(entry.value.clone()),
			_ => Err(StorageError::NotFound),
		}
	}

	async fn set_bytes(
		&self,
		key: &str,
		value: Vec<u8>,
		ttl: Option<Duration>,
	) -> Result<(), StorageError> {
		let expires = ttl
			.filter(|ttl| !ttl.is_zero())
			.map(|ttl| Instant::now() + ttl);
		self.entries
			.write()
			.await
			.insert(key.to_owned(), Entry { value, expires });
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<(), StorageError> {
		self.entries.write().await.remove(key);
		Ok(())
	}

	async fn exists(&self, key: &str) -> Result<bool, StorageError> {
		let now = Instant::now();
		Ok(self
			.entries
			.read()
			.await
			.get(key)
			.is_some_and(|entry| entry.live(now)))
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryStorageSchema)
	}

	async fn cleanup_expired(&self) -> Result<usize, StorageError> {
		let now = Instant::now();
		let mut entries = self.entries.write().await;
		let before = entries.len();
		entries.retain(|_, entry| entry.live(now));
		Ok(before - entries.len())
	}
}

pub struct MemoryStorageSchema;

impl ConfigSchema for MemoryStorageSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

pub fn create_storage(config: &toml::Value) -> Result<Box<dyn StorageInterface>, StorageError> {
	MemoryStorageSchema
		.validate(config)
		.map_err(|e| StorageError::Configuration(e.to_string()))?;
	Ok(Box::new(MemoryStorage::new()))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = StorageFactory;

	fn factory() -> Self::Factory {
		create_storage
	}
}

impl StorageRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn test_overwrite_and_delete() {
		let storage = MemoryStorage::new();
		storage
			.set_bytes("submissions:1", b"one".to_vec(), None)
			.await
			.unwrap();
		storage
			.set_bytes("submissions:1", b"two".to_vec(), None)
			.await
			.unwrap();
		assert_eq!(storage.get_bytes("submissions:1").await.unwrap(), b"two");

		storage.delete("submissions:1").await.unwrap();
		storage.delete("submissions:1").await.unwrap();
		assert!(matches!(
			storage.get_bytes("submissions:1").await,
			Err(StorageError::NotFound)
		));
	}

	#[tokio::test]
	async fn test_expired_entries_vanish_and_are_cleaned() {
		let storage = MemoryStorage::new();
		storage
			.set_bytes("submissions:old", vec![1], Some(Duration::from_millis(1)))
			.await
			.unwrap();
		storage
			.set_bytes("submissions:kept", vec![2], None)
			.await
			.unwrap();
		tokio::time::sleep(Duration::from_millis(20)).await;

		assert!(!storage.exists("submissions:old").await.unwrap());
		assert!(storage.exists("submissions:kept").await.unwrap());
		assert_eq!(storage.cleanup_expired().await.unwrap(), 1);
		assert_eq!(storage.cleanup_expired().await.unwrap(), 0);
	}

	#[test]
	fn test_factory_rejects_non_table() {
		assert!(create_storage(&toml::Value::Integer(1)).is_err());
		assert!(create_storage(&toml::Value::Table(toml::Table::new())).is_ok());
	}
}
