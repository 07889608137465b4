//! In-memory store backend.
//!
//! Records live for the lifetime of the process only. This is the default
//! backend; the poller rebuilds every record on its first cycle anyway.

use crate::{StoreError, StoreInterface};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;
use tracker_types::{ConfigSchema, ImplementationRegistry, Schema, ValidationError};

/// Store backend keeping all values in an ordered map.
pub struct MemoryStore {
	entries: RwLock<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStore {
	pub fn new() -> Self {
		Self {
			entries: RwLock::new(BTreeMap::new()),
		}
	}
}

impl Default for MemoryStore {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait]
impl StoreInterface for MemoryStore {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StoreError> {
		let entries = self.entries.read().await;
		entries.get(key).cloned().ok_or(StoreError::NotFound)
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
		let mut entries = self.entries.write().await;
		entries.insert(key.to_string(), value);
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<bool, StoreError> {
		let mut entries = self.entries.write().await;
		Ok(entries.remove(key).is_some())
	}

	async fn exists(&self, key: &str) -> Result<bool, StoreError> {
		let entries = self.entries.read().await;
		Ok(entries.contains_key(key))
	}

	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
		let entries = self.entries.read().await;
		Ok(entries
			.range(prefix.to_string()..)
			.map(|(key, _)| key)
			.take_while(|key| key.starts_with(prefix))
			.cloned()
			.collect())
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryStoreSchema)
	}
}

/// The memory backend takes no options.
pub struct MemoryStoreSchema;

impl ConfigSchema for MemoryStoreSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).strict().validate(config)
	}
}

pub fn create_store(config: &toml::Value) -> Result<Box<dyn StoreInterface>, StoreError> {
	MemoryStoreSchema
		.validate(config)
		.map_err(|e| StoreError::Configuration(e.to_string()))?;
	Ok(Box::new(MemoryStore::new()))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = crate::StoreFactory;

	fn factory() -> Self::Factory {
		create_store
	}
}

impl crate::StoreRegistry for Registry {}
