//! Shared state store of the package tracker.
//!
//! The store holds one [`StateRecord`] per key, the way a home-automation
//! entity registry holds entity states. Backends only deal in raw bytes
//! through [`StoreInterface`]; [`StateStore`] layers JSON records and change
//! notifications on top of them.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::broadcast;
use tracker_types::{ConfigSchema, ImplementationRegistry, StateRecord, StateSnapshot, StoreEvent};

pub mod implementations {
	pub mod file;
	pub mod memory;
}

/// Capacity of the change notification channel. Subscribers that fall
/// further behind observe a lag and re-read the whole store.
const EVENT_CAPACITY: usize = 256;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
	#[error("Not found")]
	NotFound,
	#[error("Serialization error: {0}")]
	Serialization(String),
	#[error("Backend error: {0}")]
	Backend(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Low-level key-value interface every store backend implements.
///
/// Each call is atomic per key; there are no multi-key transactions.
#[async_trait]
pub trait StoreInterface: Send + Sync {
	/// Retrieves raw bytes for the given key.
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StoreError>;

	/// Stores raw bytes, replacing any previous value.
	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError>;

	/// Deletes the value. Returns whether the key existed.
	async fn delete(&self, key: &str) -> Result<bool, StoreError>;

	async fn exists(&self, key: &str) -> Result<bool, StoreError>;

	/// Lists the keys starting with `prefix` in ascending order.
	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

	/// Returns the configuration schema for validation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;
}

/// Factory building a backend from its `[store.implementations.<name>]` table.
pub type StoreFactory = fn(&toml::Value) -> Result<Box<dyn StoreInterface>, StoreError>;

pub trait StoreRegistry: ImplementationRegistry<Factory = StoreFactory> {}

/// All built-in store backends as `(name, factory)` pairs.
pub fn get_all_implementations() -> Vec<(&'static str, StoreFactory)> {
	use implementations::{file, memory};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// Record-level view of a backend with change notifications.
///
/// Every write that changes a record and every removal is announced as a
/// [`StoreEvent`] to all subscribers.
pub struct StateStore {
	backend: Box<dyn StoreInterface>,
	events: broadcast::Sender<StoreEvent>,
}

impl StateStore {
	pub fn new(backend: Box<dyn StoreInterface>) -> Self {
		let (events, _) = broadcast::channel(EVENT_CAPACITY);
		Self { backend, events }
	}

	/// Writes `state` and `attributes` under `key`.
	///
	/// A write that leaves state and attributes as they were keeps the old
	/// `last_updated` and emits no event. Returns whether the record changed.
	pub async fn upsert(
		&self,
		key: &str,
		state: impl Into<String>,
		attributes: Map<String, Value>,
	) -> Result<bool, StoreError> {
		self.put(key, StateRecord::new(state, attributes)).await
	}

	/// Writes a complete record, with the same change semantics as
	/// [`StateStore::upsert`].
	pub async fn put(&self, key: &str, record: StateRecord) -> Result<bool, StoreError> {
		if let Some(existing) = self.get(key).await? {
			if existing.state == record.state && existing.attributes == record.attributes {
				return Ok(false);
			}
		}

		let bytes =
			serde_json::to_vec(&record).map_err(|e| StoreError::Serialization(e.to_string()))?;
		self.backend.set_bytes(key, bytes).await?;

		tracing::trace!(component = "store", key = %key, state = %record.state, "Record written");
		let _ = self.events.send(StoreEvent::Upserted {
			key: key.to_string(),
		});
		Ok(true)
	}

	pub async fn get(&self, key: &str) -> Result<Option<StateRecord>, StoreError> {
		match self.backend.get_bytes(key).await {
			Ok(bytes) => serde_json::from_slice(&bytes)
				.map(Some)
				.map_err(|e| StoreError::Serialization(e.to_string())),
			Err(StoreError::NotFound) => Ok(None),
			Err(e) => Err(e),
		}
	}

	/// Removes `key`. Returns whether it existed.
	pub async fn remove(&self, key: &str) -> Result<bool, StoreError> {
		let existed = self.backend.delete(key).await?;
		if existed {
			tracing::trace!(component = "store", key = %key, "Record removed");
			let _ = self.events.send(StoreEvent::Removed {
				key: key.to_string(),
			});
		}
		Ok(existed)
	}

	pub async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
		self.backend.list_keys(prefix).await
	}

	/// Reads every record.
	///
	/// Keys removed between listing and reading are skipped; a record that
	/// cannot be decoded is logged and skipped as well.
	pub async fn read_all(&self) -> Result<StateSnapshot, StoreError> {
		let mut snapshot = BTreeMap::new();
		for key in self.backend.list_keys("").await? {
			match self.get(&key).await {
				Ok(Some(record)) => {
					snapshot.insert(key, record);
				},
				Ok(None) => {},
				Err(StoreError::Serialization(e)) => {
					tracing::warn!(component = "store", key = %key, error = %e, "Skipping unreadable record");
				},
				Err(e) => return Err(e),
			}
		}
		Ok(snapshot)
	}

	/// Subscribes to change notifications.
	pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
		self.events.subscribe()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use implementations::memory::MemoryStore;
	use serde_json::json;

	fn attributes(value: Value) -> Map<String, Value> {
		value.as_object().cloned().unwrap()
	}

	#[tokio::test]
	async fn test_upsert_and_get() {
		let store = StateStore::new(Box::new(MemoryStore::new()));
		let changed = store
			.upsert(
				"sensor.amazon_package_a",
				"shipped",
				attributes(json!({"carrier": "DHL"})),
			)
			.await
			.unwrap();
		assert!(changed);

		let record = store.get("sensor.amazon_package_a").await.unwrap().unwrap();
		assert_eq!(record.state, "shipped");
		assert_eq!(record.attribute_str("carrier"), Some("DHL"));
		assert!(store.get("sensor.amazon_package_b").await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_unchanged_upsert_is_silent() {
		let store = StateStore::new(Box::new(MemoryStore::new()));
		let mut events = store.subscribe();

		store.upsert("k", "ordered", Map::new()).await.unwrap();
		let first = store.get("k").await.unwrap().unwrap();
		assert_eq!(events.recv().await.unwrap(), StoreEvent::Upserted { key: "k".into() });

		assert!(!store.upsert("k", "ordered", Map::new()).await.unwrap());
		assert_eq!(store.get("k").await.unwrap().unwrap().last_updated, first.last_updated);
		assert!(events.try_recv().is_err());

		assert!(store.upsert("k", "shipped", Map::new()).await.unwrap());
		assert_eq!(events.recv().await.unwrap(), StoreEvent::Upserted { key: "k".into() });
	}

	#[tokio::test]
	async fn test_remove_notifies_only_existing() {
		let store = StateStore::new(Box::new(MemoryStore::new()));
		store.upsert("k", "ordered", Map::new()).await.unwrap();
		let mut events = store.subscribe();

		assert!(store.remove("k").await.unwrap());
		assert_eq!(events.recv().await.unwrap(), StoreEvent::Removed { key: "k".into() });
		assert!(!store.remove("k").await.unwrap());
		assert!(events.try_recv().is_err());
	}

	#[tokio::test]
	async fn test_read_all_and_prefix() {
		let store = StateStore::new(Box::new(MemoryStore::new()));
		store.upsert("sensor.amazon_package_b", "shipped", Map::new()).await.unwrap();
		store.upsert("sensor.amazon_package_a", "ordered", Map::new()).await.unwrap();
		store.upsert("sensor.amazon_pending_packages", "2", Map::new()).await.unwrap();

		let snapshot = store.read_all().await.unwrap();
		assert_eq!(
			snapshot.keys().collect::<Vec<_>>(),
			vec![
				"sensor.amazon_package_a",
				"sensor.amazon_package_b",
				"sensor.amazon_pending_packages"
			]
		);

		let packages = store.keys_with_prefix("sensor.amazon_package_").await.unwrap();
		assert_eq!(packages, vec!["sensor.amazon_package_a", "sensor.amazon_package_b"]);
	}

	#[tokio::test]
	async fn test_read_all_skips_garbage() {
		let backend = MemoryStore::new();
		backend.set_bytes("broken", b"not json".to_vec()).await.unwrap();
		let store = StateStore::new(Box::new(backend));
		store.upsert("ok", "ordered", Map::new()).await.unwrap();

		let snapshot = store.read_all().await.unwrap();
		assert_eq!(snapshot.len(), 1);
		assert!(snapshot.contains_key("ok"));
	}

	#[test]
	fn test_registered_implementations() {
		let names: Vec<_> = get_all_implementations().into_iter().map(|(n, _)| n).collect();
		assert_eq!(names, vec!["file", "memory"]);
	}
}
