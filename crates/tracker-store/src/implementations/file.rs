//! File-backed store.
//!
//! Every key is kept in its own `.bin` file below `storage_path`. Writes go to
//! a temporary file first and are renamed into place, so a reader sees either
//! the old or the new record and never a partial one. The directory is
//! guarded by an exclusive lock file so two tracker processes cannot share it.

use crate::{StoreError, StoreInterface};
use async_trait::async_trait;
use fs2::FileExt;
use std::fs::File;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracker_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError,
};

const DEFAULT_STORAGE_PATH: &str = "./data/states";
const LOCK_FILE: &str = ".lock";
const EXTENSION: &str = "bin";

/// Header preceding every value.
///
/// Binary layout:
/// - `[0..4]`: magic bytes `APTS`
/// - `[4..6]`: version (u16, little-endian)
/// - `[6..8]`: key length in bytes (u16, little-endian)
/// - `[8..8 + len]`: the key, UTF-8
///
/// File names are sanitized keys, so the original key is kept in the header
/// for listing.
#[derive(Debug, Clone, PartialEq, Eq)]
struct FileHeader {
	key: String,
}

impl FileHeader {
	const MAGIC: &'static [u8; 4] = b"APTS";
	const VERSION: u16 = 1;
	const FIXED_SIZE: usize = 8;

	fn new(key: &str) -> Self {
		Self {
			key: key.to_string(),
		}
	}

	fn encode(&self, value: &[u8]) -> Result<Vec<u8>, StoreError> {
		let key_len = u16::try_from(self.key.len())
			.map_err(|_| StoreError::Backend(format!("Key too long: {} bytes", self.key.len())))?;

		let mut bytes = Vec::with_capacity(Self::FIXED_SIZE + self.key.len() + value.len());
		bytes.extend_from_slice(Self::MAGIC);
		bytes.extend_from_slice(&Self::VERSION.to_le_bytes());
		bytes.extend_from_slice(&key_len.to_le_bytes());
		bytes.extend_from_slice(self.key.as_bytes());
		bytes.extend_from_slice(value);
		Ok(bytes)
	}

	/// Splits file contents into header and value.
	fn decode(bytes: &[u8]) -> Result<(Self, &[u8]), StoreError> {
		if bytes.len() < Self::FIXED_SIZE || &bytes[0..4] != Self::MAGIC {
			return Err(StoreError::Backend("Not a state file".into()));
		}

		let version = u16::from_le_bytes([bytes[4], bytes[5]]);
		if version > Self::VERSION {
			return Err(StoreError::Backend(format!(
				"Unsupported file version: {}",
				version
			)));
		}

		let key_len = u16::from_le_bytes([bytes[6], bytes[7]]) as usize;
		let key_end = Self::FIXED_SIZE + key_len;
		if bytes.len() < key_end {
			return Err(StoreError::Backend("Truncated state file".into()));
		}
		let key = std::str::from_utf8(&bytes[Self::FIXED_SIZE..key_end])
			.map_err(|e| StoreError::Backend(format!("Invalid key in header: {}", e)))?;

		Ok((
			Self {
				key: key.to_string(),
			},
			&bytes[key_end..],
		))
	}
}

/// Store backend writing one file per key.
pub struct FileStore {
	base_path: PathBuf,
	/// Held for the lifetime of the store; closing it releases the lock.
	_lock: File,
}

impl FileStore {
	/// Opens (and creates) the storage directory and takes its lock.
	pub fn open(base_path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let base_path = base_path.into();
		std::fs::create_dir_all(&base_path).map_err(|e| {
			StoreError::Backend(format!("Cannot create {}: {}", base_path.display(), e))
		})?;

		let lock = File::create(base_path.join(LOCK_FILE))
			.map_err(|e| StoreError::Backend(e.to_string()))?;
		lock.try_lock_exclusive().map_err(|_| {
			StoreError::Backend(format!(
				"Storage directory {} is in use by another process",
				base_path.display()
			))
		})?;

		tracing::debug!(component = "store", path = %base_path.display(), "Opened file store");
		Ok(Self {
			base_path,
			_lock: lock,
		})
	}

	fn file_path(&self, key: &str) -> PathBuf {
		let safe_key: String = key
			.chars()
			.map(|c| {
				if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
					c
				} else {
					'_'
				}
			})
			.collect();
		self.base_path.join(format!("{}.{}", safe_key, EXTENSION))
	}

	async fn read_file(path: &Path) -> Result<Option<Vec<u8>>, StoreError> {
		match fs::read(path).await {
			Ok(data) => Ok(Some(data)),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
			Err(e) => Err(StoreError::Backend(e.to_string())),
		}
	}

	/// Key recorded in the header of the file at `path`, if the file exists
	/// and is a state file.
	async fn owner(path: &Path) -> Result<Option<String>, StoreError> {
		let Some(data) = Self::read_file(path).await? else {
			return Ok(None);
		};
		Ok(FileHeader::decode(&data).ok().map(|(header, _)| header.key))
	}
}

#[async_trait]
impl StoreInterface for FileStore {
	async fn get_bytes(&self, key: &str) -> Result<Vec<u8>, StoreError> {
		let data = Self::read_file(&self.file_path(key))
			.await?
			.ok_or(StoreError::NotFound)?;
		let (header, value) = FileHeader::decode(&data)?;
		if header.key != key {
			// Two keys sanitized to the same file name.
			return Err(StoreError::NotFound);
		}
		Ok(value.to_vec())
	}

	async fn set_bytes(&self, key: &str, value: Vec<u8>) -> Result<(), StoreError> {
		let path = self.file_path(key);
		if let Some(owner) = Self::owner(&path).await? {
			if owner != key {
				return Err(StoreError::Backend(format!(
					"File {} already holds key {}",
					path.display(),
					owner
				)));
			}
		}
		let data = FileHeader::new(key).encode(&value)?;

		let temp_path = path.with_extension("tmp");
		fs::write(&temp_path, data)
			.await
			.map_err(|e| StoreError::Backend(e.to_string()))?;
		fs::rename(&temp_path, &path)
			.await
			.map_err(|e| StoreError::Backend(e.to_string()))?;
		Ok(())
	}

	async fn delete(&self, key: &str) -> Result<bool, StoreError> {
		let path = self.file_path(key);
		match Self::owner(&path).await? {
			Some(owner) if owner == key => {},
			// Missing, foreign or unreadable files do not belong to this key.
			_ => return Ok(false),
		}
		match fs::remove_file(&path).await {
			Ok(()) => Ok(true),
			Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
			Err(e) => Err(StoreError::Backend(e.to_string())),
		}
	}

	async fn exists(&self, key: &str) -> Result<bool, StoreError> {
		match self.get_bytes(key).await {
			Ok(_) => Ok(true),
			Err(StoreError::NotFound) => Ok(false),
			Err(e) => Err(e),
		}
	}

	async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
		let mut keys = Vec::new();
		let mut entries = fs::read_dir(&self.base_path)
			.await
			.map_err(|e| StoreError::Backend(e.to_string()))?;

		while let Some(entry) = entries
			.next_entry()
			.await
			.map_err(|e| StoreError::Backend(e.to_string()))?
		{
			let path = entry.path();
			if path.extension() != Some(std::ffi::OsStr::new(EXTENSION)) {
				continue;
			}
			let Some(data) = Self::read_file(&path).await? else {
				continue;
			};
			match FileHeader::decode(&data) {
				Ok((header, _)) if header.key.starts_with(prefix) => keys.push(header.key),
				Ok(_) => {},
				Err(e) => {
					tracing::debug!(component = "store", path = %path.display(), error = %e, "Skipping file");
				},
			}
		}

		keys.sort();
		Ok(keys)
	}

	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileStoreSchema)
	}
}

pub struct FileStoreSchema;

impl ConfigSchema for FileStoreSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![],
			vec![Field::new("storage_path", FieldType::String)
				.with_validator(tracker_types::validation::non_blank)],
		)
		.strict()
		.validate(config)
	}
}

/// Builds a file store.
///
/// Configuration parameters:
/// - `storage_path`: directory of the state files (default: `./data/states`)
pub fn create_store(config: &toml::Value) -> Result<Box<dyn StoreInterface>, StoreError> {
	FileStoreSchema
		.validate(config)
		.map_err(|e| StoreError::Configuration(e.to_string()))?;

	let storage_path = config
		.get("storage_path")
		.and_then(|v| v.as_str())
		.unwrap_or(DEFAULT_STORAGE_PATH);

	Ok(Box::new(FileStore::open(storage_path)?))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = crate::StoreFactory;

	fn factory() -> Self::Factory {
		create_store
	}
}

impl crate::StoreRegistry for Registry {}
