//! Order source reading a JSON export from disk.
//!
//! An external scraper logs into the Amazon account and writes the order
//! list to a file; this source picks up whatever the last export contains.

use crate::{records_from_document, OrderSourceInterface, SourceError};
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use tracker_types::{
	validation::non_blank, ConfigSchema, Field, FieldType, ImplementationRegistry, Schema,
	ValidationError,
};

pub struct FileSource {
	path: PathBuf,
}

impl FileSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}
}

#[async_trait]
impl OrderSourceInterface for FileSource {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FileSourceSchema)
	}

	async fn fetch_orders(&self) -> Result<Vec<Value>, SourceError> {
		let content = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
			SourceError::Unavailable(format!("Cannot read {}: {}", self.path.display(), e))
		})?;
		let document: Value = serde_json::from_str(&content).map_err(|e| {
			SourceError::InvalidDocument(format!("{}: {}", self.path.display(), e))
		})?;
		records_from_document(document)
	}
}

pub struct FileSourceSchema;

impl ConfigSchema for FileSourceSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![Field::new("path", FieldType::String).with_validator(non_blank)],
			vec![],
		)
		.strict()
		.validate(config)
	}
}

/// Builds a file source.
///
/// Configuration parameters:
/// - `path`: the JSON export, either an array of records or `{"orders": [...]}`
pub fn create_source(config: &toml::Value) -> Result<Box<dyn OrderSourceInterface>, SourceError> {
	FileSourceSchema
		.validate(config)
		.map_err(|e| SourceError::Configuration(e.to_string()))?;

	let path = config
		.get("path")
		.and_then(|v| v.as_str())
		.ok_or_else(|| SourceError::Configuration("path is required".into()))?;

	Ok(Box::new(FileSource::new(path)))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "file";
	type Factory = crate::SourceFactory;

	fn factory() -> Self::Factory {
		create_source
	}
}

impl crate::SourceRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::TempDir;

	#[tokio::test]
	async fn test_reads_wrapped_document() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("orders.json");
		std::fs::write(
			&path,
			r#"{"orders": [{"id": "A", "status": "shipped"}, {"id": "B", "status": "ordered"}]}"#,
		)
		.unwrap();

		let records = FileSource::new(&path).fetch_orders().await.unwrap();
		assert_eq!(records.len(), 2);
		assert_eq!(records[0]["id"], "A");
	}

	#[tokio::test]
	async fn test_missing_file_is_unavailable() {
		let dir = TempDir::new().unwrap();
		let source = FileSource::new(dir.path().join("absent.json"));
		assert!(matches!(
			source.fetch_orders().await,
			Err(SourceError::Unavailable(_))
		));
	}

	#[tokio::test]
	async fn test_garbage_is_invalid_document() {
		let dir = TempDir::new().unwrap();
		let path = dir.path().join("orders.json");
		std::fs::write(&path, "<html>login required</html>").unwrap();

		assert!(matches!(
			FileSource::new(&path).fetch_orders().await,
			Err(SourceError::InvalidDocument(_))
		));
	}

	#[test]
	fn test_factory_requires_path() {
		let empty = toml::Value::Table(toml::Table::new());
		assert!(matches!(
			create_source(&empty),
			Err(SourceError::Configuration(_))
		));
		let config: toml::Value = toml::from_str("path = \"./orders.json\"").unwrap();
		assert!(create_source(&config).is_ok());
	}
}
