//! Order sources for the package tracker.
//!
//! A source fetches the raw order and shipment records of one Amazon
//! account. Sources know nothing about the package model: they hand back
//! JSON values, and [`SourceService`] turns those into [`Package`]s,
//! dropping malformed records and merging duplicates.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;
use tracker_types::{
	package_key, ConfigSchema, ImplementationRegistry, MalformedRecord, Package, RawOrderRecord,
};

pub mod implementations {
	pub mod file;
	pub mod fixture;
	pub mod http;
	pub mod mail;
}

/// Errors that can occur while fetching orders.
#[derive(Debug, Error)]
pub enum SourceError {
	/// The source could not be reached or refused access.
	#[error("Source unavailable: {0}")]
	Unavailable(String),
	/// The source answered with a document that is not an order list.
	#[error("Invalid order document: {0}")]
	InvalidDocument(String),
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Interface of an account-scoped order source.
#[async_trait]
pub trait OrderSourceInterface: Send + Sync {
	/// Returns the configuration schema for this source.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Fetches the current order list as raw records.
	async fn fetch_orders(&self) -> Result<Vec<Value>, SourceError>;
}

/// Factory building a source from its `[source.implementations.<name>]` table.
pub type SourceFactory = fn(&toml::Value) -> Result<Box<dyn OrderSourceInterface>, SourceError>;

pub trait SourceRegistry: ImplementationRegistry<Factory = SourceFactory> {}

/// All built-in sources as `(name, factory)` pairs.
pub fn get_all_implementations() -> Vec<(&'static str, SourceFactory)> {
	use implementations::{file, fixture, http, mail};

	vec![
		(file::Registry::NAME, file::Registry::factory()),
		(fixture::Registry::NAME, fixture::Registry::factory()),
		(http::Registry::NAME, http::Registry::factory()),
		(mail::Registry::NAME, mail::Registry::factory()),
	]
}

/// Extracts the record list from an order document.
///
/// Accepts a bare array or an object carrying the array under `orders`.
pub fn records_from_document(document: Value) -> Result<Vec<Value>, SourceError> {
	match document {
		Value::Array(records) => Ok(records),
		Value::Object(mut object) => match object.remove("orders") {
			Some(Value::Array(records)) => Ok(records),
			Some(other) => Err(SourceError::InvalidDocument(format!(
				"'orders' must be an array, got {}",
				json_type(&other)
			))),
			None => Err(SourceError::InvalidDocument(
				"object has no 'orders' array".into(),
			)),
		},
		other => Err(SourceError::InvalidDocument(format!(
			"expected an array or an object, got {}",
			json_type(&other)
		))),
	}
}

fn json_type(value: &Value) -> &'static str {
	match value {
		Value::Null => "null",
		Value::Bool(_) => "boolean",
		Value::Number(_) => "number",
		Value::String(_) => "string",
		Value::Array(_) => "array",
		Value::Object(_) => "object",
	}
}

/// Result of one fetch after normalization.
#[derive(Debug, Default)]
pub struct FetchOutcome {
	/// Valid packages, one per store key, in first-seen order.
	pub packages: Vec<Package>,
	/// Records that were dropped.
	pub dropped: Vec<MalformedRecord>,
}

/// Turns raw records into packages.
///
/// Malformed records are dropped individually. Records with the same id
/// are merged with [`Package::absorb`].
pub fn normalize(records: Vec<Value>) -> FetchOutcome {
	let mut outcome = FetchOutcome::default();
	let mut positions: HashMap<String, usize> = HashMap::new();

	for record in records {
		let package = match RawOrderRecord::from_value(record).and_then(Package::try_from) {
			Ok(package) => package,
			Err(reason) => {
				tracing::warn!(component = "source", reason = %reason, "Dropping malformed record");
				outcome.dropped.push(reason);
				continue;
			},
		};

		match positions.get(&package.id) {
			Some(&index) => {
				let existing = &mut outcome.packages[index];
				if existing.absorb(package) {
					tracing::debug!(
						component = "source",
						key = %package_key(&existing.id),
						"Merged duplicate record"
					);
				}
			},
			None => {
				positions.insert(package.id.clone(), outcome.packages.len());
				outcome.packages.push(package);
			},
		}
	}

	outcome
}

/// Fetches from the configured source and normalizes the result.
pub struct SourceService {
	name: String,
	source: Box<dyn OrderSourceInterface>,
}

impl SourceService {
	pub fn new(name: impl Into<String>, source: Box<dyn OrderSourceInterface>) -> Self {
		Self {
			name: name.into(),
			source,
		}
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub async fn fetch(&self) -> Result<FetchOutcome, SourceError> {
		let records = self.source.fetch_orders().await?;
		let fetched = records.len();
		let outcome = normalize(records);

		tracing::debug!(
			component = "source",
			implementation = %self.name,
			fetched,
			packages = outcome.packages.len(),
			dropped = outcome.dropped.len(),
			"Fetched orders"
		);
		Ok(outcome)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;
	use std::collections::HashSet;
	use tracker_types::PackageStatus;

	#[test]
	fn test_records_from_document() {
		assert_eq!(records_from_document(json!([{"id": "a"}])).unwrap().len(), 1);
		assert_eq!(
			records_from_document(json!({"orders": [{"id": "a"}, {"id": "b"}]}))
				.unwrap()
				.len(),
			2
		);
		assert!(records_from_document(json!({"orders": "none"})).is_err());
		assert!(records_from_document(json!({"items": []})).is_err());
		assert!(records_from_document(json!("orders")).is_err());
	}

	#[test]
	fn test_normalize_drops_malformed() {
		let outcome = normalize(vec![
			json!({"id": "A", "status": "shipped", "carrier": "DHL"}),
			json!({"product_name": "No id", "status": "shipped"}),
			json!({"id": "B"}),
			json!(42),
			json!({"order_number": "C", "status": "ordered"}),
		]);

		let ids: Vec<_> = outcome.packages.iter().map(|p| p.id.as_str()).collect();
		assert_eq!(ids, vec!["A", "C"]);
		assert_eq!(outcome.dropped.len(), 3);
		assert!(outcome.dropped.contains(&MalformedRecord::MissingIdentifier));
		assert!(outcome
			.dropped
			.contains(&MalformedRecord::MissingStatus("B".into())));
	}

	#[test]
	fn test_normalize_merges_duplicates() {
		let outcome = normalize(vec![
			json!({"id": "302-1", "status": "shipped", "product_name": "Widget"}),
			json!({"id": "302-1", "status": "ordered", "carrier": "DHL"}),
			json!({"id": " 302-1 ", "status": "delivered"}),
		]);

		assert_eq!(outcome.packages.len(), 1);
		let package = &outcome.packages[0];
		assert_eq!(package.status, PackageStatus::Delivered);
		assert_eq!(package.product_name.as_deref(), Some("Widget"));
		assert_eq!(package.carrier.as_deref(), Some("DHL"));
		assert!(outcome.dropped.is_empty());
	}

	#[test]
	fn test_normalize_keeps_similar_ids_apart() {
		let outcome = normalize(vec![
			json!({"id": "Bestellung-Ä", "status": "shipped", "product_name": "Widget"}),
			json!({"id": "Bestellung-Ö", "status": "ordered", "product_name": "Gadget"}),
			json!({"id": "A.1", "status": "ordered"}),
			json!({"id": "A-1", "status": "ordered"}),
			json!({"id": "a_1", "status": "ordered"}),
		]);

		let ids: Vec<_> = outcome.packages.iter().map(|p| p.id.as_str()).collect();
		assert_eq!(ids, vec!["Bestellung-Ä", "Bestellung-Ö", "A.1", "A-1", "a_1"]);
		assert_eq!(outcome.packages[1].product_name.as_deref(), Some("Gadget"));
		assert!(outcome.dropped.is_empty());

		let keys: HashSet<_> = outcome.packages.iter().map(|p| package_key(&p.id)).collect();
		assert_eq!(keys.len(), 5);
	}

	#[test]
	fn test_registered_implementations() {
		let names: Vec<_> = get_all_implementations().into_iter().map(|(n, _)| n).collect();
		assert_eq!(names, vec!["file", "fixture", "http", "mail"]);
	}
}
