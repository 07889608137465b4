//! Order source with records written inline in the configuration.
//!
//! ```toml
//! [source.implementations.fixture]
//! orders = [
//!   { id = "302-1234567-1234567", status = "shipped", carrier = "DHL", estimated_delivery = 2024-03-10 },
//! ]
//! ```

use crate::{OrderSourceInterface, SourceError};
use async_trait::async_trait;
use serde_json::Value;
use tracker_types::{
	ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, ValidationError,
};

pub struct FixtureSource {
	records: Vec<Value>,
}

impl FixtureSource {
	pub fn new(records: Vec<Value>) -> Self {
		Self { records }
	}
}

#[async_trait]
impl OrderSourceInterface for FixtureSource {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(FixtureSourceSchema)
	}

	async fn fetch_orders(&self) -> Result<Vec<Value>, SourceError> {
		Ok(self.records.clone())
	}
}

pub struct FixtureSourceSchema;

impl ConfigSchema for FixtureSourceSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let order = Schema::new(vec![], vec![]);
		Schema::new(
			vec![Field::new("orders", FieldType::Array(Box::new(FieldType::Table(order))))],
			vec![],
		)
		.strict()
		.validate(config)
	}
}

/// Converts TOML into JSON. TOML dates become their string form.
fn toml_to_json(value: &toml::Value) -> Value {
	match value {
		toml::Value::String(s) => Value::String(s.clone()),
		toml::Value::Integer(i) => Value::from(*i),
		toml::Value::Float(f) => Value::from(*f),
		toml::Value::Boolean(b) => Value::Bool(*b),
		toml::Value::Datetime(dt) => Value::String(dt.to_string()),
		toml::Value::Array(items) => Value::Array(items.iter().map(toml_to_json).collect()),
		toml::Value::Table(table) => Value::Object(
			table
				.iter()
				.map(|(k, v)| (k.clone(), toml_to_json(v)))
				.collect(),
		),
	}
}

/// Builds a fixture source.
///
/// Configuration parameters:
/// - `orders`: array of order tables with the raw record fields
pub fn create_source(config: &toml::Value) -> Result<Box<dyn OrderSourceInterface>, SourceError> {
	FixtureSourceSchema
		.validate(config)
		.map_err(|e| SourceError::Configuration(e.to_string()))?;

	let records = config
		.get("orders")
		.and_then(|v| v.as_array())
		.map(|orders| orders.iter().map(toml_to_json).collect())
		.unwrap_or_default();

	Ok(Box::new(FixtureSource::new(records)))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "fixture";
	type Factory = crate::SourceFactory;

	fn factory() -> Self::Factory {
		create_source
	}
}

impl crate::SourceRegistry for Registry {}
