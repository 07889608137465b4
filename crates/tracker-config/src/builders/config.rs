//! Fluent builder for tracker configurations used in tests.

use crate::{ApiConfig, Config, SourceConfig, StoreConfig, TrackerConfig, ViewConfig};
use std::collections::HashMap;

/// Builds a [`Config`] with an in-memory store and a fixture source.
///
/// The result is not run through validation, so tests can also construct
/// configurations the loader would reject.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	tracker_id: String,
	amazon_domain: String,
	scan_interval_minutes: u64,
	fetch_timeout_seconds: u64,
	removal_grace_cycles: u32,
	show_delivered: bool,
	tracking_duration_days: u32,
	delivered_duration_days: u32,
	store_primary: String,
	store_implementations: HashMap<String, toml::Value>,
	source_primary: String,
	source_implementations: HashMap<String, toml::Value>,
	view: ViewConfig,
	api: Option<ApiConfig>,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

fn empty_table() -> toml::Value {
	toml::Value::Table(toml::Table::new())
}

impl ConfigBuilder {
	pub fn new() -> Self {
		let mut fixture = toml::Table::new();
		fixture.insert("orders".into(), toml::Value::Array(Vec::new()));

		Self {
			tracker_id: "test-tracker".to_string(),
			amazon_domain: "amazon.com".to_string(),
			scan_interval_minutes: 1,
			fetch_timeout_seconds: 5,
			removal_grace_cycles: 2,
			show_delivered: true,
			tracking_duration_days: 14,
			delivered_duration_days: 3,
			store_primary: "memory".to_string(),
			store_implementations: HashMap::from([("memory".to_string(), empty_table())]),
			source_primary: "fixture".to_string(),
			source_implementations: HashMap::from([(
				"fixture".to_string(),
				toml::Value::Table(fixture),
			)]),
			view: ViewConfig::default(),
			api: None,
		}
	}

	pub fn tracker_id(mut self, id: impl Into<String>) -> Self {
		self.tracker_id = id.into();
		self
	}

	pub fn amazon_domain(mut self, domain: impl Into<String>) -> Self {
		self.amazon_domain = domain.into();
		self
	}

	pub fn scan_interval_minutes(mut self, minutes: u64) -> Self {
		self.scan_interval_minutes = minutes;
		self
	}

	pub fn fetch_timeout_seconds(mut self, seconds: u64) -> Self {
		self.fetch_timeout_seconds = seconds;
		self
	}

	pub fn removal_grace_cycles(mut self, cycles: u32) -> Self {
		self.removal_grace_cycles = cycles;
		self
	}

	pub fn show_delivered(mut self, show: bool) -> Self {
		self.show_delivered = show;
		self
	}

	pub fn tracking_duration_days(mut self, days: u32) -> Self {
		self.tracking_duration_days = days;
		self
	}

	pub fn delivered_duration_days(mut self, days: u32) -> Self {
		self.delivered_duration_days = days;
		self
	}

	/// Uses `name` as primary store with the given implementation table.
	pub fn store(mut self, name: impl Into<String>, config: toml::Value) -> Self {
		let name = name.into();
		self.store_implementations.insert(name.clone(), config);
		self.store_primary = name;
		self
	}

	/// Uses `name` as primary source with the given implementation table.
	pub fn source(mut self, name: impl Into<String>, config: toml::Value) -> Self {
		let name = name.into();
		self.source_implementations.insert(name.clone(), config);
		self.source_primary = name;
		self
	}

	pub fn view(mut self, view: ViewConfig) -> Self {
		self.view = view;
		self
	}

	pub fn api(mut self, api: Option<ApiConfig>) -> Self {
		self.api = api;
		self
	}

	pub fn build(self) -> Config {
		Config {
			tracker: TrackerConfig {
				id: self.tracker_id,
				amazon_domain: self.amazon_domain,
				scan_interval_minutes: self.scan_interval_minutes,
				fetch_timeout_seconds: self.fetch_timeout_seconds,
				removal_grace_cycles: self.removal_grace_cycles,
				show_delivered: self.show_delivered,
				tracking_duration_days: self.tracking_duration_days,
				delivered_duration_days: self.delivered_duration_days,
			},
			store: StoreConfig {
				primary: self.store_primary,
				implementations: self.store_implementations,
			},
			source: SourceConfig {
				primary: self.source_primary,
				implementations: self.source_implementations,
			},
			view: self.view,
			api: self.api,
		}
	}
}
