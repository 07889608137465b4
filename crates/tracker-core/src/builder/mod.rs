//! Builder for assembling a tracker engine from configuration.
//!
//! Store and source implementations are created through factory functions
//! keyed by implementation name, so the binary decides which backends are
//! compiled in and the configuration decides which one is used.

use crate::engine::{event_bus::EventBus, TrackerEngine};
use crate::poller::{OrderPoller, PollerSettings};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracker_config::Config;
use tracker_source::{OrderSourceInterface, SourceError, SourceService};
use tracker_store::{StateStore, StoreError, StoreInterface};

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions for every store and source implementation the binary
/// knows about.
pub struct TrackerFactories<SF, OF> {
	pub store_factories: HashMap<String, SF>,
	pub source_factories: HashMap<String, OF>,
}

const EVENT_BUS_CAPACITY: usize = 1000;

pub struct TrackerBuilder {
	config: Config,
}

impl TrackerBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	/// Builds the engine using the primary store and source.
	///
	/// Every configured implementation that has a factory is created and its
	/// table checked against the implementation's schema, so configuration
	/// errors surface at startup, even for non-primary ones.
	pub async fn build<SF, OF>(
		self,
		factories: TrackerFactories<SF, OF>,
	) -> Result<TrackerEngine, BuilderError>
	where
		SF: Fn(&toml::Value) -> Result<Box<dyn StoreInterface>, StoreError>,
		OF: Fn(&toml::Value) -> Result<Box<dyn OrderSourceInterface>, SourceError>,
	{
		let mut store_impls = HashMap::new();
		for (name, config) in &self.config.store.implementations {
			if let Some(factory) = factories.store_factories.get(name) {
				match factory(config) {
					Ok(implementation) => {
						if let Err(e) = implementation.config_schema().validate(config) {
							tracing::error!(
								component = "store",
								implementation = %name,
								error = %e,
								"Invalid configuration for store implementation"
							);
							return Err(BuilderError::Config(format!(
								"Invalid configuration for store implementation '{}': {}",
								name, e
							)));
						}
						store_impls.insert(name.clone(), implementation);
						let is_primary = &self.config.store.primary == name;
						tracing::info!(component = "store", implementation = %name, enabled = %is_primary, "Loaded");
					},
					Err(e) => {
						tracing::error!(
							component = "store",
							implementation = %name,
							error = %e,
							"Failed to create store implementation"
						);
						return Err(BuilderError::Config(format!(
							"Failed to create store implementation '{}': {}",
							name, e
						)));
					},
				}
			}
		}

		let primary_store = self.config.store.primary.as_str();
		let backend = store_impls.remove(primary_store).ok_or_else(|| {
			BuilderError::MissingComponent(format!(
				"Primary store '{}' has no registered implementation",
				primary_store
			))
		})?;
		let store = Arc::new(StateStore::new(backend));

		let mut source_impls = HashMap::new();
		for (name, config) in &self.config.source.implementations {
			if let Some(factory) = factories.source_factories.get(name) {
				match factory(config) {
					Ok(implementation) => {
						if let Err(e) = implementation.config_schema().validate(config) {
							tracing::error!(
								component = "source",
								implementation = %name,
								error = %e,
								"Invalid configuration for source implementation"
							);
							return Err(BuilderError::Config(format!(
								"Invalid configuration for source implementation '{}': {}",
								name, e
							)));
						}
						source_impls.insert(name.clone(), implementation);
						let is_primary = &self.config.source.primary == name;
						tracing::info!(component = "source", implementation = %name, enabled = %is_primary, "Loaded");
					},
					Err(e) => {
						tracing::error!(
							component = "source",
							implementation = %name,
							error = %e,
							"Failed to create source implementation"
						);
						return Err(BuilderError::Config(format!(
							"Failed to create source implementation '{}': {}",
							name, e
						)));
					},
				}
			}
		}

		let primary_source = self.config.source.primary.as_str();
		let source = source_impls.remove(primary_source).ok_or_else(|| {
			BuilderError::MissingComponent(format!(
				"Primary source '{}' has no registered implementation",
				primary_source
			))
		})?;
		let source = Arc::new(SourceService::new(primary_source, source));

		let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
		let poller = Arc::new(OrderPoller::new(
			source,
			store.clone(),
			event_bus.clone(),
			PollerSettings::from(&self.config.tracker),
		));

		Ok(TrackerEngine::new(self.config, store, poller, event_bus))
	}
}
