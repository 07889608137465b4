//! Tracker engine driving the poller on a fixed interval.
//!
//! The engine owns the shared state store, the event bus and the poller.
//! Each timer tick spawns a cycle on its own task so that a slow fetch never
//! delays the timer; ticks that land while a cycle is still running are
//! skipped by the poller's guard. On shutdown the engine waits for cycles
//! still in flight so no cycle is cut off mid-publish.

pub mod event_bus;
pub mod lifecycle;

use crate::poller::{CycleOutcome, OrderPoller};
use std::future::Future;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tracker_config::Config;
use tracker_store::StateStore;

/// Errors that can occur while running the engine.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Service error: {0}")]
	Service(String),
}

#[derive(Clone)]
pub struct TrackerEngine {
	pub(crate) config: Config,
	pub(crate) store: Arc<StateStore>,
	pub(crate) poller: Arc<OrderPoller>,
	pub(crate) event_bus: event_bus::EventBus,
}

impl TrackerEngine {
	pub fn new(
		config: Config,
		store: Arc<StateStore>,
		poller: Arc<OrderPoller>,
		event_bus: event_bus::EventBus,
	) -> Self {
		Self {
			config,
			store,
			poller,
			event_bus,
		}
	}

	/// Runs the polling loop until Ctrl-C.
	pub async fn run(&self) -> Result<(), EngineError> {
		self.run_until(async {
			if let Err(e) = tokio::signal::ctrl_c().await {
				tracing::error!(error = %e, "Failed to listen for shutdown signal");
				std::future::pending::<()>().await;
			}
		})
		.await
	}

	/// Runs the polling loop until `shutdown` completes.
	///
	/// The first cycle starts immediately. Cycles running when `shutdown`
	/// completes are awaited before returning.
	pub async fn run_until<F>(&self, shutdown: F) -> Result<(), EngineError>
	where
		F: Future<Output = ()>,
	{
		let period = self.config.tracker.scan_interval();
		if period.is_zero() {
			return Err(EngineError::Config("scan interval must be positive".into()));
		}

		let mut interval = tokio::time::interval(period);
		interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

		tracing::info!(
			component = "engine",
			tracker = %self.config.tracker.id,
			interval_secs = period.as_secs(),
			"Polling started"
		);

		let mut cycles = JoinSet::new();
		tokio::pin!(shutdown);
		loop {
			tokio::select! {
				_ = interval.tick() => {
					while cycles.try_join_next().is_some() {}
					let poller = self.poller.clone();
					cycles.spawn(async move { poller.run_cycle().await });
				}
				_ = &mut shutdown => {
					break;
				}
			}
		}

		if !cycles.is_empty() {
			tracing::info!(component = "engine", running = cycles.len(), "Waiting for running cycle");
		}
		while let Some(result) = cycles.join_next().await {
			match result {
				Ok(outcome) => {
					tracing::debug!(component = "engine", outcome = ?outcome, "Cycle finished during shutdown")
				},
				Err(e) => tracing::error!(component = "engine", error = %e, "Cycle task failed"),
			}
		}

		tracing::info!(component = "engine", "Polling stopped");
		Ok(())
	}

	/// Requests a cycle outside the timer and waits for its outcome.
	pub async fn refresh(&self) -> CycleOutcome {
		self.poller.run_cycle().await
	}

	pub fn event_bus(&self) -> &event_bus::EventBus {
		&self.event_bus
	}

	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn store(&self) -> &Arc<StateStore> {
		&self.store
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::poller::PollerSettings;
	use async_trait::async_trait;
	use serde_json::{json, Value};
	use std::time::Duration;
	use tracker_config::builders::ConfigBuilder;
	use tracker_source::{OrderSourceInterface, SourceError, SourceService};
	use tracker_store::implementations::memory::MemoryStore;
	use tracker_types::{package_key, ConfigSchema, Schema, ValidationError};

	struct NoConfig;

	impl ConfigSchema for NoConfig {
		fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
			Schema::new(vec![], vec![]).validate(config)
		}
	}

	/// Source that takes a while to answer.
	struct SlowSource(Duration);

	#[async_trait]
	impl OrderSourceInterface for SlowSource {
		fn config_schema(&self) -> Box<dyn ConfigSchema> {
			Box::new(NoConfig)
		}

		async fn fetch_orders(&self) -> Result<Vec<Value>, SourceError> {
			tokio::time::sleep(self.0).await;
			Ok(vec![json!({"id": "A", "status": "shipped"})])
		}
	}

	#[tokio::test(start_paused = true)]
	async fn test_shutdown_waits_for_running_cycle() {
		let config = ConfigBuilder::new().fetch_timeout_seconds(30).build();
		let store = Arc::new(StateStore::new(Box::new(MemoryStore::new())));
		let bus = event_bus::EventBus::new(16);
		let source = Arc::new(SourceService::new(
			"slow",
			Box::new(SlowSource(Duration::from_secs(5))),
		));
		let poller = Arc::new(OrderPoller::new(
			source,
			store.clone(),
			bus.clone(),
			PollerSettings::from(&config.tracker),
		));
		let engine = TrackerEngine::new(config, store.clone(), poller, bus);

		engine
			.run_until(tokio::time::sleep(Duration::from_secs(1)))
			.await
			.unwrap();

		assert!(store.get(&package_key("A")).await.unwrap().is_some());
	}
}
