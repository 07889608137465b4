//! Startup and shutdown of the tracker engine.

use super::{EngineError, TrackerEngine};
use tracker_types::{is_package_key, PENDING_KEY_PREFIX};

impl TrackerEngine {
	/// Checks that the store is readable and reports what it already holds.
	pub async fn initialize(&self) -> Result<(), EngineError> {
		let snapshot = self
			.store
			.read_all()
			.await
			.map_err(|e| EngineError::Service(format!("State store is not readable: {}", e)))?;

		let packages = snapshot.keys().filter(|key| is_package_key(key)).count();
		let aggregates = snapshot
			.keys()
			.filter(|key| key.starts_with(PENDING_KEY_PREFIX))
			.count();
		tracing::info!(
			component = "engine",
			tracker = %self.config.tracker.id,
			packages,
			aggregates,
			"Initializing tracker engine"
		);
		Ok(())
	}

	pub async fn shutdown(&self) -> Result<(), EngineError> {
		tracing::info!(component = "engine", tracker = %self.config.tracker.id, "Shutting down tracker engine");
		Ok(())
	}
}
