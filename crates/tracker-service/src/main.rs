//! Main entry point for the package tracker service.
//!
//! Polls the configured order source, publishes one state record per package
//! and keeps the dashboard views rendered. The HTTP API is optional.

use clap::Parser;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracker_config::Config;
use tracker_core::{TrackerBuilder, TrackerEngine, TrackerFactories};
use tracker_source::SourceFactory;
use tracker_store::StoreFactory;
use tracker_view::{spawn_projection, Projector, ViewDescription, ViewId};

mod apis;
mod server;

use apis::views::ViewChannels;

/// Command-line arguments for the tracker service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started package tracker");

	let config = Config::from_file(&args.config.to_string_lossy()).await?;
	tracing::info!("Loaded configuration [{}]", config.tracker.id);

	let engine = Arc::new(build_tracker(config.clone()).await?);
	engine.initialize().await?;

	let views = start_projections(&config, &engine).await;

	match config.api.clone().filter(|api| api.enabled) {
		Some(api_config) => {
			let engine_task = engine.run();
			let api_task = server::start_server(api_config, Arc::clone(&engine), views);

			tokio::select! {
				result = engine_task => {
					tracing::info!("Tracker finished");
					result?;
				}
				result = api_task => {
					tracing::info!("API server finished");
					result?;
				}
			}
		},
		None => {
			tracing::info!("Starting tracker only");
			engine.run().await?;
		},
	}

	engine.shutdown().await?;
	tracing::info!("Stopped package tracker");
	Ok(())
}

/// Collects registered `(name, factory)` pairs into a lookup map.
fn factory_map<F>(implementations: Vec<(&'static str, F)>) -> HashMap<String, F> {
	implementations
		.into_iter()
		.map(|(name, factory)| (name.to_string(), factory))
		.collect()
}

/// Every store and source implementation registered by the library crates.
fn factories() -> TrackerFactories<StoreFactory, SourceFactory> {
	TrackerFactories {
		store_factories: factory_map(tracker_store::get_all_implementations()),
		source_factories: factory_map(tracker_source::get_all_implementations()),
	}
}

async fn build_tracker(config: Config) -> Result<TrackerEngine, Box<dyn std::error::Error>> {
	Ok(TrackerBuilder::new(config).build(factories()).await?)
}

/// Starts one projection per view and logs every re-render.
async fn start_projections(config: &Config, engine: &TrackerEngine) -> ViewChannels {
	let projector = Arc::new(Projector::from_config(config));
	let mut views = ViewChannels::new();

	for view in [ViewId::AllPackages, ViewId::PendingPackages] {
		let (receiver, _) =
			spawn_projection(Arc::clone(&projector), Arc::clone(engine.store()), view).await;
		tokio::spawn(log_view_updates(view, receiver.clone()));
		views.insert(view, receiver);
	}
	views
}

async fn log_view_updates(view: ViewId, mut receiver: watch::Receiver<ViewDescription>) {
	while receiver.changed().await.is_ok() {
		let body = serde_json::to_string(&receiver.borrow_and_update().body).unwrap_or_default();
		tracing::debug!(component = "view", view = %view, body = %body, "View updated");
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tempfile::tempdir;
	use tracker_config::builders::ConfigBuilder;
	use tracker_view::ViewBody;

	#[test]
	fn test_args_default_values() {
		let args = Args::parse_from(["package-tracker"]);
		assert_eq!(args.config, PathBuf::from("config.toml"));
		assert_eq!(args.log_level, "info");
	}

	#[test]
	fn test_args_custom_values() {
		let args = Args::parse_from(["package-tracker", "-c", "custom.toml", "--log-level", "debug"]);
		assert_eq!(args.config, PathBuf::from("custom.toml"));
		assert_eq!(args.log_level, "debug");
	}

	#[test]
	fn test_factories_follow_registry() {
		let factories = factories();

		let mut stores: Vec<_> = factories.store_factories.keys().cloned().collect();
		stores.sort();
		assert_eq!(stores, vec!["file", "memory"]);

		let mut sources: Vec<_> = factories.source_factories.keys().cloned().collect();
		sources.sort();
		let mut registered: Vec<_> = tracker_source::get_all_implementations()
			.into_iter()
			.map(|(name, _)| name.to_string())
			.collect();
		registered.sort();
		assert_eq!(sources, registered);
		assert!(sources.contains(&"mail".to_string()));
	}

	#[tokio::test]
	async fn test_build_tracker_with_minimal_config() {
		let config = ConfigBuilder::new().tracker_id("minimal").build();
		let tracker = build_tracker(config).await.unwrap();
		assert_eq!(tracker.config().tracker.id, "minimal");
	}

	#[tokio::test]
	async fn test_build_tracker_from_file_config() {
		let dir = tempdir().unwrap();
		let orders = dir.path().join("orders.json");
		std::fs::write(
			&orders,
			r#"{"orders": [{"order_number": "302-1", "status": "Out for delivery", "carrier": "DHL"}]}"#,
		)
		.unwrap();

		let config_path = dir.path().join("config.toml");
		std::fs::write(
			&config_path,
			format!(
				r#"
[tracker]
id = "home"
amazon_domain = "amazon.de"

[store]
primary = "file"
[store.implementations.file]
storage_path = "{states}"

[source]
primary = "file"
[source.implementations.file]
path = "{orders}"
"#,
				states = dir.path().join("states").display(),
				orders = orders.display(),
			),
		)
		.unwrap();

		let config = Config::from_file(&config_path.to_string_lossy()).await.unwrap();
		let engine = Arc::new(build_tracker(config.clone()).await.unwrap());
		engine.initialize().await.unwrap();
		let views = start_projections(&config, &engine).await;

		engine.refresh().await;

		let mut pending = views[&ViewId::PendingPackages].clone();
		let description = pending
			.wait_for(|view| matches!(view.body, ViewBody::Pending { .. }))
			.await
			.unwrap()
			.clone();
		assert_eq!(description.title, "Ausstehende Pakete");
		match description.body {
			ViewBody::Pending { rows } => {
				assert_eq!(rows[0].name, "302-1");
				assert_eq!(rows[0].status, "In Zustellung");
				assert_eq!(rows[0].badge, "badge-out-for-delivery");
			},
			other => panic!("unexpected body {:?}", other),
		}
	}
}
