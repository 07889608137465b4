//! Configuration for the Amazon package tracker.
//!
//! Configuration is read from a TOML file. String values may reference
//! environment variables as `${VAR}` or `${VAR:-default}`, which keeps account
//! tokens out of the file itself.
//!
//! ## Modular Configuration Support
//!
//! A file may pull in other files with `include = ["store.toml", ...]`. Each
//! top-level section must appear in exactly one of them.

mod loader;

#[cfg(any(test, feature = "testing"))]
pub mod builders;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use tracker_types::{marketplace, Marketplace, DEFAULT_MARKETPLACE};

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	#[error("Configuration error: {0}")]
	Parse(String),
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Only the message; the default Display repeats the whole input.
		ConfigError::Parse(err.message().to_string())
	}
}

/// Top-level tracker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	/// Poller settings and the Amazon account this tracker instance follows.
	pub tracker: TrackerConfig,
	/// Backend of the shared state store.
	pub store: StoreConfig,
	/// Where orders are fetched from.
	pub source: SourceConfig,
	/// Dashboard view settings.
	#[serde(default)]
	pub view: ViewConfig,
	/// HTTP API server.
	pub api: Option<ApiConfig>,
}

/// Poller settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackerConfig {
	/// Identifier of this tracker instance, used in logs.
	pub id: String,
	/// Marketplace domain, e.g. `amazon.de`.
	#[serde(default = "default_amazon_domain")]
	pub amazon_domain: String,
	/// Minutes between two polling cycles.
	#[serde(default = "default_scan_interval_minutes")]
	pub scan_interval_minutes: u64,
	/// Upper bound for a single fetch.
	#[serde(default = "default_fetch_timeout_seconds")]
	pub fetch_timeout_seconds: u64,
	/// Consecutive successful cycles a package may be missing before its
	/// record is removed.
	#[serde(default = "default_removal_grace_cycles")]
	pub removal_grace_cycles: u32,
	/// Whether delivered packages keep an individual record.
	#[serde(default = "default_true")]
	pub show_delivered: bool,
	/// Days a package stays tracked after its record last changed.
	#[serde(default = "default_tracking_duration_days")]
	pub tracking_duration_days: u32,
	/// Days a delivered package stays visible after its record last changed.
	#[serde(default = "default_delivered_duration_days")]
	pub delivered_duration_days: u32,
}

impl TrackerConfig {
	pub fn scan_interval(&self) -> Duration {
		Duration::from_secs(self.scan_interval_minutes * 60)
	}

	pub fn fetch_timeout(&self) -> Duration {
		Duration::from_secs(self.fetch_timeout_seconds)
	}

	pub fn tracking_duration(&self) -> Duration {
		days(self.tracking_duration_days)
	}

	pub fn delivered_duration(&self) -> Duration {
		days(self.delivered_duration_days)
	}

	/// The configured marketplace. Validation guarantees it exists.
	pub fn marketplace(&self) -> Option<&'static Marketplace> {
		marketplace(&self.amazon_domain)
	}
}

fn default_amazon_domain() -> String {
	DEFAULT_MARKETPLACE.to_string()
}

fn default_scan_interval_minutes() -> u64 {
	30
}

fn default_fetch_timeout_seconds() -> u64 {
	120
}

fn default_removal_grace_cycles() -> u32 {
	2
}

fn default_true() -> bool {
	true
}

fn default_tracking_duration_days() -> u32 {
	14
}

fn default_delivered_duration_days() -> u32 {
	3
}

fn days(count: u32) -> Duration {
	Duration::from_secs(u64::from(count) * 24 * 60 * 60)
}

/// Configuration for the state store backend.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of store implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Configuration for the order source.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
	/// Which implementation to use as primary.
	pub primary: String,
	/// Map of source implementation names to their configurations.
	pub implementations: HashMap<String, toml::Value>,
}

/// Dashboard view settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ViewConfig {
	/// Display locale such as `de-DE`. Falls back to the marketplace language.
	pub locale: Option<String>,
	/// Locale used when a key is missing from the display locale's table.
	#[serde(default = "default_locale")]
	pub default_locale: String,
	/// Base URL of the carrier logos.
	#[serde(default = "default_asset_base_url")]
	pub asset_base_url: String,
	/// Local directory holding the carrier logos. When set, missing logos
	/// are detected at render time.
	pub asset_dir: Option<PathBuf>,
	/// Asset name used for unknown carriers and missing logos.
	#[serde(default = "default_asset")]
	pub default_asset: String,
}

impl Default for ViewConfig {
	fn default() -> Self {
		Self {
			locale: None,
			default_locale: default_locale(),
			asset_base_url: default_asset_base_url(),
			asset_dir: None,
			default_asset: default_asset(),
		}
	}
}

fn default_locale() -> String {
	"en".to_string()
}

fn default_asset_base_url() -> String {
	"/local/amazon_tracker/carriers".to_string()
}

fn default_asset() -> String {
	"unknown".to_string()
}

/// Configuration for the HTTP API server.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiConfig {
	#[serde(default)]
	pub enabled: bool,
	#[serde(default = "default_api_host")]
	pub host: String,
	#[serde(default = "default_api_port")]
	pub port: u16,
}

fn default_api_host() -> String {
	"127.0.0.1".to_string()
}

fn default_api_port() -> u16 {
	8123
}

/// Resolves environment variables in a string.
///
/// Replaces `${VAR_NAME}` with the value of `VAR_NAME`, or with `default` for
/// `${VAR_NAME:-default}` when the variable is unset. Input is limited to 1MB.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut result = String::with_capacity(input.len());
	let mut last = 0;

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let value = match (std::env::var(var_name.as_str()), cap.get(2)) {
			(Ok(v), _) => v,
			(Err(_), Some(default)) => default.as_str().to_string(),
			(Err(_), None) => {
				return Err(ConfigError::Validation(format!(
					"Environment variable '{}' not found",
					var_name.as_str()
				)))
			},
		};

		result.push_str(&input[last..full_match.start()]);
		result.push_str(&value);
		last = full_match.end();
	}
	result.push_str(&input[last..]);

	Ok(result)
}

impl Config {
	/// Loads configuration from a file, following `include` directives.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Locale the views render in: the configured one, else the marketplace
	/// language, else the default locale.
	pub fn view_locale(&self) -> String {
		self.view
			.locale
			.clone()
			.filter(|l| !l.trim().is_empty())
			.or_else(|| {
				self.tracker
					.marketplace()
					.map(|m| m.language.to_string())
			})
			.unwrap_or_else(|| self.view.default_locale.clone())
	}

	fn validate(&self) -> Result<(), ConfigError> {
		let tracker = &self.tracker;
		if tracker.id.trim().is_empty() {
			return Err(ConfigError::Validation("Tracker ID cannot be empty".into()));
		}
		if tracker.marketplace().is_none() {
			return Err(ConfigError::Validation(format!(
				"Unsupported amazon_domain '{}'",
				tracker.amazon_domain
			)));
		}
		if !(1..=1440).contains(&tracker.scan_interval_minutes) {
			return Err(ConfigError::Validation(
				"scan_interval_minutes must be between 1 and 1440".into(),
			));
		}
		if !(1..=3600).contains(&tracker.fetch_timeout_seconds) {
			return Err(ConfigError::Validation(
				"fetch_timeout_seconds must be between 1 and 3600".into(),
			));
		}
		if tracker.fetch_timeout() >= tracker.scan_interval() {
			return Err(ConfigError::Validation(format!(
				"fetch_timeout_seconds ({}) must be shorter than the scan interval ({}s)",
				tracker.fetch_timeout_seconds,
				tracker.scan_interval().as_secs()
			)));
		}
		if tracker.removal_grace_cycles == 0 {
			return Err(ConfigError::Validation(
				"removal_grace_cycles must be at least 1".into(),
			));
		}
		if !(1..=365).contains(&tracker.tracking_duration_days) {
			return Err(ConfigError::Validation(
				"tracking_duration_days must be between 1 and 365".into(),
			));
		}
		if tracker.delivered_duration_days > tracker.tracking_duration_days {
			return Err(ConfigError::Validation(format!(
				"delivered_duration_days ({}) cannot exceed tracking_duration_days ({})",
				tracker.delivered_duration_days, tracker.tracking_duration_days
			)));
		}

		validate_primary("store", &self.store.primary, &self.store.implementations)?;
		validate_primary("source", &self.source.primary, &self.source.implementations)?;

		if self.view.default_locale.trim().is_empty() {
			return Err(ConfigError::Validation(
				"view.default_locale cannot be empty".into(),
			));
		}
		if self.view.default_asset.trim().is_empty() {
			return Err(ConfigError::Validation(
				"view.default_asset cannot be empty".into(),
			));
		}

		if let Some(api) = self.api.as_ref().filter(|api| api.enabled) {
			if api.port == 0 {
				return Err(ConfigError::Validation("API port cannot be 0".into()));
			}
		}

		Ok(())
	}
}

fn validate_primary(
	section: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
) -> Result<(), ConfigError> {
	if implementations.is_empty() {
		return Err(ConfigError::Validation(format!(
			"At least one {} implementation must be configured",
			section
		)));
	}
	if primary.is_empty() {
		return Err(ConfigError::Validation(format!(
			"{} primary implementation cannot be empty",
			section
		)));
	}
	if !implementations.contains_key(primary) {
		return Err(ConfigError::Validation(format!(
			"Primary {} '{}' not found in implementations",
			section, primary
		)));
	}
	Ok(())
}

/// Parses a TOML string, resolving environment variables and validating the
/// result.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}
