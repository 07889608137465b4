//! Loading of configurations split across several files.
//!
//! The entry file may list other files under `include`. Included files are
//! resolved relative to the entry file's directory, may not include each
//! other in a cycle and may not redefine a top-level section.

use crate::{resolve_env_vars, Config, ConfigError};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

const INCLUDE_KEY: &str = "include";

pub struct ConfigLoader {
	base_path: PathBuf,
	/// Canonical paths already read, for cycle detection.
	loaded_files: HashSet<PathBuf>,
	/// Which file each top-level section came from.
	section_sources: HashMap<String, PathBuf>,
}

impl ConfigLoader {
	pub fn new(base_path: impl AsRef<Path>) -> Self {
		Self {
			base_path: base_path.as_ref().to_path_buf(),
			loaded_files: HashSet::new(),
			section_sources: HashMap::new(),
		}
	}

	/// Loads the entry file and everything it includes into one [`Config`].
	pub async fn load_config(
		&mut self,
		config_path: impl AsRef<Path>,
	) -> Result<Config, ConfigError> {
		let config_path = self.resolve_path(config_path)?;
		let content = self.read_resolved(&config_path).await?;
		let mut root: toml::Value = toml::from_str(&content)?;

		let includes = includes_of(&root)?;
		if includes.is_empty() {
			return content.parse();
		}

		if let Some(table) = root.as_table_mut() {
			table.remove(INCLUDE_KEY);
		}
		self.record_sections(&root, &config_path)?;

		for include in includes {
			let path = self.resolve_path(&include)?;
			let included: toml::Value = toml::from_str(&self.read_resolved(&path).await?)?;
			self.record_sections(&included, &path)?;

			if let (Some(target), Some(source)) = (root.as_table_mut(), included.as_table()) {
				for (key, value) in source {
					target.insert(key.clone(), value.clone());
				}
			}
		}

		let combined = toml::to_string(&root).map_err(|e| {
			ConfigError::Parse(format!("Failed to serialize combined config: {}", e))
		})?;
		combined.parse()
	}

	/// Reads a file once and resolves environment variables in it.
	async fn read_resolved(&mut self, path: &Path) -> Result<String, ConfigError> {
		let canonical = path.canonicalize().map_err(|e| {
			ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Cannot resolve path {}: {}", path.display(), e),
			))
		})?;

		if !self.loaded_files.insert(canonical.clone()) {
			return Err(ConfigError::Validation(format!(
				"Circular include detected: {} was already loaded",
				canonical.display()
			)));
		}

		let content = tokio::fs::read_to_string(path).await?;
		resolve_env_vars(&content)
	}

	fn record_sections(&mut self, value: &toml::Value, source: &Path) -> Result<(), ConfigError> {
		let Some(table) = value.as_table() else {
			return Ok(());
		};
		for key in table.keys() {
			if let Some(existing) = self.section_sources.get(key) {
				return Err(ConfigError::Validation(format!(
					"Duplicate section '{}' found in {} and {}",
					key,
					existing.display(),
					source.display()
				)));
			}
			self.section_sources
				.insert(key.clone(), source.to_path_buf());
		}
		Ok(())
	}

	fn resolve_path(&self, path: impl AsRef<Path>) -> Result<PathBuf, ConfigError> {
		let path = path.as_ref();
		let resolved = if path.is_absolute() {
			path.to_path_buf()
		} else {
			self.base_path.join(path)
		};

		if !resolved.exists() {
			return Err(ConfigError::Io(std::io::Error::new(
				std::io::ErrorKind::NotFound,
				format!("Configuration file not found: {}", resolved.display()),
			)));
		}
		Ok(resolved)
	}
}

/// Reads the `include` directive, which is either one path or a list.
fn includes_of(value: &toml::Value) -> Result<Vec<PathBuf>, ConfigError> {
	match value.get(INCLUDE_KEY) {
		None => Ok(Vec::new()),
		Some(toml::Value::String(path)) => Ok(vec![PathBuf::from(path)]),
		Some(toml::Value::Array(items)) => items
			.iter()
			.map(|item| {
				item.as_str().map(PathBuf::from).ok_or_else(|| {
					ConfigError::Validation("Include array must contain only strings".into())
				})
			})
			.collect(),
		Some(_) => Err(ConfigError::Validation(
			"Include must be a string or array of strings".into(),
		)),
	}
}
