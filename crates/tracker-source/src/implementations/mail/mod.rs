//! Order source reading Amazon shipment notification mails.
//!
//! Mail retrieval stays external (fetchmail, offlineimap, a mail client
//! export). This source reads whatever landed on disk: `*.eml` files in the
//! configured directory, and every message in its `cur` and `new`
//! subdirectories when it is a maildir. Each accepted mail becomes one raw
//! order record; several mails about the same order are merged downstream.

mod message;
mod notification;

pub use message::{html_to_text, MailMessage, MessageError};
pub use notification::{Notification, NotificationParser};

use crate::{OrderSourceInterface, SourceError};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracker_types::{
	marketplace, validation::non_blank, ConfigSchema, Field, FieldType, ImplementationRegistry,
	Marketplace, Schema, ValidationError,
};

/// Maildir subdirectories holding delivered messages.
const MAILDIR_FOLDERS: [&str; 2] = ["cur", "new"];

pub struct MailSource {
	dir: PathBuf,
	parser: NotificationParser,
}

impl MailSource {
	pub fn new(
		dir: impl Into<PathBuf>,
		marketplaces: &[&'static Marketplace],
	) -> Result<Self, SourceError> {
		let parser = NotificationParser::new(marketplaces)
			.map_err(|e| SourceError::Configuration(format!("Invalid mail pattern: {}", e)))?;
		Ok(Self {
			dir: dir.into(),
			parser,
		})
	}

	/// Message files in a stable order.
	async fn message_files(&self) -> Result<Vec<PathBuf>, SourceError> {
		let mut files = list_dir(&self.dir, |path| {
			path.extension()
				.is_some_and(|ext| ext.eq_ignore_ascii_case("eml"))
		})
		.await
		.map_err(|e| {
			SourceError::Unavailable(format!("Cannot read {}: {}", self.dir.display(), e))
		})?;

		for folder in MAILDIR_FOLDERS {
			let path = self.dir.join(folder);
			if !tokio::fs::metadata(&path).await.is_ok_and(|m| m.is_dir()) {
				continue;
			}
			let messages = list_dir(&path, |_| true).await.map_err(|e| {
				SourceError::Unavailable(format!("Cannot read {}: {}", path.display(), e))
			})?;
			files.extend(messages);
		}

		files.sort();
		Ok(files)
	}
}

/// Regular, non-hidden files of a directory accepted by `keep`.
async fn list_dir(dir: &Path, keep: impl Fn(&Path) -> bool) -> std::io::Result<Vec<PathBuf>> {
	let mut files = Vec::new();
	let mut entries = tokio::fs::read_dir(dir).await?;
	while let Some(entry) = entries.next_entry().await? {
		let path = entry.path();
		let hidden = entry.file_name().to_string_lossy().starts_with('.');
		if hidden || !entry.file_type().await?.is_file() || !keep(&path) {
			continue;
		}
		files.push(path);
	}
	Ok(files)
}

#[async_trait]
impl OrderSourceInterface for MailSource {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MailSourceSchema)
	}

	async fn fetch_orders(&self) -> Result<Vec<Value>, SourceError> {
		let today = Utc::now().date_naive();
		let files = self.message_files().await?;
		let mut records = Vec::new();

		for path in &files {
			let raw = match tokio::fs::read(path).await {
				Ok(raw) => raw,
				Err(e) => {
					tracing::warn!(
						component = "source",
						path = %path.display(),
						error = %e,
						"Skipping unreadable mail"
					);
					continue;
				},
			};
			if let Some(notification) = self.parser.parse(&raw, today) {
				records.push(notification.into_record());
			}
		}

		tracing::debug!(
			component = "source",
			mails = files.len(),
			notifications = records.len(),
			"Scanned mail directory"
		);
		Ok(records)
	}
}

pub struct MailSourceSchema;

impl ConfigSchema for MailSourceSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![
				Field::new("path", FieldType::String).with_validator(non_blank),
				Field::new("domains", FieldType::Array(Box::new(FieldType::String)))
					.with_validator(known_domains),
			],
			vec![],
		)
		.strict()
		.validate(config)
	}
}

fn known_domains(value: &toml::Value) -> Result<(), String> {
	let domains = value.as_array().map(Vec::as_slice).unwrap_or_default();
	if domains.is_empty() {
		return Err("at least one marketplace domain is required".into());
	}
	for domain in domains.iter().filter_map(|d| d.as_str()) {
		if marketplace(domain).is_none() {
			return Err(format!("unknown marketplace '{}'", domain));
		}
	}
	Ok(())
}

/// Builds a mail source.
///
/// Configuration parameters:
/// - `path`: directory of `.eml` files or a maildir
/// - `domains`: marketplaces whose notification senders are trusted, e.g. `["amazon.de"]`
pub fn create_source(config: &toml::Value) -> Result<Box<dyn OrderSourceInterface>, SourceError> {
	MailSourceSchema
		.validate(config)
		.map_err(|e| SourceError::Configuration(e.to_string()))?;

	let path = config
		.get("path")
		.and_then(|v| v.as_str())
		.ok_or_else(|| SourceError::Configuration("path is required".into()))?;
	let marketplaces: Vec<&'static Marketplace> = config
		.get("domains")
		.and_then(|v| v.as_array())
		.into_iter()
		.flatten()
		.filter_map(|d| d.as_str())
		.filter_map(marketplace)
		.collect();

	Ok(Box::new(MailSource::new(path, &marketplaces)?))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "mail";
	type Factory = crate::SourceFactory;

	fn factory() -> Self::Factory {
		create_source
	}
}

impl crate::SourceRegistry for Registry {}
