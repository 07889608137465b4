//! Order source querying a JSON endpoint over HTTP.
//!
//! The endpoint is expected to return the same document the file source
//! reads. Requests carry an optional bearer token and are bounded by a
//! per-request timeout.

use crate::{records_from_document, OrderSourceInterface, SourceError};
use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use tracker_types::{
	validation::non_blank, ConfigSchema, Field, FieldType, ImplementationRegistry, Schema,
	SecretString, ValidationError,
};

const DEFAULT_TIMEOUT_SECONDS: u64 = 30;

pub struct HttpSource {
	url: String,
	token: Option<SecretString>,
	client: reqwest::Client,
}

impl HttpSource {
	pub fn new(
		url: impl Into<String>,
		token: Option<SecretString>,
		timeout: Duration,
	) -> Result<Self, SourceError> {
		let client = reqwest::Client::builder()
			.timeout(timeout)
			.pool_max_idle_per_host(1)
			.build()
			.map_err(|e| SourceError::Configuration(format!("Cannot build HTTP client: {}", e)))?;

		Ok(Self {
			url: url.into(),
			token: token.filter(|t| !t.is_empty()),
			client,
		})
	}
}

#[async_trait]
impl OrderSourceInterface for HttpSource {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(HttpSourceSchema)
	}

	async fn fetch_orders(&self) -> Result<Vec<Value>, SourceError> {
		let mut request = self.client.get(&self.url);
		if let Some(token) = &self.token {
			request = request.bearer_auth(token.expose_secret());
		}

		let response = request
			.send()
			.await
			.map_err(|e| SourceError::Unavailable(format!("Request to {} failed: {}", self.url, e)))?;

		let status = response.status();
		if !status.is_success() {
			return Err(SourceError::Unavailable(format!(
				"{} answered with status {}",
				self.url, status
			)));
		}

		let document: Value = response
			.json()
			.await
			.map_err(|e| SourceError::InvalidDocument(e.to_string()))?;
		records_from_document(document)
	}
}

pub struct HttpSourceSchema;

impl ConfigSchema for HttpSourceSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![Field::new("url", FieldType::String).with_validator(|value| {
				non_blank(value)?;
				match value.as_str() {
					Some(url) if url.starts_with("http://") || url.starts_with("https://") => Ok(()),
					_ => Err("url must start with http:// or https://".to_string()),
				}
			})],
			vec![
				Field::new("token", FieldType::String),
				Field::new(
					"timeout_seconds",
					FieldType::Integer {
						min: Some(1),
						max: Some(3600),
					},
				),
			],
		)
		.strict()
		.validate(config)
	}
}

/// Builds an HTTP source.
///
/// Configuration parameters:
/// - `url`: endpoint returning the order document
/// - `token`: bearer token, usually given as `${AMAZON_TRACKER_TOKEN}`
/// - `timeout_seconds`: per-request timeout (default: 30)
pub fn create_source(config: &toml::Value) -> Result<Box<dyn OrderSourceInterface>, SourceError> {
	HttpSourceSchema
		.validate(config)
		.map_err(|e| SourceError::Configuration(e.to_string()))?;

	let url = config
		.get("url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| SourceError::Configuration("url is required".into()))?;
	let token = config
		.get("token")
		.and_then(|v| v.as_str())
		.map(SecretString::from);
	let timeout = config
		.get("timeout_seconds")
		.and_then(|v| v.as_integer())
		.map(|secs| secs as u64)
		.unwrap_or(DEFAULT_TIMEOUT_SECONDS);

	Ok(Box::new(HttpSource::new(
		url,
		token,
		Duration::from_secs(timeout),
	)?))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "http";
	type Factory = crate::SourceFactory;

	fn factory() -> Self::Factory {
		create_source
	}
}

impl crate::SourceRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use tokio::io::{AsyncReadExt, AsyncWriteExt};
	use tokio::net::TcpListener;

	/// Serves one canned response and returns the raw request it received.
	async fn serve_once(status: &'static str, body: &'static str) -> (String, tokio::task::JoinHandle<String>) {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let url = format!("http://{}/orders", listener.local_addr().unwrap());

		let handle = tokio::spawn(async move {
			let (mut socket, _) = listener.accept().await.unwrap();
			let mut buffer = vec![0u8; 4096];
			let read = socket.read(&mut buffer).await.unwrap();
			let response = format!(
				"HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
				status,
				body.len(),
				body
			);
			socket.write_all(response.as_bytes()).await.unwrap();
			String::from_utf8_lossy(&buffer[..read]).to_string()
		});

		(url, handle)
	}

	#[tokio::test]
	async fn test_fetch_with_token() {
		let (url, server) = serve_once("200 OK", r#"[{"id": "A", "status": "shipped"}]"#).await;
		let source = HttpSource::new(
			url,
			Some(SecretString::from("s3cret")),
			Duration::from_secs(5),
		)
		.unwrap();

		let records = source.fetch_orders().await.unwrap();
		assert_eq!(records.len(), 1);

		let request = server.await.unwrap().to_lowercase();
		assert!(request.starts_with("get /orders"));
		assert!(request.contains("authorization: bearer s3cret"));
	}

	#[tokio::test]
	async fn test_error_status_is_unavailable() {
		let (url, _server) = serve_once("401 Unauthorized", "{}").await;
		let source = HttpSource::new(url, None, Duration::from_secs(5)).unwrap();
		assert!(matches!(
			source.fetch_orders().await,
			Err(SourceError::Unavailable(_))
		));
	}

	#[tokio::test]
	async fn test_connection_refused_is_unavailable() {
		let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
		let url = format!("http://{}/orders", listener.local_addr().unwrap());
		drop(listener);

		let source = HttpSource::new(url, None, Duration::from_secs(5)).unwrap();
		assert!(matches!(
			source.fetch_orders().await,
			Err(SourceError::Unavailable(_))
		));
	}

	#[test]
	fn test_schema() {
		let ok: toml::Value =
			toml::from_str("url = \"https://orders.local/api\"\ntimeout_seconds = 10").unwrap();
		assert!(HttpSourceSchema.validate(&ok).is_ok());

		let bad_scheme: toml::Value = toml::from_str("url = \"ftp://orders.local\"").unwrap();
		assert!(HttpSourceSchema.validate(&bad_scheme).is_err());

		let bad_timeout: toml::Value =
			toml::from_str("url = \"http://x\"\ntimeout_seconds = 0").unwrap();
		assert!(HttpSourceSchema.validate(&bad_timeout).is_err());
	}
}
