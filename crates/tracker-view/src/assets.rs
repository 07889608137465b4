//! Carrier logo resolution.
//!
//! A logo reference always carries a fallback. With [`StaticAssets`] a
//! missing logo only shows up when the client fails to load `src`, so it
//! switches to `fallback_src`. [`DirectoryAssets`] can see the files and
//! resolves a missing logo to the default asset up front.

use serde::Serialize;
use std::fmt::Write;
use std::path::PathBuf;
use tracker_config::ViewConfig;
use tracker_types::UNKNOWN_CARRIER;

/// File extension of carrier logo assets.
pub const ASSET_EXTENSION: &str = "png";

/// Logo to show for one carrier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogoRef {
	pub src: String,
	/// Asset to load when `src` fails to load.
	pub fallback_src: String,
}

pub trait AssetCatalog: Send + Sync {
	/// Resolves the logo of a carrier slug. Never fails.
	fn resolve(&self, slug: &str) -> LogoRef;
}

/// Percent-encodes everything except the RFC 3986 unreserved characters.
fn encode_segment(name: &str) -> String {
	let mut encoded = String::with_capacity(name.len());
	for byte in name.bytes() {
		if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
			encoded.push(char::from(byte));
		} else {
			let _ = write!(encoded, "%{:02X}", byte);
		}
	}
	encoded
}

fn asset_url(base_url: &str, name: &str) -> String {
	format!(
		"{}/{}.{}",
		base_url.trim_end_matches('/'),
		encode_segment(name),
		ASSET_EXTENSION
	)
}

/// Builds URLs without checking whether the asset exists.
#[derive(Debug, Clone)]
pub struct StaticAssets {
	base_url: String,
	default_asset: String,
}

impl StaticAssets {
	pub fn new(base_url: impl Into<String>, default_asset: impl Into<String>) -> Self {
		Self {
			base_url: base_url.into(),
			default_asset: default_asset.into(),
		}
	}
}

impl AssetCatalog for StaticAssets {
	fn resolve(&self, slug: &str) -> LogoRef {
		let name = match slug {
			"" | UNKNOWN_CARRIER => self.default_asset.as_str(),
			known => known,
		};
		LogoRef {
			src: asset_url(&self.base_url, name),
			fallback_src: asset_url(&self.base_url, &self.default_asset),
		}
	}
}

/// Serves URLs for files found in a local directory.
#[derive(Debug, Clone)]
pub struct DirectoryAssets {
	dir: PathBuf,
	urls: StaticAssets,
}

impl DirectoryAssets {
	pub fn new(
		dir: impl Into<PathBuf>,
		base_url: impl Into<String>,
		default_asset: impl Into<String>,
	) -> Self {
		Self {
			dir: dir.into(),
			urls: StaticAssets::new(base_url, default_asset),
		}
	}

	/// Slugs that could leave the asset directory never match.
	fn has_asset(&self, slug: &str) -> bool {
		!slug.is_empty()
			&& !slug.contains(['/', '\\'])
			&& !slug.contains("..")
			&& self.dir.join(format!("{}.{}", slug, ASSET_EXTENSION)).is_file()
	}
}

impl AssetCatalog for DirectoryAssets {
	fn resolve(&self, slug: &str) -> LogoRef {
		if slug != UNKNOWN_CARRIER && !self.has_asset(slug) {
			tracing::debug!(component = "view", slug = %slug, "Carrier logo missing, using default asset");
			return self.urls.resolve(UNKNOWN_CARRIER);
		}
		self.urls.resolve(slug)
	}
}

/// Picks the catalog for a view configuration: [`DirectoryAssets`] when an
/// asset directory is configured, [`StaticAssets`] otherwise.
pub fn catalog_for(config: &ViewConfig) -> Box<dyn AssetCatalog> {
	match &config.asset_dir {
		Some(dir) => Box::new(DirectoryAssets::new(
			dir.clone(),
			config.asset_base_url.clone(),
			config.default_asset.clone(),
		)),
		None => Box::new(StaticAssets::new(
			config.asset_base_url.clone(),
			config.default_asset.clone(),
		)),
	}
}
