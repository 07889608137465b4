//! Package view projector.
//!
//! Turns a snapshot of the state store into a [`ViewDescription`]: a plain
//! data tree describing one dashboard card, independent of any UI toolkit.
//! Rendering is a pure function of the snapshot; [`spawn_projection`] keeps a
//! view current by re-rendering on every store change.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracker_config::Config;
use tracker_types::{
	carrier_slug, compare_delivery, is_package_key, parse_date, truncate_display, PackageStatus,
	StateRecord, StateSnapshot, ATTR_CARRIER, ATTR_ESTIMATED_DELIVERY, ATTR_ID,
	ATTR_ORDER_NUMBER, ATTR_PACKAGES, ATTR_PRODUCT_NAME, ATTR_STATUS, MAX_DISPLAY_CHARS,
	PACKAGE_KEY_PREFIX, PENDING_PACKAGES_KEY, PLACEHOLDER_GLYPH,
};

pub mod assets;
pub mod card;
pub mod i18n;
pub mod projection;

pub use assets::{AssetCatalog, DirectoryAssets, LogoRef, StaticAssets};
pub use card::CardDescriptor;
pub use i18n::Localizer;
pub use projection::spawn_projection;

#[derive(Debug, Error)]
pub enum ViewError {
	#[error("Unknown view: {0}")]
	UnknownView(String),
	#[error("Invalid card descriptor: {0}")]
	InvalidCard(String),
}

/// The views a card can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewId {
	AllPackages,
	PendingPackages,
}

impl ViewId {
	pub fn as_str(&self) -> &'static str {
		match self {
			Self::AllPackages => "all_packages",
			Self::PendingPackages => "pending_packages",
		}
	}
}

impl fmt::Display for ViewId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for ViewId {
	type Err = ViewError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"all_packages" => Ok(Self::AllPackages),
			"pending_packages" => Ok(Self::PendingPackages),
			other => Err(ViewError::UnknownView(other.to_string())),
		}
	}
}

/// Renderable content of one card.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewDescription {
	pub view: ViewId,
	pub title: String,
	pub body: ViewBody,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViewBody {
	/// Nothing to show; `message` says so.
	Empty { message: String },
	Packages { rows: Vec<PackageRow> },
	Pending { rows: Vec<PendingRow> },
}

/// One row of the all-packages view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackageRow {
	pub id: String,
	pub name: String,
	pub carrier: String,
	pub logo: LogoRef,
	pub status: String,
	pub delivery: String,
}

/// One row of the pending view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingRow {
	pub id: String,
	pub name: String,
	pub carrier: String,
	pub status: String,
	pub badge: &'static str,
	pub delivery: String,
}

/// CSS class of the status badge. Unrecognized statuses get the
/// `ordered` badge.
pub fn badge_class(status: &PackageStatus) -> &'static str {
	match status {
		PackageStatus::Shipped => "badge-shipped",
		PackageStatus::OutForDelivery => "badge-out-for-delivery",
		PackageStatus::Delivered => "badge-delivered",
		PackageStatus::Ordered | PackageStatus::Other(_) => "badge-ordered",
	}
}

fn text<'a>(fields: &'a Map<String, Value>, name: &str) -> Option<&'a str> {
	fields
		.get(name)
		.and_then(Value::as_str)
		.map(str::trim)
		.filter(|v| !v.is_empty())
}

/// Package fields shared by both views, read from a record's attributes or
/// from an aggregate entry.
struct Fields<'a> {
	id: String,
	name: &'a str,
	carrier: Option<&'a str>,
	status: PackageStatus,
	delivery: Option<chrono::NaiveDate>,
}

impl<'a> Fields<'a> {
	fn read(fields: &'a Map<String, Value>, fallback_id: &str, status: Option<&str>) -> Self {
		Self {
			id: text(fields, ATTR_ID).unwrap_or(fallback_id).to_string(),
			name: text(fields, ATTR_PRODUCT_NAME)
				.or_else(|| text(fields, ATTR_ORDER_NUMBER))
				.unwrap_or(PLACEHOLDER_GLYPH),
			carrier: text(fields, ATTR_CARRIER),
			status: status
				.and_then(PackageStatus::parse)
				.unwrap_or_else(|| PackageStatus::Other(PLACEHOLDER_GLYPH.to_string())),
			delivery: text(fields, ATTR_ESTIMATED_DELIVERY).and_then(parse_date),
		}
	}
}

pub struct Projector {
	localizer: Localizer,
	assets: Box<dyn AssetCatalog>,
}

impl Projector {
	pub fn new(localizer: Localizer, assets: Box<dyn AssetCatalog>) -> Self {
		Self { localizer, assets }
	}

	/// Builds a projector from the `[view]` section, using the marketplace
	/// language when no locale is configured.
	pub fn from_config(config: &Config) -> Self {
		Self::new(
			Localizer::new(&config.view_locale(), &config.view.default_locale),
			assets::catalog_for(&config.view),
		)
	}

	/// Renders a view from a store snapshot.
	pub fn render(&self, view: ViewId, snapshot: &StateSnapshot) -> ViewDescription {
		let (title, body) = match view {
			ViewId::AllPackages => (i18n::TITLE_ALL_PACKAGES, self.all_packages(snapshot)),
			ViewId::PendingPackages => (i18n::TITLE_PENDING_PACKAGES, self.pending(snapshot)),
		};
		ViewDescription {
			view,
			title: self.localizer.label(title),
			body,
		}
	}

	fn carrier_label(&self, carrier: Option<&str>) -> String {
		carrier
			.map(str::to_string)
			.unwrap_or_else(|| self.localizer.label(i18n::CARRIER_UNKNOWN))
	}

	fn delivery_label(&self, date: Option<chrono::NaiveDate>) -> String {
		date.map(|d| self.localizer.format_date(d))
			.unwrap_or_else(|| PLACEHOLDER_GLYPH.to_string())
	}

	fn empty(&self, key: &str) -> ViewBody {
		ViewBody::Empty {
			message: self.localizer.label(key),
		}
	}

	fn all_packages(&self, snapshot: &StateSnapshot) -> ViewBody {
		let mut packages: Vec<Fields<'_>> = snapshot
			.iter()
			.filter(|(key, _)| is_package_key(key))
			.map(|(key, record)| {
				let fallback_id = key.strip_prefix(PACKAGE_KEY_PREFIX).unwrap_or(key);
				Fields::read(&record.attributes, fallback_id, Some(record.state.as_str()))
			})
			.collect();
		if packages.is_empty() {
			return self.empty(i18n::EMPTY_ALL_PACKAGES);
		}
		packages.sort_by(|a, b| compare_delivery(a.delivery, &a.id, b.delivery, &b.id));

		let rows = packages
			.into_iter()
			.map(|package| PackageRow {
				name: truncate_display(package.name, MAX_DISPLAY_CHARS),
				carrier: self.carrier_label(package.carrier),
				logo: self
					.assets
					.resolve(&carrier_slug(package.carrier.unwrap_or_default())),
				status: self.localizer.status_label(&package.status),
				delivery: self.delivery_label(package.delivery),
				id: package.id,
			})
			.collect();
		ViewBody::Packages { rows }
	}

	fn pending(&self, snapshot: &StateSnapshot) -> ViewBody {
		let entries = snapshot
			.get(PENDING_PACKAGES_KEY)
			.map(pending_entries)
			.unwrap_or_default();
		if entries.is_empty() {
			return self.empty(i18n::EMPTY_PENDING_PACKAGES);
		}

		let rows = entries
			.into_iter()
			.map(|entry| {
				let package = Fields::read(entry, PLACEHOLDER_GLYPH, text(entry, ATTR_STATUS));
				PendingRow {
					name: truncate_display(package.name, MAX_DISPLAY_CHARS),
					carrier: self.carrier_label(package.carrier),
					badge: badge_class(&package.status),
					status: self.localizer.status_label(&package.status),
					delivery: self.delivery_label(package.delivery),
					id: package.id,
				}
			})
			.collect();
		ViewBody::Pending { rows }
	}
}

/// Entries of the aggregate record, in stored order. Non-object entries are
/// skipped.
fn pending_entries(record: &StateRecord) -> Vec<&Map<String, Value>> {
	record
		.attributes
		.get(ATTR_PACKAGES)
		.and_then(Value::as_array)
		.map(|entries| entries.iter().filter_map(Value::as_object).collect())
		.unwrap_or_default()
}
