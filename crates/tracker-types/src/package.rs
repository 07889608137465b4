//! Package data model.
//!
//! A [`Package`] is one tracked order or shipment. Sources hand over loosely
//! shaped JSON records which are turned into packages here: identifiers are
//! derived, statuses are matched against the closed set of known states,
//! carriers are slugged and dates are parsed. Anything that cannot be turned
//! into a package is reported as a [`MalformedRecord`] so the caller can drop
//! that single record and keep the rest of the batch.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

use crate::utils::formatting::PLACEHOLDER_GLYPH;

/// Slug reserved for packages without a carrier.
pub const UNKNOWN_CARRIER: &str = "unknown";

/// Errors raised while turning a raw record into a [`Package`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MalformedRecord {
	/// The record does not have the shape of an order record.
	#[error("Malformed record: {0}")]
	Shape(String),
	/// None of `id`, `order_number` or `tracking_number` is set.
	#[error("Record has no identifier")]
	MissingIdentifier,
	/// The record has no usable status.
	#[error("Record {0} has no status")]
	MissingStatus(String),
}

/// Delivery status of a package.
///
/// The four known states are ordered by progress. Raw values outside that set
/// are kept verbatim in [`PackageStatus::Other`] so they can still be shown.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PackageStatus {
	Ordered,
	Shipped,
	OutForDelivery,
	Delivered,
	/// Unrecognized raw status, trimmed but otherwise untouched.
	Other(String),
}

impl PackageStatus {
	/// Parses a raw status string.
	///
	/// Matching ignores case and treats spaces, hyphens and underscores alike,
	/// so `"Out for delivery"` and `"out-for-delivery"` both map to
	/// [`PackageStatus::OutForDelivery`]. Returns `None` for blank input.
	pub fn parse(raw: &str) -> Option<Self> {
		let trimmed = raw.trim();
		if trimmed.is_empty() {
			return None;
		}

		let normalized = trimmed
			.to_lowercase()
			.split(|c: char| c.is_whitespace() || c == '-' || c == '_')
			.filter(|part| !part.is_empty())
			.collect::<Vec<_>>()
			.join("_");

		let status = match normalized.as_str() {
			"ordered" => Self::Ordered,
			"shipped" | "in_transit" => Self::Shipped,
			"out_for_delivery" => Self::OutForDelivery,
			"delivered" => Self::Delivered,
			_ => Self::Other(trimmed.to_string()),
		};
		Some(status)
	}

	/// Display string used as the state value in the store.
	pub fn as_str(&self) -> &str {
		match self {
			Self::Ordered => "ordered",
			Self::Shipped => "shipped",
			Self::OutForDelivery => "out_for_delivery",
			Self::Delivered => "delivered",
			Self::Other(raw) => raw,
		}
	}

	/// Progress rank. Unrecognized statuses rank below every known one.
	pub fn rank(&self) -> u8 {
		match self {
			Self::Other(_) => 0,
			Self::Ordered => 1,
			Self::Shipped => 2,
			Self::OutForDelivery => 3,
			Self::Delivered => 4,
		}
	}

	pub fn is_delivered(&self) -> bool {
		matches!(self, Self::Delivered)
	}
}

impl fmt::Display for PackageStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl TryFrom<String> for PackageStatus {
	type Error = MalformedRecord;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		Self::parse(&value).ok_or_else(|| MalformedRecord::MissingStatus(String::new()))
	}
}

impl From<PackageStatus> for String {
	fn from(status: PackageStatus) -> Self {
		status.as_str().to_string()
	}
}

/// Normalizes a free-text carrier name into a slug for asset lookup.
///
/// The slug is lowercase, with runs of whitespace and path separators folded
/// into a single `-`. Blank input maps to [`UNKNOWN_CARRIER`].
pub fn carrier_slug(carrier: &str) -> String {
	let slug = carrier
		.split(|c: char| c.is_whitespace() || c == '/' || c == '\\')
		.filter(|part| !part.is_empty())
		.map(str::to_lowercase)
		.collect::<Vec<_>>()
		.join("-");

	if slug.is_empty() {
		UNKNOWN_CARRIER.to_string()
	} else {
		slug
	}
}

/// Parses a delivery or order date in any of the formats sources emit.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
	let raw = raw.trim();
	if raw.is_empty() {
		return None;
	}

	if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
		return Some(date);
	}
	if let Ok(datetime) = DateTime::parse_from_rfc3339(raw) {
		return Some(datetime.date_naive());
	}
	for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"] {
		if let Ok(datetime) = NaiveDateTime::parse_from_str(raw, format) {
			return Some(datetime.date());
		}
	}
	NaiveDate::parse_from_str(raw, "%d.%m.%Y").ok()
}

/// Orders two packages by estimated delivery.
///
/// Present dates come first in ascending order, missing dates after all of
/// them; ties are broken by id so the result never depends on input order.
pub fn compare_delivery(
	a_date: Option<NaiveDate>,
	a_id: &str,
	b_date: Option<NaiveDate>,
	b_id: &str,
) -> Ordering {
	let by_date = match (a_date, b_date) {
		(Some(a), Some(b)) => a.cmp(&b),
		(Some(_), None) => Ordering::Less,
		(None, Some(_)) => Ordering::Greater,
		(None, None) => Ordering::Equal,
	};
	by_date.then_with(|| a_id.cmp(b_id))
}

/// Sorts packages in place with [`compare_delivery`].
pub fn sort_by_delivery(packages: &mut [Package]) {
	packages.sort_by(|a, b| {
		compare_delivery(a.estimated_delivery, &a.id, b.estimated_delivery, &b.id)
	});
}

/// An order or shipment record as delivered by a source, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawOrderRecord {
	#[serde(default, alias = "identifier", alias = "shipment_id")]
	pub id: Option<String>,
	#[serde(default)]
	pub product_name: Option<String>,
	#[serde(default)]
	pub order_number: Option<String>,
	#[serde(default)]
	pub carrier: Option<String>,
	#[serde(default)]
	pub status: Option<String>,
	#[serde(default)]
	pub estimated_delivery: Option<String>,
	#[serde(default)]
	pub tracking_number: Option<String>,
	#[serde(default)]
	pub order_date: Option<String>,
}

impl RawOrderRecord {
	/// Reads a record out of an arbitrary JSON value.
	pub fn from_value(value: serde_json::Value) -> Result<Self, MalformedRecord> {
		serde_json::from_value(value).map_err(|e| MalformedRecord::Shape(e.to_string()))
	}
}

/// One tracked package.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Package {
	/// Stable identifier, also the basis of the store key.
	pub id: String,
	pub product_name: Option<String>,
	pub order_number: Option<String>,
	pub carrier: Option<String>,
	pub status: PackageStatus,
	pub estimated_delivery: Option<NaiveDate>,
	pub tracking_number: Option<String>,
	pub order_date: Option<NaiveDate>,
}

impl Package {
	/// Slug of this package's carrier.
	pub fn carrier_slug(&self) -> String {
		carrier_slug(self.carrier.as_deref().unwrap_or_default())
	}

	/// Product name, else order number, else the placeholder glyph.
	pub fn display_name(&self) -> &str {
		self.product_name
			.as_deref()
			.or(self.order_number.as_deref())
			.unwrap_or(PLACEHOLDER_GLYPH)
	}

	/// Merges a second sighting of the same package into this one.
	///
	/// Status only ever moves forward. Optional fields are filled in when they
	/// are still missing and are never overwritten. Returns `true` when
	/// anything changed.
	pub fn absorb(&mut self, other: Package) -> bool {
		let mut changed = false;

		if other.status.rank() > self.status.rank() {
			self.status = other.status;
			changed = true;
		}

		changed |= fill(&mut self.product_name, other.product_name);
		changed |= fill(&mut self.order_number, other.order_number);
		changed |= fill(&mut self.carrier, other.carrier);
		changed |= fill(&mut self.tracking_number, other.tracking_number);
		changed |= fill(&mut self.estimated_delivery, other.estimated_delivery);
		changed |= fill(&mut self.order_date, other.order_date);

		changed
	}
}

fn fill<T>(slot: &mut Option<T>, candidate: Option<T>) -> bool {
	if slot.is_none() && candidate.is_some() {
		*slot = candidate;
		true
	} else {
		false
	}
}

/// Trims a field and turns blank values into `None`.
fn non_blank(value: Option<String>) -> Option<String> {
	value
		.map(|v| v.trim().to_string())
		.filter(|v| !v.is_empty())
}

impl TryFrom<RawOrderRecord> for Package {
	type Error = MalformedRecord;

	fn try_from(raw: RawOrderRecord) -> Result<Self, Self::Error> {
		let order_number = non_blank(raw.order_number);
		let tracking_number = non_blank(raw.tracking_number);

		// Order numbers are known from the start, tracking numbers only once the
		// package ships, so the order number is preferred to keep ids stable.
		let id = non_blank(raw.id)
			.or_else(|| order_number.clone())
			.or_else(|| tracking_number.clone())
			.ok_or(MalformedRecord::MissingIdentifier)?;

		let status = raw
			.status
			.as_deref()
			.and_then(PackageStatus::parse)
			.ok_or_else(|| MalformedRecord::MissingStatus(id.clone()))?;

		Ok(Package {
			id,
			product_name: non_blank(raw.product_name),
			order_number,
			carrier: non_blank(raw.carrier),
			status,
			estimated_delivery: raw.estimated_delivery.as_deref().and_then(parse_date),
			tracking_number,
			order_date: raw.order_date.as_deref().and_then(parse_date),
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	fn package(id: &str, date: Option<&str>) -> Package {
		Package {
			id: id.to_string(),
			product_name: None,
			order_number: None,
			carrier: None,
			status: PackageStatus::Shipped,
			estimated_delivery: date.and_then(parse_date),
			tracking_number: None,
			order_date: None,
		}
	}

	#[test]
	fn test_status_parsing() {
		assert_eq!(PackageStatus::parse("shipped"), Some(PackageStatus::Shipped));
		assert_eq!(PackageStatus::parse("Delivered"), Some(PackageStatus::Delivered));
		assert_eq!(
			PackageStatus::parse("Out for delivery"),
			Some(PackageStatus::OutForDelivery)
		);
		assert_eq!(
			PackageStatus::parse("out-for-delivery"),
			Some(PackageStatus::OutForDelivery)
		);
		assert_eq!(PackageStatus::parse("In Transit"), Some(PackageStatus::Shipped));
		assert_eq!(PackageStatus::parse("   "), None);
	}

	#[test]
	fn test_unrecognized_status_kept_verbatim() {
		let status = PackageStatus::parse("  Zugestellt beim Nachbarn ").unwrap();
		assert_eq!(status, PackageStatus::Other("Zugestellt beim Nachbarn".into()));
		assert_eq!(status.as_str(), "Zugestellt beim Nachbarn");
		assert!(!status.as_str().is_empty());
		assert_eq!(PackageStatus::parse(status.as_str()), Some(status));
	}

	#[test]
	fn test_carrier_slug() {
		assert_eq!(carrier_slug("DHL"), "dhl");
		assert_eq!(carrier_slug("  Deutsche   Post DHL "), "deutsche-post-dhl");
		assert_eq!(carrier_slug("Amazon\tLogistics"), "amazon-logistics");
		assert_eq!(carrier_slug("DPD/Express"), "dpd-express");
		assert_eq!(carrier_slug(""), UNKNOWN_CARRIER);
		assert_eq!(carrier_slug(" \t "), UNKNOWN_CARRIER);
	}

	#[test]
	fn test_carrier_slug_idempotent() {
		for input in ["DHL", "  UPS  Ground", "La Poste / Colissimo", "", "Hermes\nGermany"] {
			let once = carrier_slug(input);
			assert_eq!(carrier_slug(&once), once, "slug not idempotent for {:?}", input);
			assert!(!once.chars().any(char::is_whitespace));
		}
	}

	#[test]
	fn test_parse_date_formats() {
		let expected = NaiveDate::from_ymd_opt(2024, 3, 10);
		assert_eq!(parse_date("2024-03-10"), expected);
		assert_eq!(parse_date("2024-03-10T08:15:00+01:00"), expected);
		assert_eq!(parse_date("2024-03-10T08:15:00.123456"), expected);
		assert_eq!(parse_date("10.03.2024"), expected);
		assert_eq!(parse_date("next tuesday"), None);
		assert_eq!(parse_date(""), None);
	}

	#[test]
	fn test_missing_dates_sort_last() {
		let mut packages = vec![
			package("c", None),
			package("b", Some("2024-05-01")),
			package("a", None),
			package("d", Some("2024-03-01")),
		];
		sort_by_delivery(&mut packages);
		let ids: Vec<_> = packages.iter().map(|p| p.id.as_str()).collect();
		assert_eq!(ids, vec!["d", "b", "a", "c"]);
	}

	#[test]
	fn test_sort_is_deterministic() {
		let mut forward = vec![
			package("b", Some("2024-03-10")),
			package("a", Some("2024-03-10")),
			package("c", None),
		];
		let mut backward: Vec<_> = forward.iter().rev().cloned().collect();
		sort_by_delivery(&mut forward);
		sort_by_delivery(&mut backward);
		assert_eq!(forward, backward);
		assert_eq!(forward[0].id, "a");
	}

	#[test]
	fn test_record_to_package() {
		let raw = RawOrderRecord::from_value(json!({
			"order_number": " 302-1234567-1234567 ",
			"product_name": "Widget",
			"carrier": "DHL",
			"status": "shipped",
			"estimated_delivery": "2024-03-10",
			"tracking_number": ""
		}))
		.unwrap();
		let package = Package::try_from(raw).unwrap();
		assert_eq!(package.id, "302-1234567-1234567");
		assert_eq!(package.status, PackageStatus::Shipped);
		assert_eq!(package.tracking_number, None);
		assert_eq!(package.carrier_slug(), "dhl");
		assert_eq!(package.estimated_delivery, NaiveDate::from_ymd_opt(2024, 3, 10));
	}

	#[test]
	fn test_identifier_preference() {
		let raw = RawOrderRecord {
			order_number: Some("ORDER1".into()),
			tracking_number: Some("TRACK1".into()),
			status: Some("ordered".into()),
			..Default::default()
		};
		assert_eq!(Package::try_from(raw).unwrap().id, "ORDER1");

		let raw = RawOrderRecord {
			tracking_number: Some("TRACK1".into()),
			status: Some("ordered".into()),
			..Default::default()
		};
		assert_eq!(Package::try_from(raw).unwrap().id, "TRACK1");
	}

	#[test]
	fn test_malformed_records() {
		let raw = RawOrderRecord {
			product_name: Some("Nameless".into()),
			status: Some("shipped".into()),
			..Default::default()
		};
		assert_eq!(Package::try_from(raw), Err(MalformedRecord::MissingIdentifier));

		let raw = RawOrderRecord {
			id: Some("A".into()),
			status: Some(" ".into()),
			..Default::default()
		};
		assert_eq!(
			Package::try_from(raw),
			Err(MalformedRecord::MissingStatus("A".into()))
		);

		assert!(matches!(
			RawOrderRecord::from_value(json!({"id": 42})),
			Err(MalformedRecord::Shape(_))
		));
		assert!(RawOrderRecord::from_value(json!("not an object")).is_err());
	}

	#[test]
	fn test_display_name_fallbacks() {
		let mut p = package("A", None);
		assert_eq!(p.display_name(), PLACEHOLDER_GLYPH);
		p.order_number = Some("ORDER1".into());
		assert_eq!(p.display_name(), "ORDER1");
		p.product_name = Some("Widget".into());
		assert_eq!(p.display_name(), "Widget");
	}

	#[test]
	fn test_absorb_moves_status_forward_only() {
		let mut stored = package("A", None);
		stored.status = PackageStatus::Delivered;
		let mut later = package("A", None);
		later.status = PackageStatus::Shipped;
		assert!(!stored.absorb(later));
		assert_eq!(stored.status, PackageStatus::Delivered);

		let mut stored = package("A", None);
		stored.status = PackageStatus::Ordered;
		let mut later = package("A", None);
		later.status = PackageStatus::OutForDelivery;
		assert!(stored.absorb(later));
		assert_eq!(stored.status, PackageStatus::OutForDelivery);
	}

	#[test]
	fn test_absorb_fills_but_never_overwrites() {
		let mut stored = package("A", None);
		stored.carrier = Some("DHL".into());
		let mut later = package("A", Some("2024-03-10"));
		later.carrier = Some("UPS".into());
		later.tracking_number = Some("123456789012".into());

		assert!(stored.absorb(later));
		assert_eq!(stored.carrier.as_deref(), Some("DHL"));
		assert_eq!(stored.tracking_number.as_deref(), Some("123456789012"));
		assert!(stored.estimated_delivery.is_some());
	}

	#[test]
	fn test_status_serde() {
		let json = serde_json::to_string(&PackageStatus::OutForDelivery).unwrap();
		assert_eq!(json, "\"out_for_delivery\"");
		let parsed: PackageStatus = serde_json::from_str("\"Held at depot\"").unwrap();
		assert_eq!(parsed, PackageStatus::Other("Held at depot".into()));
		assert!(serde_json::from_str::<PackageStatus>("\"\"").is_err());
	}
}
