//! State records and key namespaces of the shared state store.
//!
//! Every entry in the store is a [`StateRecord`]: a primary state string plus
//! a free-form attribute map, the same shape a home-automation entity has.
//! Package records live under [`PACKAGE_KEY_PREFIX`]; the pending aggregate
//! lives under the separate [`PENDING_KEY_PREFIX`].

use crate::package::Package;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha3::{Digest, Keccak256};
use std::collections::BTreeMap;

/// Prefix of every per-package key.
pub const PACKAGE_KEY_PREFIX: &str = "sensor.amazon_package_";
/// Prefix of the aggregate keys.
pub const PENDING_KEY_PREFIX: &str = "sensor.amazon_pending_";
/// Key of the pending-packages aggregate record.
pub const PENDING_PACKAGES_KEY: &str = "sensor.amazon_pending_packages";

pub const ATTR_ID: &str = "id";
pub const ATTR_PRODUCT_NAME: &str = "product_name";
pub const ATTR_ORDER_NUMBER: &str = "order_number";
pub const ATTR_CARRIER: &str = "carrier";
pub const ATTR_CARRIER_SLUG: &str = "carrier_slug";
pub const ATTR_STATUS: &str = "status";
pub const ATTR_ESTIMATED_DELIVERY: &str = "estimated_delivery";
pub const ATTR_TRACKING_NUMBER: &str = "tracking_number";
pub const ATTR_ORDER_DATE: &str = "order_date";
/// Attribute of the pending aggregate holding the ordered package list.
pub const ATTR_PACKAGES: &str = "packages";

/// Full contents of the store, ordered by key.
pub type StateSnapshot = BTreeMap<String, StateRecord>;

/// Number of hash bytes appended to a key whose id needed sanitizing.
const KEY_HASH_BYTES: usize = 4;

/// Builds the store key of a package.
///
/// The id is lowercased and every character outside `[a-z0-9]` becomes `_`,
/// so the key is safe to use as an entity id. When that changed the trimmed
/// id, a short Keccak-256 digest of it is appended so distinct ids never
/// share a key.
pub fn package_key(id: &str) -> String {
	let id = id.trim();
	let safe: String = id
		.chars()
		.map(|c| {
			if c.is_ascii_alphanumeric() {
				c.to_ascii_lowercase()
			} else {
				'_'
			}
		})
		.collect();
	if safe == id {
		return format!("{}{}", PACKAGE_KEY_PREFIX, safe);
	}
	let digest = Keccak256::digest(id.as_bytes());
	format!(
		"{}{}_{}",
		PACKAGE_KEY_PREFIX,
		safe,
		hex::encode(&digest[..KEY_HASH_BYTES])
	)
}

pub fn is_package_key(key: &str) -> bool {
	key.starts_with(PACKAGE_KEY_PREFIX)
}

/// One entry of the state store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
	/// Primary value, e.g. the package status.
	pub state: String,
	#[serde(default)]
	pub attributes: Map<String, Value>,
	pub last_updated: DateTime<Utc>,
}

impl StateRecord {
	pub fn new(state: impl Into<String>, attributes: Map<String, Value>) -> Self {
		Self {
			state: state.into(),
			attributes,
			last_updated: Utc::now(),
		}
	}

	/// Returns a string attribute, treating blank strings as absent.
	pub fn attribute_str(&self, name: &str) -> Option<&str> {
		self.attributes
			.get(name)
			.and_then(Value::as_str)
			.map(str::trim)
			.filter(|v| !v.is_empty())
	}

	/// Builds the aggregate record from packages that are already filtered
	/// and sorted. The state is the number of packages.
	pub fn pending_aggregate(packages: &[Package]) -> Self {
		let entries = packages.iter().map(package_entry).collect::<Vec<_>>();
		let mut attributes = Map::new();
		attributes.insert(ATTR_PACKAGES.to_string(), Value::Array(entries));
		Self::new(packages.len().to_string(), attributes)
	}
}

fn optional(value: &Option<String>) -> Value {
	value.clone().map(Value::String).unwrap_or(Value::Null)
}

fn optional_date(value: &Option<NaiveDate>) -> Value {
	value
		.map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
		.unwrap_or(Value::Null)
}

fn package_attributes(package: &Package) -> Map<String, Value> {
	let mut attributes = Map::new();
	attributes.insert(ATTR_ID.into(), Value::String(package.id.clone()));
	attributes.insert(ATTR_PRODUCT_NAME.into(), optional(&package.product_name));
	attributes.insert(ATTR_ORDER_NUMBER.into(), optional(&package.order_number));
	attributes.insert(ATTR_CARRIER.into(), optional(&package.carrier));
	attributes.insert(ATTR_CARRIER_SLUG.into(), Value::String(package.carrier_slug()));
	attributes.insert(
		ATTR_ESTIMATED_DELIVERY.into(),
		optional_date(&package.estimated_delivery),
	);
	attributes.insert(ATTR_TRACKING_NUMBER.into(), optional(&package.tracking_number));
	attributes.insert(ATTR_ORDER_DATE.into(), optional_date(&package.order_date));
	attributes
}

/// Entry of the pending aggregate: the package attributes plus the status.
fn package_entry(package: &Package) -> Value {
	let mut entry = package_attributes(package);
	entry.insert(ATTR_STATUS.into(), Value::String(package.status.to_string()));
	Value::Object(entry)
}

impl From<&Package> for StateRecord {
	fn from(package: &Package) -> Self {
		Self::new(package.status.as_str(), package_attributes(package))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::package::PackageStatus;

	fn widget() -> Package {
		Package {
			id: "302-1234567-1234567".into(),
			product_name: Some("Widget".into()),
			order_number: Some("302-1234567-1234567".into()),
			carrier: Some("Deutsche Post".into()),
			status: PackageStatus::Shipped,
			estimated_delivery: NaiveDate::from_ymd_opt(2024, 3, 10),
			tracking_number: None,
			order_date: None,
		}
	}

	#[test]
	fn test_package_key() {
		assert_eq!(package_key("abc123"), "sensor.amazon_package_abc123");
		assert_eq!(package_key(" abc "), "sensor.amazon_package_abc");

		let key = package_key("302-1234567-1234567");
		assert!(key.starts_with("sensor.amazon_package_302_1234567_1234567_"));
		assert_eq!(key.len(), "sensor.amazon_package_302_1234567_1234567_".len() + 8);
		assert_eq!(key, package_key("302-1234567-1234567"));

		assert!(is_package_key(&package_key("x")));
		assert!(!is_package_key(PENDING_PACKAGES_KEY));
		assert!(PENDING_PACKAGES_KEY.starts_with(PENDING_KEY_PREFIX));
	}

	#[test]
	fn test_package_key_keeps_ids_apart() {
		let ids = ["A.1", "A-1", "a_1", "a1", "A1", "Bestellung-Ä", "Bestellung-Ö"];
		let keys: std::collections::HashSet<_> = ids.iter().map(|id| package_key(id)).collect();
		assert_eq!(keys.len(), ids.len());
		for key in &keys {
			let suffix = &key[PACKAGE_KEY_PREFIX.len()..];
			assert!(suffix.chars().all(|c| c.is_ascii_alphanumeric() || c == '_'));
		}
	}

	#[test]
	fn test_record_from_package() {
		let record = StateRecord::from(&widget());
		assert_eq!(record.state, "shipped");
		assert_eq!(record.attribute_str(ATTR_ID), Some("302-1234567-1234567"));
		assert_eq!(record.attribute_str(ATTR_PRODUCT_NAME), Some("Widget"));
		assert_eq!(record.attribute_str(ATTR_CARRIER_SLUG), Some("deutsche-post"));
		assert_eq!(record.attribute_str(ATTR_ESTIMATED_DELIVERY), Some("2024-03-10"));
		assert_eq!(record.attributes.get(ATTR_TRACKING_NUMBER), Some(&Value::Null));
		assert_eq!(record.attribute_str(ATTR_TRACKING_NUMBER), None);
	}

	#[test]
	fn test_pending_aggregate() {
		let record = StateRecord::pending_aggregate(&[widget()]);
		assert_eq!(record.state, "1");
		let packages = record.attributes[ATTR_PACKAGES].as_array().unwrap();
		assert_eq!(packages.len(), 1);
		assert_eq!(packages[0][ATTR_ID], "302-1234567-1234567");
		assert_eq!(packages[0][ATTR_STATUS], "shipped");

		let empty = StateRecord::pending_aggregate(&[]);
		assert_eq!(empty.state, "0");
		assert!(empty.attributes[ATTR_PACKAGES].as_array().unwrap().is_empty());
	}
}
