//! Label and date localization.
//!
//! Every lookup walks the same chain: the configured locale exactly, then its
//! two-letter language, then the default locale. A label missing from all of
//! them comes back as its raw key.

use chrono::{Datelike, NaiveDate};
use tracker_types::PackageStatus;

pub const TITLE_ALL_PACKAGES: &str = "title.all_packages";
pub const TITLE_PENDING_PACKAGES: &str = "title.pending_packages";
pub const EMPTY_ALL_PACKAGES: &str = "empty.all_packages";
pub const EMPTY_PENDING_PACKAGES: &str = "empty.pending_packages";
pub const CARRIER_UNKNOWN: &str = "carrier.unknown";

/// Bundled translations of one locale. Any part may be left out and is then
/// taken from the next locale in the chain.
struct LocaleTable {
	code: &'static str,
	labels: &'static [(&'static str, &'static str)],
	months: Option<[&'static str; 12]>,
	/// Date pattern with `{d}`, `{dd}`, `{mm}`, `{month}` and `{yyyy}`.
	date_pattern: Option<&'static str>,
}

static LOCALES: [LocaleTable; 4] = [
	LocaleTable {
		code: "en",
		labels: &[
			(TITLE_ALL_PACKAGES, "Amazon Packages"),
			(TITLE_PENDING_PACKAGES, "Pending Packages"),
			(EMPTY_ALL_PACKAGES, "No packages tracked"),
			(EMPTY_PENDING_PACKAGES, "No pending packages"),
			(CARRIER_UNKNOWN, "Unknown"),
			("status.ordered", "Ordered"),
			("status.shipped", "Shipped"),
			("status.out_for_delivery", "Out for delivery"),
			("status.delivered", "Delivered"),
		],
		months: Some([
			"January", "February", "March", "April", "May", "June", "July", "August", "September",
			"October", "November", "December",
		]),
		date_pattern: Some("{month} {d}, {yyyy}"),
	},
	LocaleTable {
		code: "en-gb",
		labels: &[],
		months: None,
		date_pattern: Some("{d} {month} {yyyy}"),
	},
	LocaleTable {
		code: "de",
		labels: &[
			(TITLE_ALL_PACKAGES, "Amazon Pakete"),
			(TITLE_PENDING_PACKAGES, "Ausstehende Pakete"),
			(EMPTY_ALL_PACKAGES, "Keine Pakete vorhanden"),
			(EMPTY_PENDING_PACKAGES, "Keine ausstehenden Pakete"),
			(CARRIER_UNKNOWN, "Unbekannt"),
			("status.ordered", "Bestellt"),
			("status.shipped", "Versandt"),
			("status.out_for_delivery", "In Zustellung"),
			("status.delivered", "Zugestellt"),
		],
		months: Some([
			"Januar", "Februar", "März", "April", "Mai", "Juni", "Juli", "August", "September",
			"Oktober", "November", "Dezember",
		]),
		date_pattern: Some("{d}. {month} {yyyy}"),
	},
	LocaleTable {
		code: "fr",
		labels: &[
			(TITLE_ALL_PACKAGES, "Colis Amazon"),
			(TITLE_PENDING_PACKAGES, "Colis en attente"),
			(EMPTY_ALL_PACKAGES, "Aucun colis suivi"),
			(EMPTY_PENDING_PACKAGES, "Aucun colis en attente"),
			(CARRIER_UNKNOWN, "Inconnu"),
			("status.ordered", "Commandé"),
			("status.shipped", "Expédié"),
			("status.out_for_delivery", "En cours de livraison"),
			("status.delivered", "Livré"),
		],
		months: Some([
			"janvier", "février", "mars", "avril", "mai", "juin", "juillet", "août", "septembre",
			"octobre", "novembre", "décembre",
		]),
		date_pattern: Some("{d} {month} {yyyy}"),
	},
];

fn table(code: &str) -> Option<&'static LocaleTable> {
	LOCALES.iter().find(|table| table.code == code)
}

/// Lowercases a locale tag and uses `-` as separator (`de_DE` → `de-de`).
fn normalize(locale: &str) -> String {
	locale.trim().to_lowercase().replace('_', "-")
}

#[derive(Debug, Clone)]
pub struct Localizer {
	/// Locale codes to try, most specific first, without duplicates.
	chain: Vec<String>,
}

impl Localizer {
	pub fn new(locale: &str, default_locale: &str) -> Self {
		let mut chain = Vec::new();
		let exact = normalize(locale);
		let language = exact.split('-').next().unwrap_or_default().to_string();
		for code in [exact, language, normalize(default_locale)] {
			if !code.is_empty() && !chain.contains(&code) {
				chain.push(code);
			}
		}
		Self { chain }
	}

	fn tables(&self) -> impl Iterator<Item = &'static LocaleTable> + '_ {
		self.chain.iter().filter_map(|code| table(code))
	}

	/// Looks up a label, returning `key` itself when no locale has it.
	pub fn label(&self, key: &str) -> String {
		self.tables()
			.find_map(|table| {
				table
					.labels
					.iter()
					.find(|(k, _)| *k == key)
					.map(|(_, v)| v.to_string())
			})
			.unwrap_or_else(|| key.to_string())
	}

	/// Label of a status. Unrecognized statuses are shown verbatim.
	pub fn status_label(&self, status: &PackageStatus) -> String {
		match status {
			PackageStatus::Other(raw) => raw.clone(),
			known => self.label(&format!("status.{}", known.as_str())),
		}
	}

	/// Formats a date with the locale's pattern and month names.
	///
	/// Falls back to ISO format when no locale in the chain carries a pattern.
	pub fn format_date(&self, date: NaiveDate) -> String {
		let pattern = self.tables().find_map(|table| table.date_pattern);
		let months = self.tables().find_map(|table| table.months);
		let (Some(pattern), Some(months)) = (pattern, months) else {
			return date.format("%Y-%m-%d").to_string();
		};

		pattern
			.replace("{dd}", &format!("{:02}", date.day()))
			.replace("{d}", &date.day().to_string())
			.replace("{mm}", &format!("{:02}", date.month()))
			.replace("{month}", months[date.month0() as usize])
			.replace("{yyyy}", &date.year().to_string())
	}
}
