//! Supported Amazon marketplaces.
//!
//! The configured marketplace decides which language the dashboard views use
//! when no explicit locale is configured.

/// One Amazon storefront.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Marketplace {
	/// Domain used as the configuration value, e.g. `amazon.de`.
	pub domain: &'static str,
	pub name: &'static str,
	pub base_url: &'static str,
	/// Two-letter language code of the storefront.
	pub language: &'static str,
	/// Address shipment notifications are sent from.
	pub sender: &'static str,
}

pub const DEFAULT_MARKETPLACE: &str = "amazon.de";

pub const MARKETPLACES: [Marketplace; 5] = [
	Marketplace {
		domain: "amazon.com",
		name: "Amazon.com (United States)",
		base_url: "https://www.amazon.com",
		language: "en",
		sender: "order-update@amazon.com",
	},
	Marketplace {
		domain: "amazon.de",
		name: "Amazon.de (Germany)",
		base_url: "https://www.amazon.de",
		language: "de",
		sender: "order-update@amazon.de",
	},
	Marketplace {
		domain: "amazon.fr",
		name: "Amazon.fr (France)",
		base_url: "https://www.amazon.fr",
		language: "fr",
		sender: "order-update@amazon.fr",
	},
	Marketplace {
		domain: "amazon.co.uk",
		name: "Amazon.co.uk (United Kingdom)",
		base_url: "https://www.amazon.co.uk",
		language: "en",
		sender: "order-update@amazon.co.uk",
	},
	Marketplace {
		domain: "amazon.ie",
		name: "Amazon.ie (Ireland)",
		base_url: "https://www.amazon.ie",
		language: "en",
		sender: "order-update@amazon.ie",
	},
];

/// Looks up a marketplace by domain, ignoring case.
pub fn marketplace(domain: &str) -> Option<&'static Marketplace> {
	let domain = domain.trim();
	MARKETPLACES
		.iter()
		.find(|m| m.domain.eq_ignore_ascii_case(domain))
}
