//! Dashboard card descriptors.
//!
//! ```json
//! {"type": "custom:pending_packages"}
//! ```

use crate::{ViewError, ViewId};
use serde::Deserialize;
use std::str::FromStr;

const CUSTOM_PREFIX: &str = "custom:";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawCard {
	#[serde(rename = "type")]
	kind: String,
}

/// A validated card descriptor selecting one view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CardDescriptor {
	pub view: ViewId,
}

impl CardDescriptor {
	/// Parses a descriptor. Only the `type` key is accepted.
	pub fn parse(value: serde_json::Value) -> Result<Self, ViewError> {
		let raw: RawCard =
			serde_json::from_value(value).map_err(|e| ViewError::InvalidCard(e.to_string()))?;
		let kind = raw.kind.trim();
		let view = ViewId::from_str(kind.strip_prefix(CUSTOM_PREFIX).unwrap_or(kind))?;
		Ok(Self { view })
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_parse_card() {
		let card = CardDescriptor::parse(json!({"type": "all_packages"})).unwrap();
		assert_eq!(card.view, ViewId::AllPackages);

		let card = CardDescriptor::parse(json!({"type": "custom:pending_packages"})).unwrap();
		assert_eq!(card.view, ViewId::PendingPackages);
	}

	#[test]
	fn test_reject_invalid_cards() {
		for card in [
			json!({"type": "all_packages", "title": "Mine"}),
			json!({"type": "weather"}),
			json!({}),
			json!("all_packages"),
		] {
			assert!(
				matches!(
					CardDescriptor::parse(card.clone()),
					Err(ViewError::InvalidCard(_)) | Err(ViewError::UnknownView(_))
				),
				"accepted {}",
				card
			);
		}
	}
}
