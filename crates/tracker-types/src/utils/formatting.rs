//! String formatting utilities for display and log output.
//!
//! All truncation here counts characters, not bytes, so product names with
//! umlauts or emoji are never cut in the middle of a code point.

/// Glyph shown in place of a missing value.
pub const PLACEHOLDER_GLYPH: &str = "—";

/// Appended to text that was cut short.
pub const ELLIPSIS: &str = "...";

/// Maximum number of visible characters of a product name in a view.
pub const MAX_DISPLAY_CHARS: usize = 25;

/// Truncates `text` to `max_chars` characters, appending [`ELLIPSIS`] when
/// anything was cut.
pub fn truncate_display(text: &str, max_chars: usize) -> String {
	match text.char_indices().nth(max_chars) {
		Some((byte_index, _)) => format!("{}{}", &text[..byte_index], ELLIPSIS),
		None => text.to_string(),
	}
}

/// Shortens an identifier for log output.
///
/// Shows only the first 8 characters followed by ".." for longer ids.
pub fn truncate_id(id: &str) -> String {
	match id.char_indices().nth(8) {
		Some((byte_index, _)) => format!("{}..", &id[..byte_index]),
		None => id.to_string(),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_truncate_id() {
		assert_eq!(truncate_id("12345678"), "12345678");
		assert_eq!(truncate_id("123456789"), "12345678..");
		assert_eq!(truncate_id("302-1234567-1234567"), "302-1234..");
	}

	#[test]
	fn test_truncate_display() {
		assert_eq!(truncate_display("Widget", MAX_DISPLAY_CHARS), "Widget");

		let exact = "a".repeat(MAX_DISPLAY_CHARS);
		assert_eq!(truncate_display(&exact, MAX_DISPLAY_CHARS), exact);

		let long = "USB-C Ladekabel 2m geflochten, schwarz";
		assert_eq!(
			truncate_display(long, MAX_DISPLAY_CHARS),
			"USB-C Ladekabel 2m gefloc..."
		);
	}

	#[test]
	fn test_truncate_display_multibyte() {
		let name = "Küchenwaage für Bäckerei und Küche";
		let truncated = truncate_display(name, 10);
		assert_eq!(truncated, "Küchenwaag...");
		assert_eq!(truncated.chars().count(), 10 + ELLIPSIS.len());
	}
}
