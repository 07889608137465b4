//! Small helpers shared by the poller and the view projector.

pub mod formatting;

pub use formatting::{truncate_display, truncate_id, ELLIPSIS, MAX_DISPLAY_CHARS, PLACEHOLDER_GLYPH};
