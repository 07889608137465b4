//! Common types for the Amazon package tracker.
//!
//! This crate holds the data model shared by every tracker component: the
//! package record and its status, the state records kept in the store,
//! the events exchanged between components and the configuration schema
//! helpers used by pluggable implementations.

/// Event types for inter-component communication.
pub mod events;
/// Supported Amazon storefronts.
pub mod marketplace;
/// Package model and raw record normalization.
pub mod package;
/// Registry trait for named implementations.
pub mod registry;
/// Redacted token type.
pub mod secret_string;
/// State records and store key namespaces.
pub mod state;
/// Display formatting helpers.
pub mod utils;
/// Schema validation for implementation tables.
pub mod validation;

pub use events::*;
pub use marketplace::{marketplace, Marketplace, DEFAULT_MARKETPLACE, MARKETPLACES};
pub use package::*;
pub use registry::ImplementationRegistry;
pub use secret_string::SecretString;
pub use state::*;
pub use utils::{truncate_display, truncate_id, MAX_DISPLAY_CHARS, PLACEHOLDER_GLYPH};
pub use validation::*;
