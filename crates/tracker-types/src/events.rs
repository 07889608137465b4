//! Event types for communication between tracker components.
//!
//! The store broadcasts [`StoreEvent`]s to its subscribers whenever a key is
//! written or removed. The poller reports the outcome of every cycle as a
//! [`TrackerEvent`] on the event bus.

use serde::{Deserialize, Serialize};

/// Change notification emitted by the state store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreEvent {
	/// A key was created or overwritten.
	Upserted { key: String },
	/// A key was removed.
	Removed { key: String },
}

impl StoreEvent {
	pub fn key(&self) -> &str {
		match self {
			StoreEvent::Upserted { key } | StoreEvent::Removed { key } => key,
		}
	}
}

/// Main event type published on the tracker event bus.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackerEvent {
	/// Events from the order poller.
	Poll(PollEvent),
	/// Events about individual records.
	Record(RecordEvent),
}

/// Outcome of one polling cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PollEvent {
	/// The source was read and the results were published.
	CycleCompleted {
		published: usize,
		removed: usize,
		dropped: usize,
	},
	/// The source could not be read; the store was left untouched.
	CycleFailed { reason: String },
	/// A cycle was requested while another one was still running.
	CycleSkipped,
}

/// Events about single records within a cycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordEvent {
	/// A fetched record was malformed and dropped.
	Dropped { reason: String },
	/// A package key was removed after being absent for too long.
	Expired { key: String },
}
