//! Core of the package tracker.
//!
//! Wires the order source and the state store together through the
//! [`OrderPoller`], and drives it from the [`TrackerEngine`] timer loop.

pub mod builder;
pub mod engine;
pub mod poller;

pub use builder::{BuilderError, TrackerBuilder, TrackerFactories};
pub use engine::{event_bus::EventBus, EngineError, TrackerEngine};
pub use poller::{CycleOutcome, CycleReport, OrderPoller, PollerError, PollerSettings, PublishSummary};
