//! The order poller.
//!
//! One polling cycle fetches the order list, publishes one record per
//! package, ages out packages that disappeared from the source and rewrites
//! the pending aggregate. Cycles never overlap: a cycle requested while
//! another one is in flight is skipped, not queued.
//!
//! Packages whose record has not changed for longer than the tracking
//! duration are no longer published, and delivered packages are hidden once
//! the shorter delivered duration has passed. Hidden packages age out of the
//! store like packages that vanished from the source.
//!
//! The poller is the only writer of the package and pending key namespaces.

use crate::engine::event_bus::EventBus;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use chrono::Utc;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::instrument;
use tracker_config::TrackerConfig;
use tracker_source::{FetchOutcome, SourceService};
use tracker_store::StateStore;
use tracker_types::{
	package_key, sort_by_delivery, truncate_id, Package, PollEvent, RecordEvent, StateRecord,
	TrackerEvent, PACKAGE_KEY_PREFIX, PENDING_PACKAGES_KEY,
};

/// Errors that can occur during a polling cycle.
#[derive(Debug, Error)]
pub enum PollerError {
	/// The source could not be read in time. Nothing was published.
	#[error("Source unavailable: {0}")]
	SourceUnavailable(String),
	#[error("Store error: {0}")]
	Store(String),
}

/// Poller settings taken from the `[tracker]` section.
#[derive(Debug, Clone)]
pub struct PollerSettings {
	pub fetch_timeout: Duration,
	pub removal_grace_cycles: u32,
	pub show_delivered: bool,
	pub tracking_duration: Duration,
	pub delivered_duration: Duration,
}

impl From<&TrackerConfig> for PollerSettings {
	fn from(config: &TrackerConfig) -> Self {
		Self {
			fetch_timeout: config.fetch_timeout(),
			removal_grace_cycles: config.removal_grace_cycles.max(1),
			show_delivered: config.show_delivered,
			tracking_duration: config.tracking_duration(),
			delivered_duration: config.delivered_duration(),
		}
	}
}

/// What [`OrderPoller::publish`] changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PublishSummary {
	/// Package records written.
	pub published: usize,
	/// Package records removed after their grace period.
	pub removed: usize,
	/// Packages in the pending aggregate.
	pub pending: usize,
}

/// Counts of a completed cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
	pub published: usize,
	pub removed: usize,
	pub pending: usize,
	/// Malformed records dropped from the fetched batch.
	pub dropped: usize,
}

/// Result of one cycle request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CycleOutcome {
	Completed(CycleReport),
	Failed { reason: String },
	Skipped,
}

/// Last published content of a package and how long it has been unchanged.
struct Tracked {
	record: StateRecord,
	since: Instant,
	/// Age carried over from the store when tracking started.
	carried: Duration,
}

impl Tracked {
	fn age(&self, now: Instant) -> Duration {
		self.carried + now.saturating_duration_since(self.since)
	}
}

/// State kept across cycles.
#[derive(Default)]
struct CycleState {
	/// Consecutive successful cycles each package key has been missing.
	misses: HashMap<String, u32>,
	/// Per fetched package key.
	tracked: HashMap<String, Tracked>,
}

fn same_content(a: &StateRecord, b: &StateRecord) -> bool {
	a.state == b.state && a.attributes == b.attributes
}

pub struct OrderPoller {
	source: Arc<SourceService>,
	store: Arc<StateStore>,
	event_bus: EventBus,
	settings: PollerSettings,
	/// The lock doubles as the single-cycle guard.
	state: Mutex<CycleState>,
}

impl OrderPoller {
	pub fn new(
		source: Arc<SourceService>,
		store: Arc<StateStore>,
		event_bus: EventBus,
		settings: PollerSettings,
	) -> Self {
		Self {
			source,
			store,
			event_bus,
			settings,
			state: Mutex::new(CycleState::default()),
		}
	}

	/// Fetches and normalizes the current order list.
	///
	/// Fails with [`PollerError::SourceUnavailable`] when the source fails or
	/// does not answer within the fetch timeout.
	pub async fn poll(&self) -> Result<FetchOutcome, PollerError> {
		match tokio::time::timeout(self.settings.fetch_timeout, self.source.fetch()).await {
			Ok(Ok(outcome)) => Ok(outcome),
			Ok(Err(e)) => Err(PollerError::SourceUnavailable(e.to_string())),
			Err(_) => Err(PollerError::SourceUnavailable(format!(
				"fetch from '{}' timed out after {}s",
				self.source.name(),
				self.settings.fetch_timeout.as_secs()
			))),
		}
	}

	/// Publishes a result set, waiting for any running cycle to finish first.
	pub async fn publish(&self, packages: &[Package]) -> Result<PublishSummary, PollerError> {
		let mut state = self.state.lock().await;
		self.publish_with(&mut state, packages).await
	}

	/// Runs one cycle unless another one is in flight.
	#[instrument(skip_all, fields(source = %self.source.name()))]
	pub async fn run_cycle(&self) -> CycleOutcome {
		let Ok(mut state) = self.state.try_lock() else {
			tracing::debug!(component = "poller", "Cycle already running, skipping");
			self.emit(PollEvent::CycleSkipped);
			return CycleOutcome::Skipped;
		};

		let fetched = match self.poll().await {
			Ok(fetched) => fetched,
			Err(e) => return self.fail(e),
		};
		let dropped = fetched.dropped.len();
		for reason in &fetched.dropped {
			self.event_bus
				.publish(TrackerEvent::Record(RecordEvent::Dropped {
					reason: reason.to_string(),
				}))
				.ok();
		}

		match self.publish_with(&mut state, &fetched.packages).await {
			Ok(summary) => {
				tracing::info!(
					component = "poller",
					published = summary.published,
					removed = summary.removed,
					pending = summary.pending,
					dropped,
					"Cycle completed"
				);
				self.emit(PollEvent::CycleCompleted {
					published: summary.published,
					removed: summary.removed,
					dropped,
				});
				CycleOutcome::Completed(CycleReport {
					published: summary.published,
					removed: summary.removed,
					pending: summary.pending,
					dropped,
				})
			},
			Err(e) => self.fail(e),
		}
	}

	fn fail(&self, error: PollerError) -> CycleOutcome {
		let reason = error.to_string();
		match error {
			PollerError::SourceUnavailable(_) => {
				tracing::warn!(component = "poller", error = %reason, "Cycle failed, keeping previous records")
			},
			PollerError::Store(_) => {
				tracing::error!(component = "poller", error = %reason, "Cycle failed while writing")
			},
		}
		self.emit(PollEvent::CycleFailed {
			reason: reason.clone(),
		});
		CycleOutcome::Failed { reason }
	}

	fn emit(&self, event: PollEvent) {
		self.event_bus.publish(TrackerEvent::Poll(event)).ok();
	}

	/// How long the content of `record` has been unchanged.
	///
	/// A package seen for the first time since startup inherits the age of an
	/// identical record already in the store.
	async fn unchanged_for(
		&self,
		tracked: &mut HashMap<String, Tracked>,
		key: &str,
		record: &StateRecord,
		now: Instant,
	) -> Result<Duration, PollerError> {
		if let Some(entry) = tracked.get(key) {
			if same_content(&entry.record, record) {
				return Ok(entry.age(now));
			}
		}

		let carried = if tracked.contains_key(key) {
			Duration::ZERO
		} else {
			match self.store.get(key).await {
				Ok(Some(existing)) if same_content(&existing, record) => {
					(Utc::now() - existing.last_updated).to_std().unwrap_or_default()
				},
				Ok(_) => Duration::ZERO,
				Err(e) => return Err(PollerError::Store(e.to_string())),
			}
		};
		tracked.insert(
			key.to_string(),
			Tracked {
				record: record.clone(),
				since: now,
				carried,
			},
		);
		Ok(carried)
	}

	async fn publish_with(
		&self,
		state: &mut CycleState,
		packages: &[Package],
	) -> Result<PublishSummary, PollerError> {
		let store_err = |e: tracker_store::StoreError| PollerError::Store(e.to_string());
		let mut summary = PublishSummary::default();
		let now = Instant::now();

		let mut fetched = HashSet::new();
		let mut present = HashSet::new();
		let mut pending = Vec::new();
		for package in packages {
			let key = package_key(&package.id);
			let record = StateRecord::from(package);
			let age = self
				.unchanged_for(&mut state.tracked, &key, &record, now)
				.await?;
			fetched.insert(key.clone());

			if age > self.settings.tracking_duration {
				tracing::debug!(
					component = "poller",
					id = %truncate_id(&package.id),
					age_days = age.as_secs() / 86_400,
					"Package no longer tracked"
				);
				continue;
			}
			if package.status.is_delivered() {
				if !self.settings.show_delivered || age > self.settings.delivered_duration {
					continue;
				}
			} else {
				pending.push(package.clone());
			}

			if self.store.put(&key, record).await.map_err(store_err)? {
				tracing::debug!(
					component = "poller",
					id = %truncate_id(&package.id),
					status = %package.status,
					"Package record updated"
				);
			}
			state.misses.remove(&key);
			present.insert(key);
			summary.published += 1;
		}
		state.tracked.retain(|key, _| fetched.contains(key));

		let existing = self
			.store
			.keys_with_prefix(PACKAGE_KEY_PREFIX)
			.await
			.map_err(store_err)?;
		state.misses.retain(|key, _| existing.contains(key));

		for key in existing.into_iter().filter(|key| !present.contains(key)) {
			let missed = state.misses.entry(key.clone()).or_insert(0);
			*missed += 1;
			if *missed < self.settings.removal_grace_cycles {
				tracing::debug!(component = "poller", key = %key, missed = *missed, "Package missing from source");
				continue;
			}

			state.misses.remove(&key);
			if self.store.remove(&key).await.map_err(store_err)? {
				tracing::info!(component = "poller", key = %key, "Removed package record");
				summary.removed += 1;
				self.event_bus
					.publish(TrackerEvent::Record(RecordEvent::Expired { key }))
					.ok();
			}
		}

		sort_by_delivery(&mut pending);
		summary.pending = pending.len();
		self.store
			.put(PENDING_PACKAGES_KEY, StateRecord::pending_aggregate(&pending))
			.await
			.map_err(store_err)?;

		Ok(summary)
	}
}
