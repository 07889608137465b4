//! Event bus carrying [`TrackerEvent`]s between components.
//!
//! Every polling cycle reports its outcome here. The bus is a broadcast
//! channel: each subscriber sees every event published after it subscribed,
//! and publishing with no subscribers is not an error worth handling.

use tokio::sync::broadcast;
use tracker_types::TrackerEvent;

#[derive(Clone)]
pub struct EventBus {
	sender: broadcast::Sender<TrackerEvent>,
}

impl EventBus {
	/// Creates a bus buffering up to `capacity` events per subscriber.
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<TrackerEvent> {
		self.sender.subscribe()
	}

	/// Publishes an event. Fails only when nobody is subscribed.
	pub fn publish(
		&self,
		event: TrackerEvent,
	) -> Result<(), broadcast::error::SendError<TrackerEvent>> {
		self.sender.send(event).map(|_| ())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use tracker_types::PollEvent;

	#[tokio::test]
	async fn test_subscribers_receive_events() {
		let bus = EventBus::new(8);
		let mut first = bus.subscribe();
		let mut second = bus.subscribe();

		bus.publish(TrackerEvent::Poll(PollEvent::CycleSkipped)).unwrap();

		assert_eq!(first.recv().await.unwrap(), TrackerEvent::Poll(PollEvent::CycleSkipped));
		assert_eq!(second.recv().await.unwrap(), TrackerEvent::Poll(PollEvent::CycleSkipped));
	}

	#[test]
	fn test_publish_without_subscribers() {
		let bus = EventBus::new(8);
		assert!(bus.publish(TrackerEvent::Poll(PollEvent::CycleSkipped)).is_err());
	}
}
