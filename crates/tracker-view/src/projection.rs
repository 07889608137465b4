//! Change-driven re-rendering.

use crate::{Projector, ViewDescription, ViewId};
use std::sync::Arc;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracker_store::StateStore;

/// Renders `view` now and again after every store change.
///
/// Each render reads a fresh snapshot; bursts of changes that arrive while
/// a render is running collapse into one. The task ends once every receiver
/// is gone or the store's change feed closes.
pub async fn spawn_projection(
	projector: Arc<Projector>,
	store: Arc<StateStore>,
	view: ViewId,
) -> (watch::Receiver<ViewDescription>, JoinHandle<()>) {
	let mut changes = store.subscribe();
	let initial = render_current(&projector, &store, view).await;
	let (sender, receiver) = watch::channel(initial);

	let handle = tokio::spawn(async move {
		loop {
			tokio::select! {
				_ = sender.closed() => break,
				change = changes.recv() => match change {
					Ok(_) | Err(RecvError::Lagged(_)) => {},
					Err(RecvError::Closed) => break,
				},
			}
			while let Ok(_) | Err(TryRecvError::Lagged(_)) = changes.try_recv() {}

			let description = render_current(&projector, &store, view).await;
			if sender.send(description).is_err() {
				break;
			}
		}
		tracing::debug!(component = "view", view = %view, "Projection stopped");
	});

	(receiver, handle)
}

async fn render_current(projector: &Projector, store: &StateStore, view: ViewId) -> ViewDescription {
	match store.read_all().await {
		Ok(snapshot) => projector.render(view, &snapshot),
		Err(e) => {
			tracing::warn!(component = "view", view = %view, error = %e, "Cannot read store, rendering empty view");
			projector.render(view, &Default::default())
		},
	}
}
