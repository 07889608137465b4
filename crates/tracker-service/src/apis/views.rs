//! Dashboard views served from the running projections.

use super::ApiError;
use std::collections::HashMap;
use tokio::sync::watch;
use tracker_view::{CardDescriptor, ViewDescription, ViewError, ViewId};

/// Latest rendering of every view, kept current by the projection tasks.
pub type ViewChannels = HashMap<ViewId, watch::Receiver<ViewDescription>>;

impl From<ViewError> for ApiError {
	fn from(e: ViewError) -> Self {
		match e {
			ViewError::UnknownView(_) => ApiError::NotFound {
				error_type: "UNKNOWN_VIEW".into(),
				message: e.to_string(),
			},
			ViewError::InvalidCard(_) => ApiError::BadRequest {
				error_type: "INVALID_CARD".into(),
				message: e.to_string(),
			},
		}
	}
}

fn current(views: &ViewChannels, view: ViewId) -> Result<ViewDescription, ApiError> {
	views
		.get(&view)
		.map(|receiver| receiver.borrow().clone())
		.ok_or_else(|| ApiError::InternalServerError {
			error_type: "VIEW_NOT_RUNNING".into(),
			message: format!("No projection running for '{}'", view),
		})
}

pub fn get_view(views: &ViewChannels, view_id: &str) -> Result<ViewDescription, ApiError> {
	current(views, view_id.parse()?)
}

pub fn render_card(
	views: &ViewChannels,
	card: serde_json::Value,
) -> Result<ViewDescription, ApiError> {
	let card = CardDescriptor::parse(card)?;
	current(views, card.view)
}
