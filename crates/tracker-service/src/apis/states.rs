//! Raw access to the state store.

use super::ApiError;
use tracker_store::{StateStore, StoreError};
use tracker_types::{StateRecord, StateSnapshot};

fn store_error(e: StoreError) -> ApiError {
	ApiError::InternalServerError {
		error_type: "STORE_ERROR".into(),
		message: e.to_string(),
	}
}

pub async fn list_states(store: &StateStore) -> Result<StateSnapshot, ApiError> {
	store.read_all().await.map_err(store_error)
}

pub async fn get_state(store: &StateStore, key: &str) -> Result<StateRecord, ApiError> {
	store
		.get(key)
		.await
		.map_err(store_error)?
		.ok_or_else(|| ApiError::NotFound {
			error_type: "STATE_NOT_FOUND".into(),
			message: format!("No state for key '{}'", key),
		})
}
