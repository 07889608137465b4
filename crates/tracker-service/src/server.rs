//! HTTP server exposing the tracker views and the state store.

use crate::apis::{self, views::ViewChannels, ApiError};
use axum::{
	extract::{Path, State},
	http::StatusCode,
	response::{IntoResponse, Json},
	routing::{get, post},
	Router,
};
use serde_json::Value;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracker_config::ApiConfig;
use tracker_core::{CycleOutcome, TrackerEngine};
use tracker_types::{StateRecord, StateSnapshot};
use tracker_view::ViewDescription;

/// Shared application state for the API server.
#[derive(Clone)]
pub struct AppState {
	pub engine: Arc<TrackerEngine>,
	pub views: Arc<ViewChannels>,
}

pub fn router(state: AppState) -> Router {
	Router::new()
		.nest(
			"/api",
			Router::new()
				.route("/views/{view_id}", get(handle_get_view))
				.route("/cards/render", post(handle_render_card))
				.route("/states", get(handle_list_states))
				.route("/states/{key}", get(handle_get_state))
				.route("/refresh", post(handle_refresh)),
		)
		.route("/health", get(handle_health))
		.layer(
			ServiceBuilder::new()
				.layer(TraceLayer::new_for_http())
				.layer(CorsLayer::permissive()),
		)
		.with_state(state)
}

/// Binds the configured address and serves until the listener fails.
pub async fn start_server(
	api_config: ApiConfig,
	engine: Arc<TrackerEngine>,
	views: ViewChannels,
) -> Result<(), Box<dyn std::error::Error>> {
	let app = router(AppState {
		engine,
		views: Arc::new(views),
	});

	let bind_address = format!("{}:{}", api_config.host, api_config.port);
	let listener = TcpListener::bind(&bind_address).await?;

	tracing::info!("Package tracker API server starting on {}", bind_address);

	axum::serve(listener, app).await?;

	Ok(())
}

/// Handles GET /api/views/{view_id}.
async fn handle_get_view(
	Path(view_id): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<ViewDescription>, ApiError> {
	apis::views::get_view(&state.views, &view_id).map(Json)
}

/// Handles POST /api/cards/render with a card descriptor body.
async fn handle_render_card(
	State(state): State<AppState>,
	Json(card): Json<Value>,
) -> Result<Json<ViewDescription>, ApiError> {
	match apis::views::render_card(&state.views, card) {
		Ok(view) => Ok(Json(view)),
		Err(e) => {
			tracing::warn!("Card render failed: {}", e);
			Err(e)
		},
	}
}

async fn handle_list_states(State(state): State<AppState>) -> Result<Json<StateSnapshot>, ApiError> {
	apis::states::list_states(state.engine.store()).await.map(Json)
}

async fn handle_get_state(
	Path(key): Path<String>,
	State(state): State<AppState>,
) -> Result<Json<StateRecord>, ApiError> {
	apis::states::get_state(state.engine.store(), &key).await.map(Json)
}

/// Handles POST /api/refresh.
///
/// Runs a cycle right away. Answers 409 when a cycle is already running and
/// 503 when the source could not be read.
async fn handle_refresh(State(state): State<AppState>) -> impl IntoResponse {
	let outcome = state.engine.refresh().await;
	let status = match outcome {
		CycleOutcome::Completed(_) => StatusCode::OK,
		CycleOutcome::Skipped => StatusCode::CONFLICT,
		CycleOutcome::Failed { .. } => StatusCode::SERVICE_UNAVAILABLE,
	};
	(status, Json(outcome))
}

async fn handle_health(State(state): State<AppState>) -> Json<Value> {
	Json(serde_json::json!({
		"status": "ok",
		"tracker": state.engine.config().tracker.id,
	}))
}
