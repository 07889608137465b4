//! Request handling behind the HTTP routes.

pub mod states;
pub mod views;

use axum::{
	http::StatusCode,
	response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Errors returned by the API, rendered as a JSON [`ErrorResponse`].
#[derive(Debug, Error)]
pub enum ApiError {
	#[error("Bad Request: {message}")]
	BadRequest { error_type: String, message: String },
	#[error("Not Found: {message}")]
	NotFound { error_type: String, message: String },
	#[error("Internal Server Error: {message}")]
	InternalServerError { error_type: String, message: String },
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
	pub error: String,
	pub message: String,
}

impl ApiError {
	pub fn status_code(&self) -> StatusCode {
		match self {
			Self::BadRequest { .. } => StatusCode::BAD_REQUEST,
			Self::NotFound { .. } => StatusCode::NOT_FOUND,
			Self::InternalServerError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	pub fn to_error_response(&self) -> ErrorResponse {
		let (error_type, message) = match self {
			Self::BadRequest { error_type, message }
			| Self::NotFound { error_type, message }
			| Self::InternalServerError { error_type, message } => (error_type, message),
		};
		ErrorResponse {
			error: error_type.clone(),
			message: message.clone(),
		}
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		(self.status_code(), Json(self.to_error_response())).into_response()
	}
}
