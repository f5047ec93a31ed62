//! HTTP handlers and the JSON error envelope.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use indexer_task::TaskError;
use indexer_types::ErrorResponse;
use tracing::error;

pub mod meta;
pub mod tasks;

/// An error rendered as `{"error": {"code", "message"}}`.
#[derive(Debug)]
pub struct ApiError {
	status: StatusCode,
	code: &'static str,
	message: String,
}

impl ApiError {
	fn invalid_request(status: StatusCode, message: impl Into<String>) -> Self {
		Self {
			status,
			code: "invalid_request",
			message: message.into(),
		}
	}
}

impl From<TaskError> for ApiError {
	fn from(err: TaskError) -> Self {
		let status = match &err {
			TaskError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
			TaskError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
			TaskError::Conflict(_) => StatusCode::CONFLICT,
			TaskError::NotFound(_) => StatusCode::NOT_FOUND,
			TaskError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
		};

		let message = match &err {
			TaskError::Internal(detail) => {
				error!(error = %detail, "Request failed with internal error");
				"internal error".to_string()
			}
			other => other.to_string(),
		};

		Self {
			status,
			code: err.code(),
			message,
		}
	}
}

impl From<JsonRejection> for ApiError {
	fn from(rejection: JsonRejection) -> Self {
		let status = match rejection.status() {
			StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
			_ => StatusCode::BAD_REQUEST,
		};
		Self::invalid_request(status, format!("invalid JSON body: {}", rejection.body_text()))
	}
}

impl From<QueryRejection> for ApiError {
	fn from(rejection: QueryRejection) -> Self {
		Self::invalid_request(StatusCode::BAD_REQUEST, rejection.body_text())
	}
}

impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		(
			self.status,
			Json(ErrorResponse::new(self.code, self.message)),
		)
			.into_response()
	}
}
