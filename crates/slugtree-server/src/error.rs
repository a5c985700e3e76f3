//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use slugtree_core::Error as CoreError;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error(transparent)]
  Core(#[from] CoreError),
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::NotFound(_) => StatusCode::NOT_FOUND,
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Core(e) => match e {
        CoreError::NotFound(_) => StatusCode::NOT_FOUND,
        CoreError::DuplicateSlug { .. }
        | CoreError::DuplicateRoute { .. }
        | CoreError::ConcurrentCascade { .. } => StatusCode::CONFLICT,
        CoreError::InvalidSlug { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        CoreError::CascadeAborted { .. } | CoreError::CascadeTimeout { .. } => {
          StatusCode::SERVICE_UNAVAILABLE
        }
        CoreError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
      },
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::error!(error = %self, "request failed");
    }

    // Interrupted cascades report how far they got; re-sending the same
    // change finishes the job.
    let body = match &self {
      ApiError::Core(
        CoreError::CascadeAborted { flushed, .. } | CoreError::CascadeTimeout { flushed, .. },
      ) => json!({ "error": self.to_string(), "flushed": flushed, "retry": true }),
      _ => json!({ "error": self.to_string() }),
    };
    (status, Json(body)).into_response()
  }
}
