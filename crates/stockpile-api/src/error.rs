//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  extract::rejection::{JsonRejection, PathRejection, QueryRejection},
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  /// The import is in the wrong lifecycle state for the request.
  #[error("invalid state: {0}")]
  InvalidState(String),

  /// A concurrent promotion won; the client may retry.
  #[error("conflict: {0}")]
  Conflict(String),

  /// The single-active invariant is broken and needs manual remediation.
  #[error("invariant violation: {0}")]
  InvariantViolation(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl ApiError {
  fn tag(&self) -> &'static str {
    match self {
      ApiError::NotFound(_) => "not_found",
      ApiError::BadRequest(_) => "bad_request",
      ApiError::InvalidState(_) => "invalid_state",
      ApiError::Conflict(_) => "conflict",
      ApiError::InvariantViolation(_) => "invariant_violation",
      ApiError::Store(_) => "store",
    }
  }
}

impl From<stockpile_core::Error> for ApiError {
  fn from(e: stockpile_core::Error) -> Self {
    use stockpile_core::Error as Core;
    match e {
      Core::ImportNotFound(_) => ApiError::NotFound(e.to_string()),
      Core::InvalidState { .. } => ApiError::InvalidState(e.to_string()),
      Core::Conflict { .. } => ApiError::Conflict(e.to_string()),
      Core::DomainInvariantViolation { .. } => {
        ApiError::InvariantViolation(e.to_string())
      }
      Core::UnknownDiscriminant { .. } => ApiError::BadRequest(e.to_string()),
      Core::Serialization(inner) => ApiError::Store(Box::new(inner)),
      Core::Store(inner) => ApiError::Store(inner),
    }
  }
}

impl From<JsonRejection> for ApiError {
  fn from(r: JsonRejection) -> Self { ApiError::BadRequest(r.body_text()) }
}

impl From<QueryRejection> for ApiError {
  fn from(r: QueryRejection) -> Self { ApiError::BadRequest(r.body_text()) }
}

impl From<PathRejection> for ApiError {
  fn from(r: PathRejection) -> Self { ApiError::BadRequest(r.body_text()) }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::InvalidState(m) | ApiError::Conflict(m) => {
        (StatusCode::CONFLICT, m.clone())
      }
      ApiError::InvariantViolation(m) => {
        tracing::error!("{m}");
        (StatusCode::INTERNAL_SERVER_ERROR, m.clone())
      }
      ApiError::Store(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()),
    };
    (status, Json(json!({ "error": message, "kind": self.tag() })))
      .into_response()
  }
}
