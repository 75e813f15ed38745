//! Error types and axum `IntoResponse` implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid webhook signature")]
  Unauthorized,
  #[error("verification failed")]
  Forbidden,
  #[error("unknown channel: {0}")]
  UnknownChannel(String),
  #[error(transparent)]
  Payload(#[from] parley_webhook::Error),
  #[error("pipeline error: {0}")]
  Pipeline(#[from] parley_engine::PipelineError),
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    let status = match &self {
      Error::Unauthorized => StatusCode::UNAUTHORIZED,
      Error::Forbidden => StatusCode::FORBIDDEN,
      Error::UnknownChannel(_) => StatusCode::NOT_FOUND,
      Error::Payload(_) => StatusCode::BAD_REQUEST,
      Error::Pipeline(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(json!({ "error": self.to_string() }))).into_response()
  }
}
