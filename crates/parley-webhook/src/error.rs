//! Error types for the parley-webhook codec.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("malformed webhook payload: {0}")]
  Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
