//! Error types for `parley-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("address {0:?} contains no digits")]
  EmptyAddress(String),

  #[error("unknown {kind} discriminant: {value:?}")]
  UnknownDiscriminant { kind: &'static str, value: String },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
