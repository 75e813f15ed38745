//! Error type for `parley-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] parley_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A write would break a uniqueness guarantee (e.g. reopening a
  /// conversation while the contact already has an open one).
  #[error("conflict: {0}")]
  Conflict(String),
}

impl Error {
  /// Turn a UNIQUE/CHECK violation into [`Error::Conflict`]; pass anything
  /// else through as a database error.
  pub(crate) fn from_write(err: tokio_rusqlite::Error, what: &str) -> Self {
    if let tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _)) = &err
      && e.code == rusqlite::ErrorCode::ConstraintViolation
    {
      return Error::Conflict(what.to_owned());
    }
    Error::Database(err)
  }
}

impl parley_core::store::StoreError for Error {
  fn is_conflict(&self) -> bool { matches!(self, Error::Conflict(_)) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
