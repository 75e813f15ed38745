//! Error type for `parley-engine`.

use thiserror::Error;

/// A failure that aborts processing of one event.
///
/// Capability faults (inference, delivery) never surface here; they are
/// outcomes, not errors.
#[derive(Debug, Error)]
pub enum PipelineError {
  /// The sender address can never be resolved; re-delivery will not help.
  #[error("invalid sender address: {0}")]
  InvalidAddress(#[from] parley_core::Error),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl PipelineError {
  pub fn store(err: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(err))
  }

  /// Whether the transport should re-deliver the event.
  pub fn is_retryable(&self) -> bool { matches!(self, Self::Store(_)) }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
