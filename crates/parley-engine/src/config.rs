//! Tunables for the pipeline.

use std::time::Duration;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
  /// Messages of context handed to the assistant, newest kept.
  pub history_limit:        usize,
  pub inference_timeout_ms: u64,
  pub delivery_timeout_ms:  u64,
  /// Concurrent automation jobs.
  pub dispatch_workers:     usize,
  /// Jobs queued before `submit` starts refusing.
  pub dispatch_queue:       usize,
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      history_limit:        20,
      inference_timeout_ms: 30_000,
      delivery_timeout_ms:  15_000,
      dispatch_workers:     4,
      dispatch_queue:       256,
    }
  }
}

impl PipelineConfig {
  pub fn inference_timeout(&self) -> Duration { Duration::from_millis(self.inference_timeout_ms) }

  pub fn delivery_timeout(&self) -> Duration { Duration::from_millis(self.delivery_timeout_ms) }
}
