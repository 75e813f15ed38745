//! WhatsApp Cloud API webhook codec for Parley.
//!
//! Converts provider webhook deliveries into the normalized
//! [`InboundEvent`]/[`StatusEvent`] pair the pipeline consumes, and checks the
//! two pieces of provider authentication: the `X-Hub-Signature-256` body
//! signature and the subscription handshake. Pure synchronous; no HTTP or
//! database dependencies.
//!
//! # Quick start
//!
//! ```no_run
//! let body = br#"{"entry":[]}"#;
//! let batch = parley_webhook::parse(body, None, chrono::Utc::now()).unwrap();
//! println!("{} inbound, {} statuses", batch.inbound.len(), batch.statuses.len());
//! ```

pub mod error;
mod handshake;
mod parse;
mod signature;

use chrono::{DateTime, Utc};
pub use error::{Error, Result};
pub use handshake::{SubscriptionQuery, verify_subscription};
use parley_core::event::{InboundEvent, StatusEvent};
pub use signature::{SIGNATURE_HEADER, sign, verify_signature};

// ─── Public types ────────────────────────────────────────────────────────────

/// Everything one webhook delivery carried, in payload order.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct WebhookBatch {
  pub inbound:  Vec<InboundEvent>,
  pub statuses: Vec<StatusEvent>,
}

impl WebhookBatch {
  pub fn is_empty(&self) -> bool { self.inbound.is_empty() && self.statuses.is_empty() }
}

// ─── Public API ──────────────────────────────────────────────────────────────

/// Parse a webhook body.
///
/// When `phone_number_id` is given, changes addressed to a different business
/// number are skipped. `now` stands in for missing or unparseable provider
/// timestamps. Entries the pipeline cannot use (messages without sender or
/// id, unknown status strings) are dropped rather than failing the batch.
pub fn parse(body: &[u8], phone_number_id: Option<&str>, now: DateTime<Utc>) -> Result<WebhookBatch> {
  parse::parse_batch(body, phone_number_id, now)
}
