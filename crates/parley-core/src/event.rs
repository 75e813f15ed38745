//! Normalized events handed to the pipeline by the inbound transport.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::{ContentKind, DeliveryStatus};

/// One inbound message from an external sender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
  /// Raw sender address as the provider reported it; not yet canonical.
  pub external_address:    String,
  pub sender_display_name: String,
  /// Provider message id; the idempotency key for the whole pipeline.
  pub external_message_id: String,
  pub content_kind:        ContentKind,
  /// Text body, caption or reply title. Empty for media without a caption.
  pub text:                String,
  pub received_at:         DateTime<Utc>,
}

/// A delivery status callback for a previously sent message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
  pub external_message_id: String,
  pub status:              DeliveryStatus,
  pub timestamp:           DateTime<Utc>,
}
