//! Message: one unit of conversation content.
//!
//! Messages are immutable once persisted, except for their delivery status,
//! which only ever moves forward (see [`DeliveryStatus::advance`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

// ─── Enumerations ────────────────────────────────────────────────────────────

/// Who authored a message.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SenderKind {
  Contact,
  Agent,
  Bot,
}

/// The shape of a message's payload. Only `Text` is eligible for AI replies.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ContentKind {
  Text,
  Image,
  Audio,
  Video,
  Document,
  Sticker,
  Location,
  Interactive,
  Other,
}

impl ContentKind {
  /// Map a provider's message `type` onto a content kind; unknown types
  /// become [`ContentKind::Other`].
  pub fn from_provider(kind: &str) -> Self {
    match kind {
      "text" => Self::Text,
      "image" => Self::Image,
      "audio" | "voice" => Self::Audio,
      "video" => Self::Video,
      "document" => Self::Document,
      "sticker" => Self::Sticker,
      "location" => Self::Location,
      "interactive" | "button" => Self::Interactive,
      _ => Self::Other,
    }
  }
}

/// Provider-reported delivery progress of a message.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DeliveryStatus {
  Pending,
  Sent,
  Delivered,
  Read,
  Failed,
}

impl DeliveryStatus {
  /// Position in the forward order `pending < sent < delivered < read`.
  /// `Failed` sits outside the order.
  fn rank(self) -> Option<u8> {
    match self {
      Self::Pending => Some(0),
      Self::Sent => Some(1),
      Self::Delivered => Some(2),
      Self::Read => Some(3),
      Self::Failed => None,
    }
  }

  pub fn is_terminal(self) -> bool { matches!(self, Self::Failed) }

  /// The status to move to when `next` is reported while at `self`, or
  /// `None` when the report is stale and must be ignored.
  ///
  /// `Failed` is accepted from any non-failed state and is terminal.
  pub fn advance(self, next: Self) -> Option<Self> {
    match (self.rank(), next.rank()) {
      (None, _) => None,
      (Some(_), None) => Some(Self::Failed),
      (Some(current), Some(incoming)) if incoming > current => Some(next),
      (Some(_), Some(_)) => None,
    }
  }
}

// ─── Records ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
  pub message_id:      Uuid,
  pub tenant_id:       String,
  pub conversation_id: Uuid,
  pub content:         String,
  pub sender:          SenderKind,
  pub content_kind:    ContentKind,
  /// Provider-assigned id: the idempotency key for inbound messages and the
  /// correlation key for status callbacks on outbound ones.
  pub external_id:     Option<String>,
  pub status:          DeliveryStatus,
  pub created_at:      DateTime<Utc>,
  pub status_at:       Option<DateTime<Utc>>,
}

/// Input to [`EngagementStore::insert_message`](crate::store::EngagementStore::insert_message).
#[derive(Debug, Clone)]
pub struct NewMessage {
  pub conversation_id: Uuid,
  pub content:         String,
  pub sender:          SenderKind,
  pub content_kind:    ContentKind,
  pub external_id:     Option<String>,
  pub status:          DeliveryStatus,
  pub created_at:      DateTime<Utc>,
}

/// Outcome of an "insert if external id absent" write.
#[derive(Debug, Clone)]
pub enum MessageInsert {
  Inserted(Message),
  /// A message with the same external id already existed; it is returned
  /// unchanged and nothing was written.
  Duplicate(Message),
}

impl MessageInsert {
  pub fn message(&self) -> &Message {
    match self {
      Self::Inserted(m) | Self::Duplicate(m) => m,
    }
  }

  pub fn is_duplicate(&self) -> bool { matches!(self, Self::Duplicate(_)) }
}

/// Whether a contact-sent message is the earliest one persisted for its
/// contact and for its conversation.
///
/// Newness is read back from stored messages rather than from the upserts
/// that precede the insert, so a redelivered event whose first attempt died
/// before its message was written is still treated as a first contact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboundPosition {
  pub first_for_contact:      bool,
  pub first_for_conversation: bool,
}

/// Outcome of applying a status callback to a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTransition {
  Applied {
    from: DeliveryStatus,
    to:   DeliveryStatus,
  },
  /// The report did not move the message forward.
  Stale { current: DeliveryStatus },
  /// No message carries that external id.
  Unknown,
}
