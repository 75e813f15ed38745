//! Conversation: one session of engagement with a contact.
//!
//! A conversation has two independent axes: its [`ConversationStatus`] and
//! whether the bot may answer inbound text (`bot_active`). At most one
//! conversation per contact may be open (status in [`ConversationStatus::OPEN`]).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ConversationStatus {
  Active,
  WaitingHuman,
  Resolved,
}

impl ConversationStatus {
  /// Statuses that count as the contact's single open session.
  pub const OPEN: [Self; 2] = [Self::Active, Self::WaitingHuman];

  pub fn is_open(self) -> bool { Self::OPEN.contains(&self) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
  pub conversation_id: Uuid,
  pub tenant_id:       String,
  pub contact_id:      Uuid,
  pub status:          ConversationStatus,
  pub bot_active:      bool,
  pub unread_count:    u32,
  pub created_at:      DateTime<Utc>,
  pub last_message_at: DateTime<Utc>,
}

impl Conversation {
  pub fn is_open(&self) -> bool { self.status.is_open() }
}
