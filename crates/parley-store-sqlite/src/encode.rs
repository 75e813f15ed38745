//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 strings (microseconds, `Z`)
//! so that lexical order is chronological. Enums use their snake_case names.
//! Tags, triggers and actions are compact JSON. UUIDs are hyphenated
//! lowercase strings.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use parley_core::{
  contact::Contact,
  conversation::Conversation,
  message::Message,
  rule::{AutomationRule, RuleAction, Trigger},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

/// Parse a snake_case enum column via its `strum::EnumString` impl.
pub fn decode_enum<T: FromStr>(kind: &'static str, s: &str) -> Result<T> {
  s.parse().map_err(|_| {
    Error::Core(parley_core::Error::UnknownDiscriminant { kind, value: s.to_owned() })
  })
}

pub fn encode_tags(tags: &[String]) -> Result<String> { Ok(serde_json::to_string(tags)?) }

pub fn decode_tags(s: &str) -> Result<Vec<String>> { Ok(serde_json::from_str(s)?) }

// ─── Row types ───────────────────────────────────────────────────────────────

pub const CONTACT_COLUMNS: &str = "contact_id, tenant_id, address, display_name, tags, \
                                   is_valid, created_at, last_message_at";

/// Raw values read directly from a `contacts` row.
pub struct RawContact {
  pub contact_id:      String,
  pub tenant_id:       String,
  pub address:         String,
  pub display_name:    String,
  pub tags:            String,
  pub is_valid:        bool,
  pub created_at:      String,
  pub last_message_at: String,
}

impl RawContact {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      contact_id:      row.get(0)?,
      tenant_id:       row.get(1)?,
      address:         row.get(2)?,
      display_name:    row.get(3)?,
      tags:            row.get(4)?,
      is_valid:        row.get(5)?,
      created_at:      row.get(6)?,
      last_message_at: row.get(7)?,
    })
  }

  pub fn into_contact(self) -> Result<Contact> {
    Ok(Contact {
      contact_id:      decode_uuid(&self.contact_id)?,
      tenant_id:       self.tenant_id,
      address:         self.address,
      display_name:    self.display_name,
      tags:            decode_tags(&self.tags)?,
      is_valid:        self.is_valid,
      created_at:      decode_dt(&self.created_at)?,
      last_message_at: decode_dt(&self.last_message_at)?,
    })
  }
}

pub const CONVERSATION_COLUMNS: &str = "conversation_id, tenant_id, contact_id, status, \
                                        bot_active, unread_count, created_at, last_message_at";

/// Raw values read directly from a `conversations` row.
pub struct RawConversation {
  pub conversation_id: String,
  pub tenant_id:       String,
  pub contact_id:      String,
  pub status:          String,
  pub bot_active:      bool,
  pub unread_count:    i64,
  pub created_at:      String,
  pub last_message_at: String,
}

impl RawConversation {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      conversation_id: row.get(0)?,
      tenant_id:       row.get(1)?,
      contact_id:      row.get(2)?,
      status:          row.get(3)?,
      bot_active:      row.get(4)?,
      unread_count:    row.get(5)?,
      created_at:      row.get(6)?,
      last_message_at: row.get(7)?,
    })
  }

  pub fn into_conversation(self) -> Result<Conversation> {
    Ok(Conversation {
      conversation_id: decode_uuid(&self.conversation_id)?,
      tenant_id:       self.tenant_id,
      contact_id:      decode_uuid(&self.contact_id)?,
      status:          decode_enum("conversation status", &self.status)?,
      bot_active:      self.bot_active,
      unread_count:    u32::try_from(self.unread_count.max(0)).unwrap_or(u32::MAX),
      created_at:      decode_dt(&self.created_at)?,
      last_message_at: decode_dt(&self.last_message_at)?,
    })
  }
}

pub const MESSAGE_COLUMNS: &str = "message_id, tenant_id, conversation_id, content, sender, \
                                   content_kind, external_id, status, created_at, status_at";

/// Raw values read directly from a `messages` row.
pub struct RawMessage {
  pub message_id:      String,
  pub tenant_id:       String,
  pub conversation_id: String,
  pub content:         String,
  pub sender:          String,
  pub content_kind:    String,
  pub external_id:     Option<String>,
  pub status:          String,
  pub created_at:      String,
  pub status_at:       Option<String>,
}

impl RawMessage {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      message_id:      row.get(0)?,
      tenant_id:       row.get(1)?,
      conversation_id: row.get(2)?,
      content:         row.get(3)?,
      sender:          row.get(4)?,
      content_kind:    row.get(5)?,
      external_id:     row.get(6)?,
      status:          row.get(7)?,
      created_at:      row.get(8)?,
      status_at:       row.get(9)?,
    })
  }

  pub fn into_message(self) -> Result<Message> {
    Ok(Message {
      message_id:      decode_uuid(&self.message_id)?,
      tenant_id:       self.tenant_id,
      conversation_id: decode_uuid(&self.conversation_id)?,
      content:         self.content,
      sender:          decode_enum("sender kind", &self.sender)?,
      content_kind:    decode_enum("content kind", &self.content_kind)?,
      external_id:     self.external_id,
      status:          decode_enum("delivery status", &self.status)?,
      created_at:      decode_dt(&self.created_at)?,
      status_at:       self.status_at.as_deref().map(decode_dt).transpose()?,
    })
  }
}

pub const RULE_COLUMNS: &str =
  "rule_id, tenant_id, name, trigger_json, action_json, enabled, created_at";

/// Raw values read directly from an `automation_rules` row.
pub struct RawRule {
  pub rule_id:      String,
  pub tenant_id:    String,
  pub name:         String,
  pub trigger_json: String,
  pub action_json:  String,
  pub enabled:      bool,
  pub created_at:   String,
}

impl RawRule {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      rule_id:      row.get(0)?,
      tenant_id:    row.get(1)?,
      name:         row.get(2)?,
      trigger_json: row.get(3)?,
      action_json:  row.get(4)?,
      enabled:      row.get(5)?,
      created_at:   row.get(6)?,
    })
  }

  pub fn into_rule(self) -> Result<AutomationRule> {
    let trigger: Trigger = serde_json::from_str(&self.trigger_json)?;
    let action: RuleAction = serde_json::from_str(&self.action_json)?;
    Ok(AutomationRule {
      rule_id: decode_uuid(&self.rule_id)?,
      tenant_id: self.tenant_id,
      name: self.name,
      trigger,
      action,
      enabled: self.enabled,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}
