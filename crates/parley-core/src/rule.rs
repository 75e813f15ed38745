//! Automation rules: standing trigger → action bindings.
//!
//! Rules are authored elsewhere; the pipeline only reads enabled ones. The
//! trigger configuration is a tagged union so that evaluation is exhaustive.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Discriminant of [`Trigger`], stored alongside the JSON configuration.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TriggerKind {
  NewContact,
  FirstMessage,
  Keyword,
  Scheduled,
  TicketStatusChange,
  Anniversary,
}

/// What causes a rule to fire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Trigger {
  /// The first event ever received from an address.
  NewContact,
  /// The first event of a freshly opened conversation.
  FirstMessage,
  /// Any keyword appears, case-insensitively, inside the inbound text.
  Keyword { keywords: Vec<String> },
  /// Time-driven; never fired by inbound events.
  Scheduled { cron: String },
  /// Fired by the ticketing side; never fired by inbound events.
  TicketStatusChange { to: String },
  /// Fired by a date attribute on the contact; never fired by inbound events.
  Anniversary { field: String, days_before: u32 },
}

impl Trigger {
  pub fn kind(&self) -> TriggerKind {
    match self {
      Self::NewContact => TriggerKind::NewContact,
      Self::FirstMessage => TriggerKind::FirstMessage,
      Self::Keyword { .. } => TriggerKind::Keyword,
      Self::Scheduled { .. } => TriggerKind::Scheduled,
      Self::TicketStatusChange { .. } => TriggerKind::TicketStatusChange,
      Self::Anniversary { .. } => TriggerKind::Anniversary,
    }
  }
}

/// What a rule does when it fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleAction {
  /// Free text sent as-is.
  Text { body: String },
  /// A provider-approved message template.
  Template { name: String, language: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutomationRule {
  pub rule_id:    Uuid,
  pub tenant_id:  String,
  pub name:       String,
  pub trigger:    Trigger,
  pub action:     RuleAction,
  pub enabled:    bool,
  pub created_at: DateTime<Utc>,
}

/// Input to [`EngagementStore::add_rule`](crate::store::EngagementStore::add_rule).
#[derive(Debug, Clone)]
pub struct NewRule {
  pub name:    String,
  pub trigger: Trigger,
  pub action:  RuleAction,
  pub enabled: bool,
}

impl NewRule {
  pub fn new(name: impl Into<String>, trigger: Trigger, action: RuleAction) -> Self {
    Self { name: name.into(), trigger, action, enabled: true }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn trigger_json_is_tagged() {
    let t = Trigger::Keyword { keywords: vec!["cancelar".into()] };
    let json = serde_json::to_value(&t).unwrap();
    assert_eq!(json["kind"], "keyword");
    assert_eq!(json["keywords"][0], "cancelar");

    let back: Trigger =
      serde_json::from_str(r#"{"kind":"anniversary","field":"birthday","days_before":3}"#)
        .unwrap();
    assert_eq!(back.kind(), TriggerKind::Anniversary);
  }

  #[test]
  fn kind_strings_are_snake_case() {
    assert_eq!(TriggerKind::TicketStatusChange.as_ref(), "ticket_status_change");
    assert_eq!(Trigger::NewContact.kind().to_string(), "new_contact");
  }
}
