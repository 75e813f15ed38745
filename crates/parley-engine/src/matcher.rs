//! Automation rule matching.
//!
//! Precedence: a new-contact rule when the contact is new, otherwise a
//! first-message rule when the conversation is new, then keyword rules.
//! Within a kind, the first rule in list order wins. Time-, ticket- and
//! date-driven triggers never fire from an inbound event.

use parley_core::rule::{AutomationRule, Trigger};

/// What the matcher knows about the event being handled.
#[derive(Debug, Clone, Copy)]
pub struct MatchInput<'a> {
  pub text:                &'a str,
  pub is_new_contact:      bool,
  pub is_new_conversation: bool,
}

/// Pick at most one rule to fire. `rules` must be in creation order.
pub fn match_rule<'r>(input: MatchInput<'_>, rules: &'r [AutomationRule]) -> Option<&'r AutomationRule> {
  let enabled = || rules.iter().filter(|r| r.enabled);

  if input.is_new_contact {
    if let Some(rule) = enabled().find(|r| matches!(r.trigger, Trigger::NewContact)) {
      return Some(rule);
    }
  } else if input.is_new_conversation
    && let Some(rule) = enabled().find(|r| matches!(r.trigger, Trigger::FirstMessage))
  {
    return Some(rule);
  }

  let text = input.text.to_lowercase();
  if text.trim().is_empty() {
    return None;
  }
  enabled().find(|r| fires_on_text(&r.trigger, &text))
}

/// Whether `trigger` fires on already-lowercased inbound text.
fn fires_on_text(trigger: &Trigger, text: &str) -> bool {
  match trigger {
    Trigger::Keyword { keywords } => keywords.iter().any(|k| {
      let k = k.trim();
      !k.is_empty() && text.contains(&k.to_lowercase())
    }),
    Trigger::NewContact
    | Trigger::FirstMessage
    | Trigger::Scheduled { .. }
    | Trigger::TicketStatusChange { .. }
    | Trigger::Anniversary { .. } => false,
  }
}
