//! Conversation session management: one open conversation per contact.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parley_core::{conversation::Conversation, store::EngagementStore, tenant::TenantContext};
use uuid::Uuid;

use crate::error::{PipelineError, Result};

pub struct SessionManager<S> {
  store: Arc<S>,
}

impl<S: EngagementStore> SessionManager<S> {
  pub fn new(store: Arc<S>) -> Self { Self { store } }

  /// Return the contact's open conversation, opening one if none exists.
  ///
  /// If more than one open conversation is found afterwards, the extras are
  /// merged into the earliest and the earliest is returned.
  pub async fn open_or_reuse(
    &self,
    ctx: &TenantContext,
    contact_id: Uuid,
    at: DateTime<Utc>,
  ) -> Result<(Conversation, bool)> {
    let (conversation, is_new) = self
      .store
      .open_conversation(ctx, contact_id, at)
      .await
      .map_err(PipelineError::store)?;

    let open = self
      .store
      .list_open_conversations(ctx, contact_id)
      .await
      .map_err(PipelineError::store)?;

    let Some((keep, retire)) = plan_merge(&open) else {
      if is_new {
        tracing::debug!(
          conversation_id = %conversation.conversation_id,
          "opened conversation"
        );
      }
      return Ok((conversation, is_new));
    };

    tracing::warn!(
      tenant = %ctx.tenant_id,
      %contact_id,
      keep = %keep,
      retired = retire.len(),
      "multiple open conversations for one contact; merging"
    );
    for id in &retire {
      self
        .store
        .merge_conversations(ctx, keep, *id)
        .await
        .map_err(PipelineError::store)?;
    }

    let opened_id = conversation.conversation_id;
    let survivor = self
      .store
      .get_conversation(ctx, keep)
      .await
      .map_err(PipelineError::store)?
      .unwrap_or(conversation);
    let is_new = is_new && survivor.conversation_id == opened_id;
    Ok((survivor, is_new))
  }
}

/// Choose the survivor among open conversations: the earliest created, ties
/// broken by id. Returns `None` when there is nothing to merge.
pub fn plan_merge(open: &[Conversation]) -> Option<(Uuid, Vec<Uuid>)> {
  if open.len() < 2 {
    return None;
  }
  let keep = open
    .iter()
    .min_by_key(|c| (c.created_at, c.conversation_id))?
    .conversation_id;
  let retire = open
    .iter()
    .map(|c| c.conversation_id)
    .filter(|id| *id != keep)
    .collect();
  Some((keep, retire))
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone};
  use parley_core::conversation::ConversationStatus;

  use super::*;

  fn conv(minutes: i64) -> Conversation {
    let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    Conversation {
      conversation_id: Uuid::new_v4(),
      tenant_id:       "t1".into(),
      contact_id:      Uuid::nil(),
      status:          ConversationStatus::Active,
      bot_active:      true,
      unread_count:    1,
      created_at:      base + Duration::minutes(minutes),
      last_message_at: base + Duration::minutes(minutes),
    }
  }

  #[test]
  fn single_open_conversation_needs_no_merge() {
    assert_eq!(plan_merge(&[]), None);
    assert_eq!(plan_merge(&[conv(0)]), None);
  }

  #[test]
  fn earliest_conversation_survives() {
    let late = conv(5);
    let early = conv(1);
    let middle = conv(3);
    let (keep, mut retire) =
      plan_merge(&[late.clone(), early.clone(), middle.clone()]).unwrap();
    assert_eq!(keep, early.conversation_id);
    retire.sort();
    let mut expected = vec![late.conversation_id, middle.conversation_id];
    expected.sort();
    assert_eq!(retire, expected);
  }
}
