//! Assistant replies and the bot-to-human handoff.

use std::{collections::BTreeMap, sync::Arc};

use parley_core::{
  capability::{ChatRole, ChatTurn, Delivery, Inference, InferenceRequest, OutboundBody},
  contact::Contact,
  conversation::ConversationStatus,
  store::EngagementStore,
  tenant::TenantContext,
};
use uuid::Uuid;

use crate::{
  config::PipelineConfig,
  outbound::{SendOutcome, persist_and_send},
};

/// What [`HandoffController::respond`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandoffOutcome {
  /// The assistant answered; the reply was stored and a send attempted.
  Replied {
    message_id: Option<Uuid>,
    delivery:   Option<SendOutcome>,
    handed_off: bool,
  },
  /// The assistant asked for a human without saying anything.
  HandedOffSilently,
  /// Inference failed or timed out. Nothing was written.
  InferenceFailed,
  /// History could not be loaded. Nothing was written.
  HistoryUnavailable,
}

pub struct HandoffController<S, I, D> {
  store:     Arc<S>,
  inference: Arc<I>,
  delivery:  Arc<D>,
  config:    PipelineConfig,
}

impl<S, I, D> HandoffController<S, I, D>
where
  S: EngagementStore,
  I: Inference,
  D: Delivery,
{
  pub fn new(store: Arc<S>, inference: Arc<I>, delivery: Arc<D>, config: PipelineConfig) -> Self {
    Self { store, inference, delivery, config }
  }

  /// Ask the assistant for a reply to the conversation's recent history and
  /// send it. If the assistant requests a human, the conversation moves to
  /// `waiting_human` with the bot off, whether or not delivery succeeded.
  ///
  /// Never fails: every fault is logged and reported in the outcome.
  pub async fn respond(
    &self,
    ctx: &TenantContext,
    conversation_id: Uuid,
    contact: &Contact,
    latest_text: &str,
  ) -> HandoffOutcome {
    let history = match self
      .store
      .recent_messages(ctx, conversation_id, self.config.history_limit.max(1))
      .await
    {
      Ok(history) => history,
      Err(e) => {
        tracing::warn!(%conversation_id, "could not load history: {e}");
        return HandoffOutcome::HistoryUnavailable;
      }
    };

    let mut turns: Vec<ChatTurn> = history
      .into_iter()
      .filter(|m| !m.content.trim().is_empty())
      .map(|m| ChatTurn { role: ChatRole::from(m.sender), content: m.content })
      .collect();
    if turns.is_empty() {
      turns.push(ChatTurn { role: ChatRole::User, content: latest_text.to_owned() });
    }

    let request = InferenceRequest {
      history: turns,
      context: BTreeMap::from([
        ("contact_name".to_owned(), contact.display_name.clone()),
        ("tenant_id".to_owned(), ctx.tenant_id.clone()),
        ("conversation_id".to_owned(), conversation_id.to_string()),
      ]),
    };

    let timeout = self.config.inference_timeout();
    let reply = match tokio::time::timeout(timeout, self.inference.infer(ctx, request)).await {
      Ok(Ok(reply)) => reply,
      Ok(Err(e)) => {
        tracing::warn!(tenant = %ctx.tenant_id, %conversation_id, "inference failed: {e}");
        return HandoffOutcome::InferenceFailed;
      }
      Err(_) => {
        tracing::warn!(
          tenant = %ctx.tenant_id,
          %conversation_id,
          "inference timed out after {timeout:?}"
        );
        return HandoffOutcome::InferenceFailed;
      }
    };

    let text = reply.text.trim();
    if text.is_empty() && !reply.needs_human_transfer {
      tracing::warn!(%conversation_id, "assistant returned an empty reply");
      return HandoffOutcome::InferenceFailed;
    }

    if text.is_empty() {
      self.hand_to_human(ctx, conversation_id).await;
      return HandoffOutcome::HandedOffSilently;
    }

    let (message_id, delivery) = match persist_and_send(
      &*self.store,
      &*self.delivery,
      ctx,
      conversation_id,
      &contact.address,
      OutboundBody::Text(text.to_owned()),
      self.config.delivery_timeout(),
    )
    .await
    {
      Ok((message, outcome)) => (Some(message.message_id), Some(outcome)),
      Err(e) => {
        tracing::warn!(%conversation_id, "could not store assistant reply: {e}");
        (None, None)
      }
    };

    let handed_off = reply.needs_human_transfer && self.hand_to_human(ctx, conversation_id).await;

    HandoffOutcome::Replied { message_id, delivery, handed_off }
  }

  async fn hand_to_human(&self, ctx: &TenantContext, conversation_id: Uuid) -> bool {
    match self
      .store
      .update_conversation_state(ctx, conversation_id, ConversationStatus::WaitingHuman, false)
      .await
    {
      Ok(Some(_)) => {
        tracing::info!(tenant = %ctx.tenant_id, %conversation_id, "handed off to a human");
        true
      }
      Ok(None) => {
        tracing::warn!(%conversation_id, "conversation vanished before handoff");
        false
      }
      Err(e) => {
        tracing::warn!(%conversation_id, "handoff transition failed: {e}");
        false
      }
    }
  }
}
