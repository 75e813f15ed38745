//! The per-event pipeline: dedup, resolve, open, persist, respond.

use std::{
  future::Future,
  sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use chrono::Utc;
use parley_core::{
  capability::{Delivery, Inference},
  contact::Contact,
  event::{InboundEvent, StatusEvent},
  message::{
    ContentKind, DeliveryStatus, InboundPosition, MessageInsert, NewMessage, SenderKind,
    StatusTransition,
  },
  store::EngagementStore,
  tenant::TenantContext,
};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::{
  config::PipelineConfig,
  dispatch::{AutomationJob, Dispatch, action_body},
  error::{PipelineError, Result},
  handoff::HandoffController,
  matcher::{MatchInput, match_rule},
  resolver::ContactResolver,
  session::SessionManager,
  status::StatusTracker,
};

/// Result of handling one inbound event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundOutcome {
  /// The event was seen before; nothing was written.
  Duplicate { message_id: Uuid },
  Accepted(Accepted),
}

impl InboundOutcome {
  pub fn is_duplicate(&self) -> bool { matches!(self, Self::Duplicate { .. }) }

  pub fn message_id(&self) -> Uuid {
    match self {
      Self::Duplicate { message_id } => *message_id,
      Self::Accepted(a) => a.message_id,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted {
  pub contact_id:          Uuid,
  pub conversation_id:     Uuid,
  pub message_id:          Uuid,
  /// No earlier contact-sent message is stored for this contact.
  pub is_new_contact:      bool,
  /// No earlier contact-sent message is stored in this conversation.
  pub is_new_conversation: bool,
  pub response:            ResponseKind,
}

/// Which automated responder, if any, handled the event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseKind {
  None,
  /// A rule matched. `queued` is false if the dispatcher refused the job.
  Automation { rule_id: Uuid, queued: bool },
  /// The assistant was asked to reply. It runs in the background; see
  /// [`Pipeline::settle`].
  Assistant,
}

impl ResponseKind {
  pub fn automation_triggered(&self) -> bool { matches!(self, Self::Automation { .. }) }

  pub fn ai_invoked(&self) -> bool { matches!(self, Self::Assistant) }
}

/// Where transports hand normalized events.
pub trait EventSink: Send + Sync {
  fn handle_inbound<'a>(
    &'a self,
    ctx: &'a TenantContext,
    event: InboundEvent,
  ) -> impl Future<Output = Result<InboundOutcome>> + Send + 'a;

  fn apply_status<'a>(
    &'a self,
    ctx: &'a TenantContext,
    event: StatusEvent,
  ) -> impl Future<Output = Result<StatusTransition>> + Send + 'a;
}

pub struct Pipeline<S, I, D, Q> {
  store:      Arc<S>,
  resolver:   ContactResolver<S>,
  sessions:   SessionManager<S>,
  handoff:    Arc<HandoffController<S, I, D>>,
  tracker:    StatusTracker<S>,
  dispatch:   Arc<Q>,
  /// Assistant replies still in flight. Dropping the pipeline aborts them.
  responders: Mutex<JoinSet<()>>,
}

impl<S, I, D, Q> Pipeline<S, I, D, Q>
where
  S: EngagementStore + 'static,
  I: Inference + 'static,
  D: Delivery + 'static,
  Q: Dispatch,
{
  pub fn new(
    store: Arc<S>,
    inference: Arc<I>,
    delivery: Arc<D>,
    dispatch: Arc<Q>,
    config: PipelineConfig,
  ) -> Self {
    Self {
      resolver: ContactResolver::new(store.clone()),
      sessions: SessionManager::new(store.clone()),
      handoff: Arc::new(HandoffController::new(store.clone(), inference, delivery, config)),
      tracker: StatusTracker::new(store.clone()),
      store,
      dispatch,
      responders: Mutex::new(JoinSet::new()),
    }
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  /// Wait for every assistant reply started so far to finish.
  pub async fn settle(&self) {
    let mut pending = std::mem::take(&mut *self.responders());
    while let Some(joined) = pending.join_next().await {
      if let Err(e) = joined {
        tracing::error!("assistant reply task failed: {e}");
      }
    }
  }

  fn responders(&self) -> MutexGuard<'_, JoinSet<()>> {
    self.responders.lock().unwrap_or_else(PoisonError::into_inner)
  }

  /// Run the assistant for one inbound message without holding up the
  /// caller. Finished tasks are reaped here so the set stays small.
  fn spawn_assistant(&self, ctx: &TenantContext, conversation_id: Uuid, contact: Contact, text: String) {
    let handoff = self.handoff.clone();
    let ctx = ctx.clone();
    let mut responders = self.responders();
    while let Some(joined) = responders.try_join_next() {
      if let Err(e) = joined {
        tracing::error!("assistant reply task failed: {e}");
      }
    }
    responders.spawn(async move {
      let outcome = handoff.respond(&ctx, conversation_id, &contact, &text).await;
      tracing::debug!(%conversation_id, ?outcome, "assistant reply finished");
    });
  }

  async fn process(&self, ctx: &TenantContext, event: InboundEvent) -> Result<InboundOutcome> {
    // Cheap rejection of re-deliveries; the insert below is the real guard.
    if let Some(existing) = self
      .store
      .find_message_by_external_id(ctx, &event.external_message_id)
      .await
      .map_err(PipelineError::store)?
    {
      tracing::debug!(external_id = %event.external_message_id, "duplicate event");
      return Ok(InboundOutcome::Duplicate { message_id: existing.message_id });
    }

    let (contact, created_contact) = self
      .resolver
      .resolve(ctx, &event.external_address, &event.sender_display_name, event.received_at)
      .await?;

    let (conversation, created_conversation) = self
      .sessions
      .open_or_reuse(ctx, contact.contact_id, event.received_at)
      .await?;

    let insert = self
      .store
      .insert_message(ctx, NewMessage {
        conversation_id: conversation.conversation_id,
        content:         event.text.clone(),
        sender:          SenderKind::Contact,
        content_kind:    event.content_kind,
        external_id:     Some(event.external_message_id.clone()),
        status:          DeliveryStatus::Delivered,
        created_at:      event.received_at,
      })
      .await
      .map_err(PipelineError::store)?;
    let message = match insert {
      MessageInsert::Inserted(message) => message,
      MessageInsert::Duplicate(existing) => {
        tracing::debug!(external_id = %event.external_message_id, "duplicate event (raced)");
        return Ok(InboundOutcome::Duplicate { message_id: existing.message_id });
      }
    };

    tracing::info!(
      tenant = %ctx.tenant_id,
      contact_id = %contact.contact_id,
      conversation_id = %conversation.conversation_id,
      message_id = %message.message_id,
      kind = %event.content_kind,
      "inbound message stored"
    );

    // From here on the message is durable; faults are logged, not returned.

    // Newness comes from the stored messages, not from the upserts above: a
    // first attempt that died before its insert leaves the contact and
    // conversation behind, and its redelivery must still count as first.
    let fallback = InboundPosition {
      first_for_contact:      created_contact,
      first_for_conversation: created_conversation,
    };
    let position = match self.store.inbound_position(ctx, message.message_id).await {
      Ok(Some(position)) => position,
      Ok(None) => {
        tracing::warn!(message_id = %message.message_id, "stored message vanished");
        fallback
      }
      Err(e) => {
        tracing::warn!(message_id = %message.message_id, "could not read message position: {e}");
        fallback
      }
    };
    let is_new_contact = position.first_for_contact;
    let is_new_conversation = position.first_for_conversation;

    let rules = match self.store.list_enabled_rules(ctx).await {
      Ok(rules) => Some(rules),
      Err(e) => {
        tracing::warn!(tenant = %ctx.tenant_id, "could not load automation rules: {e}");
        None
      }
    };

    let matched = rules.as_deref().and_then(|rules| {
      match_rule(
        MatchInput { text: &event.text, is_new_contact, is_new_conversation },
        rules,
      )
    });

    let response = if let Some(rule) = matched {
      let job = AutomationJob {
        ctx:             ctx.clone(),
        rule_id:         rule.rule_id,
        rule_name:       rule.name.clone(),
        conversation_id: conversation.conversation_id,
        to:              contact.address.clone(),
        body:            action_body(&rule.action),
      };
      let queued = match self.dispatch.submit(job) {
        Ok(()) => true,
        Err(e) => {
          tracing::warn!(rule_id = %rule.rule_id, "automation not queued: {e}");
          false
        }
      };
      ResponseKind::Automation { rule_id: rule.rule_id, queued }
    } else if rules.is_some()
      && conversation.bot_active
      && event.content_kind == ContentKind::Text
      && !event.text.trim().is_empty()
    {
      self.spawn_assistant(ctx, conversation.conversation_id, contact.clone(), event.text.clone());
      ResponseKind::Assistant
    } else {
      ResponseKind::None
    };

    Ok(InboundOutcome::Accepted(Accepted {
      contact_id: contact.contact_id,
      conversation_id: conversation.conversation_id,
      message_id: message.message_id,
      is_new_contact,
      is_new_conversation,
      response,
    }))
  }
}

impl<S, I, D, Q> EventSink for Pipeline<S, I, D, Q>
where
  S: EngagementStore + 'static,
  I: Inference + 'static,
  D: Delivery + 'static,
  Q: Dispatch,
{
  async fn handle_inbound(&self, ctx: &TenantContext, event: InboundEvent) -> Result<InboundOutcome> {
    let started = Utc::now();
    let external_id = event.external_message_id.clone();
    let result = self.process(ctx, event).await;
    if let Err(e) = &result {
      tracing::error!(
        tenant = %ctx.tenant_id,
        external_id = %external_id,
        elapsed_ms = (Utc::now() - started).num_milliseconds(),
        "inbound event failed: {e}"
      );
    }
    result
  }

  async fn apply_status(&self, ctx: &TenantContext, event: StatusEvent) -> Result<StatusTransition> {
    self.tracker.apply(ctx, &event).await
  }
}
