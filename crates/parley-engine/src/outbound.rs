//! Persist-then-send for bot-originated messages.

use std::time::Duration;

use chrono::Utc;
use parley_core::{
  capability::{DeliveryReceipt, Delivery, OutboundBody},
  message::{ContentKind, DeliveryStatus, Message, NewMessage, SenderKind},
  store::EngagementStore,
  tenant::TenantContext,
};
use uuid::Uuid;

use crate::error::{PipelineError, Result};

/// What happened to one outbound send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
  Accepted { provider_message_id: Option<String> },
  Rejected { reason: String },
  /// Transport fault or timeout.
  Failed { reason: String },
}

impl SendOutcome {
  pub fn is_accepted(&self) -> bool { matches!(self, Self::Accepted { .. }) }
}

/// Store `body` as a pending bot message on the conversation, hand it to the
/// delivery capability under `timeout`, and record the provider id on
/// acceptance so later status callbacks correlate.
///
/// Only the initial write is an error; everything after it is an outcome.
pub async fn persist_and_send<S: EngagementStore, D: Delivery>(
  store: &S,
  delivery: &D,
  ctx: &TenantContext,
  conversation_id: Uuid,
  to: &str,
  body: OutboundBody,
  timeout: Duration,
) -> Result<(Message, SendOutcome)> {
  let content_kind = match body {
    OutboundBody::Text(_) => ContentKind::Text,
    OutboundBody::Template { .. } => ContentKind::Interactive,
  };
  let inserted = store
    .insert_message(ctx, NewMessage {
      conversation_id,
      content: body.preview(),
      sender: SenderKind::Bot,
      content_kind,
      external_id: None,
      status: DeliveryStatus::Pending,
      created_at: Utc::now(),
    })
    .await
    .map_err(PipelineError::store)?;
  let mut message = inserted.message().clone();

  let outcome = match tokio::time::timeout(timeout, delivery.send(ctx, to, body)).await {
    Err(_) => SendOutcome::Failed { reason: format!("timed out after {timeout:?}") },
    Ok(Err(e)) => SendOutcome::Failed { reason: e.to_string() },
    Ok(Ok(DeliveryReceipt::Rejected { reason })) => SendOutcome::Rejected { reason },
    Ok(Ok(DeliveryReceipt::Accepted { provider_message_id })) => {
      if let Some(id) = &provider_message_id {
        match store.set_message_external_id(ctx, message.message_id, id).await {
          Ok(()) => message.external_id = Some(id.clone()),
          Err(e) => tracing::warn!(
            message_id = %message.message_id,
            "could not record provider message id: {e}"
          ),
        }
      }
      SendOutcome::Accepted { provider_message_id }
    }
  };

  match &outcome {
    SendOutcome::Accepted { provider_message_id } => tracing::debug!(
      message_id = %message.message_id,
      provider_message_id = provider_message_id.as_deref().unwrap_or("-"),
      "outbound accepted"
    ),
    SendOutcome::Rejected { reason } | SendOutcome::Failed { reason } => tracing::warn!(
      tenant = %ctx.tenant_id,
      message_id = %message.message_id,
      "outbound not accepted: {reason}"
    ),
  }
  Ok((message, outcome))
}
