//! External capabilities consumed by the pipeline: inference and delivery.
//!
//! Both are expected to fail sometimes. Callers treat every
//! [`CapabilityError`] as a non-fatal outcome.

use std::{collections::BTreeMap, future::Future, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{message::SenderKind, tenant::TenantContext};

// ─── Inference ───────────────────────────────────────────────────────────────

/// Neutral role scheme handed to the inference service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
  User,
  Assistant,
}

impl From<SenderKind> for ChatRole {
  fn from(sender: SenderKind) -> Self {
    match sender {
      SenderKind::Contact => Self::User,
      SenderKind::Agent | SenderKind::Bot => Self::Assistant,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
  pub role:    ChatRole,
  pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InferenceRequest {
  /// Oldest first.
  pub history: Vec<ChatTurn>,
  pub context: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InferenceReply {
  pub text:                 String,
  /// The model asks for the conversation to be handed to a human.
  #[serde(default, alias = "handover")]
  pub needs_human_transfer: bool,
}

// ─── Delivery ────────────────────────────────────────────────────────────────

/// Payload of an outbound send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundBody {
  Text(String),
  Template { name: String, language: String },
}

impl OutboundBody {
  /// The text persisted as the message content for this send.
  pub fn preview(&self) -> String {
    match self {
      Self::Text(body) => body.clone(),
      Self::Template { name, .. } => format!("[template:{name}]"),
    }
  }
}

/// Whether the provider accepted a send. Acceptance is not delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryReceipt {
  Accepted { provider_message_id: Option<String> },
  Rejected { reason: String },
}

// ─── Errors ──────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CapabilityError {
  #[error("timed out after {0:?}")]
  Timeout(Duration),

  #[error("transport error: {0}")]
  Transport(String),

  #[error("upstream returned {status}: {body}")]
  Status { status: u16, body: String },

  #[error("invalid response: {0}")]
  InvalidResponse(String),

  #[error("not configured: {0}")]
  NotConfigured(String),
}

// ─── Traits ──────────────────────────────────────────────────────────────────

/// Request/response access to the assistant model.
pub trait Inference: Send + Sync {
  fn infer<'a>(
    &'a self,
    ctx: &'a TenantContext,
    request: InferenceRequest,
  ) -> impl Future<Output = Result<InferenceReply, CapabilityError>> + Send + 'a;
}

/// Outbound message delivery to an external address.
pub trait Delivery: Send + Sync {
  fn send<'a>(
    &'a self,
    ctx: &'a TenantContext,
    to: &'a str,
    body: OutboundBody,
  ) -> impl Future<Output = Result<DeliveryReceipt, CapabilityError>> + Send + 'a;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn sender_kinds_map_to_neutral_roles() {
    assert_eq!(ChatRole::from(SenderKind::Contact), ChatRole::User);
    assert_eq!(ChatRole::from(SenderKind::Bot), ChatRole::Assistant);
    assert_eq!(ChatRole::from(SenderKind::Agent), ChatRole::Assistant);
  }

  #[test]
  fn template_preview_names_the_template() {
    let body = OutboundBody::Template { name: "welcome".into(), language: "pt_BR".into() };
    assert_eq!(body.preview(), "[template:welcome]");
  }
}
