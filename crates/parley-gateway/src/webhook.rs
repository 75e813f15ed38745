//! Webhook handlers.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/webhooks/whatsapp/:channel_id` | Subscription handshake; echoes `hub.challenge` |
//! | `POST` | `/webhooks/whatsapp/:channel_id` | Signed delivery; 500 asks the provider to retry |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::HeaderMap,
};
use bytes::Bytes;
use chrono::Utc;
use parley_engine::{EventSink, InboundOutcome};
use parley_webhook::{SIGNATURE_HEADER, SubscriptionQuery, verify_signature, verify_subscription};
use serde::Serialize;

use crate::{AppState, ChannelConfig, error::Error};

fn channel<'a, E>(state: &'a AppState<E>, id: &str) -> Result<&'a ChannelConfig, Error> {
  state.channels.get(id).ok_or_else(|| Error::UnknownChannel(id.to_string()))
}

/// `GET /webhooks/whatsapp/:channel_id`
pub async fn verify<E: EventSink>(
  State(state): State<AppState<E>>,
  Path(channel_id): Path<String>,
  Query(query): Query<SubscriptionQuery>,
) -> Result<String, Error> {
  let channel = channel(&state, &channel_id)?;
  let challenge = verify_subscription(&query, &channel.verify_token).ok_or(Error::Forbidden)?;
  tracing::info!(channel = %channel_id, "webhook subscription verified");
  Ok(challenge.to_string())
}

/// What one delivery amounted to.
#[derive(Debug, Default, Serialize)]
pub struct ReceiveSummary {
  pub received:   usize,
  pub processed:  usize,
  pub duplicates: usize,
  /// Events that can never succeed, e.g. senders without a usable address.
  pub skipped:    usize,
  pub statuses:   usize,
}

/// `POST /webhooks/whatsapp/:channel_id`
///
/// Events are handled in payload order, each one returning as soon as its
/// message is stored; assistant replies finish in the background. A
/// retryable failure aborts the rest of the batch with a 500; events already
/// handled are deduplicated on re-delivery.
pub async fn receive<E: EventSink>(
  State(state): State<AppState<E>>,
  Path(channel_id): Path<String>,
  headers: HeaderMap,
  body: Bytes,
) -> Result<Json<ReceiveSummary>, Error> {
  let channel = channel(&state, &channel_id)?;

  let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());
  if !verify_signature(&channel.app_secret, signature, &body) {
    tracing::warn!(channel = %channel_id, "rejecting webhook with bad signature");
    return Err(Error::Unauthorized);
  }

  let phone_number_id = Some(channel.phone_number_id.as_str()).filter(|p| !p.is_empty());
  let batch = parley_webhook::parse(&body, phone_number_id, Utc::now())?;
  let ctx = channel.context();

  let mut summary = ReceiveSummary { received: batch.inbound.len(), ..Default::default() };

  for event in batch.inbound {
    match state.sink.handle_inbound(&ctx, event).await {
      Ok(InboundOutcome::Duplicate { .. }) => summary.duplicates += 1,
      Ok(InboundOutcome::Accepted(_)) => summary.processed += 1,
      Err(e) if !e.is_retryable() => {
        tracing::warn!(channel = %channel_id, "skipping inbound event: {e}");
        summary.skipped += 1;
      }
      Err(e) => return Err(e.into()),
    }
  }

  for status in batch.statuses {
    state.sink.apply_status(&ctx, status).await?;
    summary.statuses += 1;
  }

  tracing::debug!(
    channel = %channel_id,
    received = summary.received,
    processed = summary.processed,
    duplicates = summary.duplicates,
    statuses = summary.statuses,
    "webhook handled"
  );
  Ok(Json(summary))
}
