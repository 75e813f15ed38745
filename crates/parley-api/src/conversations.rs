//! Handlers for `/conversations` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/conversations/:id` | 404 if not found |
//! | `GET`  | `/conversations/:id/messages` | Optional `?limit=` (default 50, max 500), oldest first |
//! | `POST` | `/conversations/:id/state` | Body: `{"status":"active","bot_active":true}` |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use parley_core::{
  conversation::{Conversation, ConversationStatus},
  message::Message,
  store::EngagementStore,
  tenant::TenantContext,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{error::ApiError, tenant::Tenant};

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 500;

async fn load<S: EngagementStore>(
  store: &S,
  ctx: &TenantContext,
  id: Uuid,
) -> Result<Conversation, ApiError> {
  store
    .get_conversation(ctx, id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("conversation {id}")))
}

// ─── Get ──────────────────────────────────────────────────────────────────────

/// `GET /conversations/:id`
pub async fn get_one<S: EngagementStore>(
  State(store): State<Arc<S>>,
  Tenant(ctx): Tenant,
  Path(id): Path<Uuid>,
) -> Result<Json<Conversation>, ApiError> {
  Ok(Json(load(&*store, &ctx, id).await?))
}

// ─── Messages ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct MessageParams {
  pub limit: Option<usize>,
}

/// `GET /conversations/:id/messages[?limit=<n>]`
pub async fn messages<S: EngagementStore>(
  State(store): State<Arc<S>>,
  Tenant(ctx): Tenant,
  Path(id): Path<Uuid>,
  Query(params): Query<MessageParams>,
) -> Result<Json<Vec<Message>>, ApiError> {
  let limit = params.limit.unwrap_or(DEFAULT_LIMIT);
  if limit == 0 || limit > MAX_LIMIT {
    return Err(ApiError::BadRequest(format!("limit must be between 1 and {MAX_LIMIT}")));
  }
  load(&*store, &ctx, id).await?;
  let messages = store
    .recent_messages(&ctx, id, limit)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(messages))
}

// ─── State ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StateBody {
  pub status:     ConversationStatus,
  pub bot_active: bool,
}

/// `POST /conversations/:id/state`
///
/// Reopening a conversation while the contact already has another open one
/// is a 409. The check below gives the readable message; the store's open
/// conversation index settles concurrent reopens.
pub async fn set_state<S: EngagementStore>(
  State(store): State<Arc<S>>,
  Tenant(ctx): Tenant,
  Path(id): Path<Uuid>,
  Json(body): Json<StateBody>,
) -> Result<Json<Conversation>, ApiError> {
  let current = load(&*store, &ctx, id).await?;

  if body.status.is_open() && !current.is_open() {
    let open = store
      .list_open_conversations(&ctx, current.contact_id)
      .await
      .map_err(ApiError::store)?;
    if let Some(other) = open.iter().find(|c| c.conversation_id != id) {
      return Err(ApiError::Conflict(format!(
        "contact already has open conversation {}",
        other.conversation_id
      )));
    }
  }

  let updated = store
    .update_conversation_state(&ctx, id, body.status, body.bot_active)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("conversation {id}")))?;

  tracing::info!(
    tenant = %ctx.tenant_id,
    conversation_id = %id,
    status = %updated.status,
    bot_active = updated.bot_active,
    "conversation state set by agent"
  );
  Ok(Json(updated))
}
