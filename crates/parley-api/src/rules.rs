//! Handlers for `/rules` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/rules` | Enabled rules in evaluation order |
//! | `POST` | `/rules` | Body: [`CreateBody`]; returns 201 + stored rule |

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use parley_core::{
  rule::{AutomationRule, NewRule, RuleAction, Trigger},
  store::EngagementStore,
};
use serde::Deserialize;

use crate::{error::ApiError, tenant::Tenant};

/// `GET /rules`
pub async fn list<S: EngagementStore>(
  State(store): State<Arc<S>>,
  Tenant(ctx): Tenant,
) -> Result<Json<Vec<AutomationRule>>, ApiError> {
  let rules = store.list_enabled_rules(&ctx).await.map_err(ApiError::store)?;
  Ok(Json(rules))
}

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub name:    String,
  pub trigger: Trigger,
  pub action:  RuleAction,
  #[serde(default = "enabled_by_default")]
  pub enabled: bool,
}

fn enabled_by_default() -> bool { true }

/// `POST /rules`
pub async fn create<S: EngagementStore>(
  State(store): State<Arc<S>>,
  Tenant(ctx): Tenant,
  Json(body): Json<CreateBody>,
) -> Result<impl IntoResponse, ApiError> {
  if body.name.trim().is_empty() {
    return Err(ApiError::BadRequest("rule name must not be empty".into()));
  }
  if let Trigger::Keyword { keywords } = &body.trigger
    && keywords.iter().all(|k| k.trim().is_empty())
  {
    return Err(ApiError::BadRequest("keyword rule needs at least one keyword".into()));
  }

  let rule = store
    .add_rule(&ctx, NewRule {
      name:    body.name,
      trigger: body.trigger,
      action:  body.action,
      enabled: body.enabled,
    })
    .await
    .map_err(ApiError::store)?;
  Ok((StatusCode::CREATED, Json(rule)))
}
