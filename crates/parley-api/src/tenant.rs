//! Tenant extractor.

use axum::{extract::FromRequestParts, http::request::Parts};
use parley_core::tenant::TenantContext;

use crate::error::ApiError;

/// Header naming the tenant a request acts for.
pub const TENANT_HEADER: &str = "x-tenant-id";

/// The tenant context of an API request. API actions are not tied to a
/// channel, so the channel fields are empty.
pub struct Tenant(pub TenantContext);

impl<St: Send + Sync> FromRequestParts<St> for Tenant {
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, _state: &St) -> Result<Self, Self::Rejection> {
    let tenant_id = parts
      .headers
      .get(TENANT_HEADER)
      .and_then(|v| v.to_str().ok())
      .map(str::trim)
      .filter(|v| !v.is_empty())
      .ok_or_else(|| ApiError::BadRequest(format!("missing {TENANT_HEADER} header")))?;
    Ok(Tenant(TenantContext::new(tenant_id, "", "")))
  }
}
