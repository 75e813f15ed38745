//! Contact resolution: external address to a durable contact record.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parley_core::{
  contact::{Contact, NewContact, normalize_address},
  store::EngagementStore,
  tenant::TenantContext,
};

use crate::error::{PipelineError, Result};

pub struct ContactResolver<S> {
  store: Arc<S>,
}

impl<S: EngagementStore> ContactResolver<S> {
  pub fn new(store: Arc<S>) -> Self { Self { store } }

  /// Find the contact for `external_address`, creating it on first sight.
  ///
  /// Concurrent calls for the same address converge on one record; exactly
  /// one of them observes `is_new == true`.
  pub async fn resolve(
    &self,
    ctx: &TenantContext,
    external_address: &str,
    display_name_hint: &str,
    seen_at: DateTime<Utc>,
  ) -> Result<(Contact, bool)> {
    let address = normalize_address(external_address)?;

    let hint = display_name_hint.trim();
    let display_name = if hint.is_empty() { address.clone() } else { hint.to_owned() };

    let input = NewContact {
      address,
      display_name,
      tags: vec![ctx.channel_tag.clone()],
      seen_at,
    };

    let (contact, is_new) = self
      .store
      .upsert_contact(ctx, input)
      .await
      .map_err(PipelineError::store)?;

    if is_new {
      tracing::info!(
        tenant = %ctx.tenant_id,
        contact_id = %contact.contact_id,
        "new contact"
      );
    }
    Ok((contact, is_new))
  }
}
