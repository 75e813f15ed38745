//! Delivery status callbacks for outbound messages.

use std::sync::Arc;

use parley_core::{
  event::StatusEvent,
  message::StatusTransition,
  store::EngagementStore,
  tenant::TenantContext,
};

use crate::error::{PipelineError, Result};

pub struct StatusTracker<S> {
  store: Arc<S>,
}

impl<S: EngagementStore> StatusTracker<S> {
  pub fn new(store: Arc<S>) -> Self { Self { store } }

  /// Apply a status report. Reports never move a message backward, and
  /// reports for messages this tenant never sent are discarded.
  pub async fn apply(&self, ctx: &TenantContext, event: &StatusEvent) -> Result<StatusTransition> {
    let transition = self
      .store
      .transition_message_status(ctx, &event.external_message_id, event.status, event.timestamp)
      .await
      .map_err(PipelineError::store)?;

    match transition {
      StatusTransition::Applied { from, to } => tracing::debug!(
        external_id = %event.external_message_id,
        %from,
        %to,
        "status advanced"
      ),
      StatusTransition::Stale { current } => tracing::debug!(
        external_id = %event.external_message_id,
        %current,
        reported = %event.status,
        "ignoring stale status"
      ),
      StatusTransition::Unknown => tracing::debug!(
        tenant = %ctx.tenant_id,
        external_id = %event.external_message_id,
        "discarding status for unknown message"
      ),
    }
    Ok(transition)
  }
}
