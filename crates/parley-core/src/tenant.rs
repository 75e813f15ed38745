//! Explicit tenant context threaded through every store and capability call.

use serde::{Deserialize, Serialize};

/// Identifies the tenant and the channel an event arrived on.
///
/// Built by the transport layer from the channel that received the event and
/// passed by reference into every call; nothing downstream looks tenants up
/// from ambient state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantContext {
  pub tenant_id:   String,
  /// Channel the event arrived on; selects outbound credentials.
  pub channel_id:  String,
  /// Tag given to contacts first seen on this channel (e.g. `"whatsapp"`).
  pub channel_tag: String,
}

impl TenantContext {
  pub fn new(
    tenant_id: impl Into<String>,
    channel_id: impl Into<String>,
    channel_tag: impl Into<String>,
  ) -> Self {
    Self {
      tenant_id:   tenant_id.into(),
      channel_id:  channel_id.into(),
      channel_tag: channel_tag.into(),
    }
  }
}
