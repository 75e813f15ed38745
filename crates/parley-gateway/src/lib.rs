//! HTTP front door for Parley.
//!
//! Receives WhatsApp Cloud API webhooks per configured channel, verifies
//! them, and feeds the normalized events to an [`EventSink`]. The
//! human-action API from `parley-api` is mounted alongside under `/api`.

pub mod error;
pub mod webhook;

pub use error::Error;

use std::{collections::HashMap, path::PathBuf, sync::Arc};

use axum::{Router, routing::get};
use parley_core::{store::EngagementStore, tenant::TenantContext};
use parley_engine::{EventSink, PipelineConfig};
use parley_http::{ChannelCredentials, InferenceConfig};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml`.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  pub host:           String,
  pub port:           u16,
  pub store_path:     PathBuf,
  #[serde(default = "default_graph_base_url")]
  pub graph_base_url: String,
  pub inference:      InferenceConfig,
  #[serde(default)]
  pub pipeline:       PipelineConfig,
  #[serde(default)]
  pub channels:       Vec<ChannelConfig>,
}

fn default_graph_base_url() -> String { "https://graph.facebook.com/v21.0".to_string() }

/// One WhatsApp business number and the tenant it belongs to.
#[derive(Deserialize, Clone, Debug)]
pub struct ChannelConfig {
  /// Path segment of the channel's webhook URL.
  pub id:              String,
  pub tenant_id:       String,
  #[serde(default = "default_tag")]
  pub tag:             String,
  #[serde(default)]
  pub phone_number_id: String,
  #[serde(default)]
  pub verify_token:    String,
  /// Empty disables signature checks.
  #[serde(default)]
  pub app_secret:      String,
  #[serde(default)]
  pub access_token:    String,
}

fn default_tag() -> String { "whatsapp".to_string() }

impl ChannelConfig {
  pub fn context(&self) -> TenantContext {
    TenantContext::new(&self.tenant_id, &self.id, &self.tag)
  }

  pub fn credentials(&self) -> ChannelCredentials {
    ChannelCredentials {
      phone_number_id: self.phone_number_id.clone(),
      access_token:    self.access_token.clone(),
    }
  }
}

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through the webhook handlers.
pub struct AppState<E> {
  pub sink:     Arc<E>,
  /// Keyed by channel id.
  pub channels: Arc<HashMap<String, ChannelConfig>>,
}

impl<E> AppState<E> {
  pub fn new(sink: Arc<E>, channels: impl IntoIterator<Item = ChannelConfig>) -> Self {
    let channels = channels.into_iter().map(|c| (c.id.clone(), c)).collect();
    Self { sink, channels: Arc::new(channels) }
  }
}

impl<E> Clone for AppState<E> {
  fn clone(&self) -> Self {
    Self { sink: self.sink.clone(), channels: self.channels.clone() }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Webhook and health routes.
pub fn router<E>(state: AppState<E>) -> Router
where
  E: EventSink + 'static,
{
  Router::new()
    .route(
      "/webhooks/whatsapp/{channel_id}",
      get(webhook::verify::<E>).post(webhook::receive::<E>),
    )
    .route("/healthz", get(|| async { "ok" }))
    .with_state(state)
}

/// The full application: webhooks, health, and the `/api` surface over
/// `store`, with request tracing.
pub fn app<E, S>(state: AppState<E>, store: Arc<S>) -> Router
where
  E: EventSink + 'static,
  S: EngagementStore + 'static,
{
  router(state)
    .nest("/api", parley_api::api_router(store))
    .layer(TraceLayer::new_for_http())
}
