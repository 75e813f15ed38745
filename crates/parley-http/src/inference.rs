//! Client for the assistant inference service.

use std::time::Duration;

use anyhow::{Context, Result};
use parley_core::{
  capability::{CapabilityError, Inference, InferenceReply, InferenceRequest},
  tenant::TenantContext,
};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};

#[derive(Debug, Clone, Deserialize)]
pub struct InferenceConfig {
  /// Full URL the conversation is POSTed to.
  pub endpoint:     String,
  #[serde(default)]
  pub api_key:      String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 { 30 }

#[derive(Clone)]
pub struct HttpInference {
  client: Client,
  config: InferenceConfig,
}

impl HttpInference {
  pub fn new(config: InferenceConfig) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .context("failed to build inference HTTP client")?;
    Ok(Self { client, config })
  }
}

/// JSON body sent for one request.
pub fn request_body(ctx: &TenantContext, request: &InferenceRequest) -> Value {
  json!({
    "tenant_id": ctx.tenant_id,
    "messages": request.history,
    "context": request.context,
  })
}

/// Interpret the service's answer.
pub fn parse_reply(status: u16, body: &str) -> Result<InferenceReply, CapabilityError> {
  if !(200..300).contains(&status) {
    return Err(CapabilityError::Status { status, body: body.to_owned() });
  }
  serde_json::from_str(body).map_err(|e| CapabilityError::InvalidResponse(e.to_string()))
}

impl Inference for HttpInference {
  async fn infer(
    &self,
    ctx: &TenantContext,
    request: InferenceRequest,
  ) -> Result<InferenceReply, CapabilityError> {
    if self.config.endpoint.is_empty() {
      return Err(CapabilityError::NotConfigured("inference endpoint".into()));
    }

    let mut req = self.client.post(&self.config.endpoint).json(&request_body(ctx, &request));
    if !self.config.api_key.is_empty() {
      req = req.bearer_auth(&self.config.api_key);
    }

    let resp = req.send().await.map_err(|e| {
      if e.is_timeout() {
        CapabilityError::Timeout(Duration::from_secs(self.config.timeout_secs))
      } else {
        CapabilityError::Transport(e.to_string())
      }
    })?;
    let status = resp.status().as_u16();
    let body = resp
      .text()
      .await
      .map_err(|e| CapabilityError::Transport(e.to_string()))?;

    tracing::debug!(tenant = %ctx.tenant_id, status, "inference responded");
    parse_reply(status, &body)
  }
}
