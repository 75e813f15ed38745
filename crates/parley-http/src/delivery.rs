//! Outbound delivery through the WhatsApp Cloud API.

use std::{collections::HashMap, sync::Arc, time::Duration};

use anyhow::{Context, Result};
use parley_core::{
  capability::{CapabilityError, Delivery, DeliveryReceipt, OutboundBody},
  tenant::TenantContext,
};
use reqwest::Client;
use serde_json::{Value, json};

/// Sending identity of one channel.
#[derive(Debug, Clone)]
pub struct ChannelCredentials {
  pub phone_number_id: String,
  pub access_token:    String,
}

#[derive(Clone)]
pub struct CloudApiDelivery {
  client:     Client,
  graph_base: String,
  /// Keyed by channel id.
  channels:   Arc<HashMap<String, ChannelCredentials>>,
}

impl CloudApiDelivery {
  pub fn new(
    graph_base: impl Into<String>,
    channels: HashMap<String, ChannelCredentials>,
    timeout: Duration,
  ) -> Result<Self> {
    let client = Client::builder()
      .timeout(timeout)
      .build()
      .context("failed to build delivery HTTP client")?;
    Ok(Self {
      client,
      graph_base: graph_base.into(),
      channels: Arc::new(channels),
    })
  }

  fn url(&self, phone_number_id: &str) -> String {
    format!("{}/{}/messages", self.graph_base.trim_end_matches('/'), phone_number_id)
  }
}

/// Cloud API request body for a send.
pub fn send_payload(to: &str, body: &OutboundBody) -> Value {
  let mut payload = json!({
    "messaging_product": "whatsapp",
    "recipient_type": "individual",
    "to": to,
  });
  match body {
    OutboundBody::Text(text) => {
      payload["type"] = json!("text");
      payload["text"] = json!({ "preview_url": false, "body": text });
    }
    OutboundBody::Template { name, language } => {
      payload["type"] = json!("template");
      payload["template"] = json!({ "name": name, "language": { "code": language } });
    }
  }
  payload
}

/// Interpret the Cloud API's answer. Any non-2xx is a rejection.
pub fn parse_send_response(status: u16, body: &str) -> DeliveryReceipt {
  let parsed: Value = serde_json::from_str(body).unwrap_or(Value::Null);
  if (200..300).contains(&status) {
    let provider_message_id = parsed["messages"][0]["id"].as_str().map(str::to_owned);
    return DeliveryReceipt::Accepted { provider_message_id };
  }
  let detail = parsed["error"]["message"]
    .as_str()
    .map(str::to_owned)
    .unwrap_or_else(|| body.chars().take(200).collect());
  DeliveryReceipt::Rejected { reason: format!("{status}: {detail}") }
}

impl Delivery for CloudApiDelivery {
  async fn send(
    &self,
    ctx: &TenantContext,
    to: &str,
    body: OutboundBody,
  ) -> Result<DeliveryReceipt, CapabilityError> {
    let creds = self
      .channels
      .get(&ctx.channel_id)
      .filter(|c| !c.phone_number_id.is_empty() && !c.access_token.is_empty())
      .ok_or_else(|| CapabilityError::NotConfigured(format!("channel {}", ctx.channel_id)))?;

    let resp = self
      .client
      .post(self.url(&creds.phone_number_id))
      .bearer_auth(&creds.access_token)
      .json(&send_payload(to, &body))
      .send()
      .await
      .map_err(|e| CapabilityError::Transport(e.to_string()))?;
    let status = resp.status().as_u16();
    let text = resp.text().await.unwrap_or_default();

    let receipt = parse_send_response(status, &text);
    if let DeliveryReceipt::Rejected { reason } = &receipt {
      tracing::warn!(channel = %ctx.channel_id, "cloud api rejected send: {reason}");
    }
    Ok(receipt)
  }
}
