//! Cloud API envelope → normalized events.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parley_core::{
  event::{InboundEvent, StatusEvent},
  message::{ContentKind, DeliveryStatus},
};
use serde::Deserialize;

use crate::{Result, WebhookBatch};

// ─── Envelope ────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct Envelope {
  #[serde(default)]
  entry: Vec<Entry>,
}

#[derive(Debug, Default, Deserialize)]
struct Entry {
  #[serde(default)]
  changes: Vec<Change>,
}

#[derive(Debug, Default, Deserialize)]
struct Change {
  #[serde(default)]
  value: ChangeValue,
}

#[derive(Debug, Default, Deserialize)]
struct ChangeValue {
  metadata: Option<Metadata>,
  #[serde(default)]
  contacts: Vec<ProfileContact>,
  #[serde(default)]
  messages: Vec<WireMessage>,
  #[serde(default)]
  statuses: Vec<WireStatus>,
}

#[derive(Debug, Default, Deserialize)]
struct Metadata {
  phone_number_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProfileContact {
  #[serde(default)]
  wa_id:   String,
  profile: Option<Profile>,
}

#[derive(Debug, Default, Deserialize)]
struct Profile {
  name: Option<String>,
}

// ─── Messages ────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct WireMessage {
  #[serde(default)]
  from:        String,
  #[serde(default)]
  id:          String,
  timestamp:   Option<String>,
  #[serde(rename = "type", default)]
  kind:        String,
  text:        Option<TextBody>,
  image:       Option<Media>,
  video:       Option<Media>,
  document:    Option<Media>,
  button:      Option<Button>,
  interactive: Option<Interactive>,
  location:    Option<Location>,
}

#[derive(Debug, Default, Deserialize)]
struct TextBody {
  body: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Media {
  caption:  Option<String>,
  filename: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Button {
  text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Interactive {
  button_reply: Option<Reply>,
  list_reply:   Option<Reply>,
}

#[derive(Debug, Default, Deserialize)]
struct Reply {
  title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Location {
  latitude:  Option<f64>,
  longitude: Option<f64>,
  name:      Option<String>,
  address:   Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WireStatus {
  #[serde(default)]
  id:        String,
  #[serde(default)]
  status:    String,
  timestamp: Option<String>,
}

// ─── Extraction ──────────────────────────────────────────────────────────────

fn trimmed(s: Option<&String>) -> Option<String> {
  s.map(|s| s.trim()).filter(|s| !s.is_empty()).map(str::to_owned)
}

impl WireMessage {
  /// Best textual rendition of the message for storage and matching.
  fn text(&self) -> String {
    let text = match self.kind.as_str() {
      "text" => self.text.as_ref().and_then(|t| trimmed(t.body.as_ref())),
      "button" => self.button.as_ref().and_then(|b| trimmed(b.text.as_ref())),
      "interactive" => self.interactive.as_ref().and_then(|i| {
        i.button_reply
          .as_ref()
          .and_then(|r| trimmed(r.title.as_ref()))
          .or_else(|| i.list_reply.as_ref().and_then(|r| trimmed(r.title.as_ref())))
      }),
      "image" => self.image.as_ref().and_then(|m| trimmed(m.caption.as_ref())),
      "video" => self.video.as_ref().and_then(|m| trimmed(m.caption.as_ref())),
      "document" => self
        .document
        .as_ref()
        .and_then(|m| trimmed(m.caption.as_ref()).or_else(|| trimmed(m.filename.as_ref()))),
      "location" => self.location.as_ref().map(Location::describe),
      _ => None,
    };
    text.unwrap_or_default()
  }
}

impl Location {
  fn describe(&self) -> String {
    let label = [trimmed(self.name.as_ref()), trimmed(self.address.as_ref())]
      .into_iter()
      .flatten()
      .collect::<Vec<_>>()
      .join(", ");
    match (self.latitude, self.longitude) {
      (Some(lat), Some(lng)) if label.is_empty() => format!("{lat},{lng}"),
      (Some(lat), Some(lng)) => format!("{label} ({lat},{lng})"),
      _ => label,
    }
  }
}

fn parse_unix(ts: Option<&str>, fallback: DateTime<Utc>) -> DateTime<Utc> {
  ts.and_then(|s| s.trim().parse::<i64>().ok())
    .and_then(|secs| DateTime::from_timestamp(secs, 0))
    .unwrap_or(fallback)
}

fn digits(s: &str) -> String { s.chars().filter(char::is_ascii_digit).collect() }

fn provider_status(s: &str) -> Option<DeliveryStatus> {
  match s {
    "sent" => Some(DeliveryStatus::Sent),
    "delivered" => Some(DeliveryStatus::Delivered),
    "read" => Some(DeliveryStatus::Read),
    "failed" => Some(DeliveryStatus::Failed),
    _ => None,
  }
}

// ─── Entry point ─────────────────────────────────────────────────────────────

pub fn parse_batch(
  body: &[u8],
  phone_number_id: Option<&str>,
  now: DateTime<Utc>,
) -> Result<WebhookBatch> {
  let envelope: Envelope = serde_json::from_slice(body)?;
  let mut batch = WebhookBatch::default();

  for change in envelope.entry.into_iter().flat_map(|e| e.changes) {
    let value = change.value;

    let addressed_to = value.metadata.as_ref().and_then(|m| m.phone_number_id.as_deref());
    if let (Some(expected), Some(actual)) = (phone_number_id, addressed_to)
      && !expected.is_empty()
      && !actual.is_empty()
      && expected != actual
    {
      continue;
    }

    let names: HashMap<String, String> = value
      .contacts
      .iter()
      .filter_map(|c| {
        let name = trimmed(c.profile.as_ref().and_then(|p| p.name.as_ref()))?;
        Some((digits(&c.wa_id), name))
      })
      .collect();

    for message in &value.messages {
      if message.from.trim().is_empty() || message.id.trim().is_empty() {
        continue;
      }
      batch.inbound.push(InboundEvent {
        external_address:    message.from.clone(),
        sender_display_name: names.get(&digits(&message.from)).cloned().unwrap_or_default(),
        external_message_id: message.id.clone(),
        content_kind:        ContentKind::from_provider(&message.kind),
        text:                message.text(),
        received_at:         parse_unix(message.timestamp.as_deref(), now),
      });
    }

    for status in &value.statuses {
      let Some(mapped) = provider_status(&status.status) else {
        continue;
      };
      if status.id.is_empty() {
        continue;
      }
      batch.statuses.push(StatusEvent {
        external_message_id: status.id.clone(),
        status:              mapped,
        timestamp:           parse_unix(status.timestamp.as_deref(), now),
      });
    }
  }

  Ok(batch)
}
