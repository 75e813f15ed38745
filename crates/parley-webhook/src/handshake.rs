//! Subscription handshake (`GET` with `hub.*` query parameters).

use serde::Deserialize;

/// Query string of a subscription verification request.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct SubscriptionQuery {
  #[serde(rename = "hub.mode")]
  pub mode:         Option<String>,
  #[serde(rename = "hub.verify_token")]
  pub verify_token: Option<String>,
  #[serde(rename = "hub.challenge")]
  pub challenge:    Option<String>,
}

/// Return the challenge to echo back when the request is a valid
/// subscription for a channel whose verify token is `expected_token`.
pub fn verify_subscription<'a>(query: &'a SubscriptionQuery, expected_token: &str) -> Option<&'a str> {
  let challenge = query.challenge.as_deref().filter(|c| !c.is_empty())?;
  let subscribing = query.mode.as_deref() == Some("subscribe");
  let token_ok =
    !expected_token.is_empty() && query.verify_token.as_deref() == Some(expected_token);
  (subscribing && token_ok).then_some(challenge)
}
