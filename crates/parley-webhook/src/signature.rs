//! `X-Hub-Signature-256` verification: `sha256=<hex HMAC-SHA256(app_secret, body)>`.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the body signature.
pub const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// Check a delivery's signature header against the raw request body.
///
/// An empty `app_secret` disables verification (every body is accepted). A
/// configured secret with a missing, malformed or mismatching header fails.
/// The comparison is constant-time.
pub fn verify_signature(app_secret: &str, header: Option<&str>, body: &[u8]) -> bool {
  if app_secret.is_empty() {
    return true;
  }
  let signature = header.unwrap_or("").trim();
  let signature = signature.strip_prefix("sha256=").unwrap_or(signature).trim();
  if signature.is_empty() {
    return false;
  }
  let Ok(expected) = hex::decode(signature) else {
    return false;
  };
  let Ok(mut mac) = HmacSha256::new_from_slice(app_secret.as_bytes()) else {
    return false;
  };
  mac.update(body);
  mac.verify_slice(&expected).is_ok()
}

/// Produce the header value the provider would send for `body`.
pub fn sign(app_secret: &str, body: &[u8]) -> Option<String> {
  let mut mac = HmacSha256::new_from_slice(app_secret.as_bytes()).ok()?;
  mac.update(body);
  Some(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

#[cfg(test)]
mod tests {
  use super::*;

  const BODY: &[u8] = br#"{"entry":[]}"#;

  #[test]
  fn signed_body_verifies() {
    let header = sign("s3cret", BODY).unwrap();
    assert!(header.starts_with("sha256="));
    assert!(verify_signature("s3cret", Some(&header), BODY));
  }

  #[test]
  fn bare_hex_without_prefix_is_accepted() {
    let header = sign("s3cret", BODY).unwrap();
    let bare = header.trim_start_matches("sha256=");
    assert!(verify_signature("s3cret", Some(bare), BODY));
  }

  #[test]
  fn tampered_body_or_wrong_secret_fails() {
    let header = sign("s3cret", BODY).unwrap();
    assert!(!verify_signature("s3cret", Some(&header), br#"{"entry":[{}]}"#));
    assert!(!verify_signature("other", Some(&header), BODY));
  }

  #[test]
  fn missing_or_garbage_header_fails() {
    assert!(!verify_signature("s3cret", None, BODY));
    assert!(!verify_signature("s3cret", Some("sha256=zz"), BODY));
  }

  #[test]
  fn empty_secret_disables_verification() {
    assert!(verify_signature("", None, BODY));
  }
}
