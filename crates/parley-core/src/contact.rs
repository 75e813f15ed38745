//! Contact: the durable record of one external-channel identity.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// A sender known to a tenant, keyed by its canonical address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
  pub contact_id:      Uuid,
  pub tenant_id:       String,
  /// Digits-only canonical address; unique per tenant.
  pub address:         String,
  pub display_name:    String,
  pub tags:            Vec<String>,
  /// Whether the address is believed reachable. Inbound delivery proves it.
  pub is_valid:        bool,
  pub created_at:      DateTime<Utc>,
  pub last_message_at: DateTime<Utc>,
}

/// Input to [`EngagementStore::upsert_contact`](crate::store::EngagementStore::upsert_contact).
#[derive(Debug, Clone)]
pub struct NewContact {
  /// Must already be canonical; see [`normalize_address`].
  pub address:      String,
  /// Used on creation, and to fill an empty name on an existing contact.
  pub display_name: String,
  /// Only applied on creation.
  pub tags:         Vec<String>,
  pub seen_at:      DateTime<Utc>,
}

/// Canonicalise an external address by keeping only its ASCII digits.
///
/// `"+55 (11) 99999-0000"` and `"5511999990000"` both become
/// `"5511999990000"`. An address with no digits at all is rejected.
pub fn normalize_address(raw: &str) -> Result<String> {
  let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
  if digits.is_empty() {
    return Err(Error::EmptyAddress(raw.to_owned()));
  }
  Ok(digits)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn strips_formatting() {
    assert_eq!(normalize_address("+55 (11) 99999-0000").unwrap(), "5511999990000");
    assert_eq!(normalize_address("5511999990000").unwrap(), "5511999990000");
  }

  #[test]
  fn rejects_addresses_without_digits() {
    assert!(matches!(normalize_address("whatsapp:"), Err(Error::EmptyAddress(_))));
    assert!(normalize_address("").is_err());
  }

  #[test]
  fn ignores_non_ascii_digits() {
    // Arabic-Indic digits are not part of the canonical form.
    assert_eq!(normalize_address("٣12").unwrap(), "12");
  }
}
