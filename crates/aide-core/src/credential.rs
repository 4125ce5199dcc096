//! Credential types — an API secret plus its rotation state.
//!
//! A credential belongs to a named service and carries the bookkeeping the
//! rotation engine needs: status, cooldown expiry, usage count, priority.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Status ──────────────────────────────────────────────────────────────────

/// Rotation state of a credential. `Invalid` is terminal: such credentials
/// are never selected and never reactivated automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
  #[default]
  Active,
  /// Excluded from selection until `cooldown_until` passes, then lazily
  /// reactivated before the next selection-affecting read.
  RateLimited,
  Invalid,
}

impl CredentialStatus {
  /// The discriminant string stored in the `status` column.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Active => "active",
      Self::RateLimited => "rate_limited",
      Self::Invalid => "invalid",
    }
  }

  pub fn parse(s: &str) -> Result<Self> {
    match s {
      "active" => Ok(Self::Active),
      "rate_limited" => Ok(Self::RateLimited),
      "invalid" => Ok(Self::Invalid),
      other => Err(Error::UnknownCredentialStatus(other.to_string())),
    }
  }
}

// ─── Display summary ─────────────────────────────────────────────────────────

/// Masked view of a credential for status listings. The secret is reduced to
/// a short prefix and suffix before it ever reaches a display path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialSummary {
  pub masked_secret:  String,
  pub status:         CredentialStatus,
  pub cooldown_until: Option<DateTime<Utc>>,
  pub usage_count:    i64,
  pub priority:       i64,
}

/// Reduce a secret to `prefix…suffix`. Secrets too short to leave anything
/// hidden are fully masked.
pub fn mask_secret(secret: &str) -> String {
  const PREFIX: usize = 8;
  const SUFFIX: usize = 4;

  let chars: Vec<char> = secret.chars().collect();
  if chars.len() <= PREFIX + SUFFIX {
    return "…".repeat(chars.len().min(3));
  }
  let head: String = chars[..PREFIX].iter().collect();
  let tail: String = chars[chars.len() - SUFFIX..].iter().collect();
  format!("{head}…{tail}")
}

// ─── Engine view ─────────────────────────────────────────────────────────────

/// Unmasked credential handed to the rotation engine. Internal use only —
/// never logged or displayed, and `Debug` redacts the secret so a stray
/// `{:?}` cannot leak it.
#[derive(Clone)]
pub struct ActiveCredential {
  pub id:       i64,
  pub secret:   String,
  pub priority: i64,
}

impl std::fmt::Debug for ActiveCredential {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ActiveCredential")
      .field("id", &self.id)
      .field("secret", &mask_secret(&self.secret))
      .field("priority", &self.priority)
      .finish()
  }
}

/// One slot of a bounded, numbered bulk import (e.g. from environment
/// variables). The slot number doubles as the imported priority.
#[derive(Debug, Clone)]
pub struct ImportSlot {
  pub slot:   i64,
  pub secret: String,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn mask_keeps_prefix_and_suffix() {
    assert_eq!(mask_secret("sk-abcdef1234567890wxyz"), "sk-abcde…wxyz");
  }

  #[test]
  fn mask_hides_short_secrets_entirely() {
    assert_eq!(mask_secret("short"), "………");
    assert_eq!(mask_secret("ab"), "……");
  }

  #[test]
  fn active_credential_debug_redacts() {
    let cred = ActiveCredential {
      id:       1,
      secret:   "sk-abcdef1234567890wxyz".into(),
      priority: 1,
    };
    let debug = format!("{cred:?}");
    assert!(!debug.contains("1234567890"), "debug output: {debug}");
  }

  #[test]
  fn status_roundtrip() {
    for status in [
      CredentialStatus::Active,
      CredentialStatus::RateLimited,
      CredentialStatus::Invalid,
    ] {
      assert_eq!(CredentialStatus::parse(status.as_str()).unwrap(), status);
    }
    assert!(CredentialStatus::parse("bogus").is_err());
  }
}
