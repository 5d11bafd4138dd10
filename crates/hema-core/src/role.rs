//! Canonical roles and the claim-aware role normalizer.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Tokens in a raw role string that indicate a facility account. Matched
/// case-insensitively: the stored strings have drifted over time
/// ("bloodBank", "bloodbank", "facility").
const FACILITY_TOKENS: &[&str] = &["facility", "bank"];

const ADMIN_TOKEN: &str = "admin";

/// One of the three canonical roles every session resolves to.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum Role {
  Donor,
  Facility,
  Admin,
}

/// Custom claims read from the identity token.
///
/// Claims are granted by external administrative tooling; this system only
/// ever reads them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
  /// The elevated-privilege flag.
  #[serde(default)]
  pub admin: bool,
  /// Any further claims attached to the token, passed through untouched.
  #[serde(flatten)]
  pub extra: BTreeMap<String, serde_json::Value>,
}

impl Claims {
  pub fn admin() -> Self {
    Self { admin: true, extra: BTreeMap::new() }
  }
}

impl Role {
  /// Map a raw profile role string and token claims to a canonical role.
  ///
  /// A claim issued by the identity provider outranks the self-reported
  /// profile field, so a user cannot grant themselves admin by editing
  /// their own profile document.
  pub fn normalize(raw: Option<&str>, claims: &Claims) -> Role {
    if claims.admin {
      return Role::Admin;
    }
    let raw = raw.map(str::to_lowercase).unwrap_or_default();
    if FACILITY_TOKENS.iter().any(|t| raw.contains(t)) {
      return Role::Facility;
    }
    if raw.contains(ADMIN_TOKEN) {
      return Role::Admin;
    }
    Role::Donor
  }
}
