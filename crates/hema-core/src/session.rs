//! The live, derived session — "who is using the application right now".
//!
//! A session is never persisted as its own record. It is recomputed by the
//! resolver whenever any of its upstream sources change, and its lifetime
//! is bounded by the identity's validity and explicit cancellation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  facility::Facility,
  profile::Profile,
  role::{Claims, Role},
};

/// The authenticated identity as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthIdentity {
  pub subject_id: Uuid,
  pub email:      String,
}

/// A composed, role-qualified session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
  pub identity: AuthIdentity,
  pub role:     Role,
  pub claims:   Claims,
  /// Absent during the short registration race where the identity exists
  /// before the profile write lands. Callers needing a complete profile
  /// must check explicitly.
  pub profile:  Option<Profile>,
  /// Present only for facility sessions; kept live by the resolver.
  pub facility: Option<Facility>,
}

impl Session {
  /// Facility fields take precedence over the base profile on collision.
  pub fn display_name(&self) -> Option<&str> {
    self
      .facility
      .as_ref()
      .map(|f| f.name.as_str())
      .or_else(|| self.profile.as_ref().map(|p| p.display_name.as_str()))
  }
}

/// What a consumer observes from the session resolver.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionState {
  /// Resolution in flight; nothing is known yet.
  #[default]
  Resolving,
  SignedOut,
  SignedIn(Session),
}

impl SessionState {
  pub fn session(&self) -> Option<&Session> {
    match self {
      SessionState::SignedIn(s) => Some(s),
      _ => None,
    }
  }

  pub fn is_signed_in(&self) -> bool {
    matches!(self, SessionState::SignedIn(_))
  }
}
