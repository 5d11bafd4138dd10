//! Profile record — display fields plus the raw, self-reported role string.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Keyed by the identity provider's subject identifier. Created once at
/// registration; never deleted except by the registration rollback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
  pub subject_id:   Uuid,
  pub display_name: String,
  pub email:        String,
  pub phone:        Option<String>,
  /// As written at registration. Never trusted directly — see
  /// [`Role::normalize`](crate::role::Role::normalize).
  pub raw_role:     Option<String>,
  pub created_at:   DateTime<Utc>,
}

/// Input to registration; the subject id comes from account creation.
#[derive(Debug, Clone, Deserialize)]
pub struct NewProfile {
  pub display_name: String,
  pub email:        String,
  pub phone:        Option<String>,
  pub raw_role:     Option<String>,
}

impl NewProfile {
  pub fn into_profile(self, subject_id: Uuid, at: DateTime<Utc>) -> Profile {
    Profile {
      subject_id,
      display_name: self.display_name,
      email: self.email,
      phone: self.phone,
      raw_role: self.raw_role,
      created_at: at,
    }
  }
}
