//! The access gate — role- and approval-gated view decisions.
//!
//! [`decide`] is a pure, total function over the session state and a
//! policy. It is consulted on *every* session emission, not once at view
//! mount: a facility whose approval is revoked mid-session loses access on
//! the very next emission.

use serde::{Deserialize, Serialize};

use crate::{
  facility::ApprovalStatus,
  role::Role,
  session::SessionState,
};

/// Where a denied consumer is sent.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Target {
  Login,
  Home,
  AccessRevoked,
}

/// The gate's verdict.
///
/// `Wait` is the typed rendering of "allow, but render nothing" while
/// resolution is in flight — it never grants access to protected data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
  Allow,
  Wait,
  Redirect(Target),
}

/// What a protected view requires.
#[derive(Debug, Clone, Default)]
pub struct Policy {
  /// Roles allowed through, or `None` for any signed-in session.
  pub roles:            Option<Vec<Role>>,
  /// Additionally require the facility's account to be approved.
  pub require_approval: bool,
}

impl Policy {
  /// Any signed-in session.
  pub fn signed_in() -> Self {
    Self::default()
  }

  pub fn role(role: Role) -> Self {
    Self { roles: Some(vec![role]), require_approval: false }
  }

  /// The standard policy for facility-only views.
  pub fn approved_facility() -> Self {
    Self { roles: Some(vec![Role::Facility]), require_approval: true }
  }
}

pub fn decide(state: &SessionState, policy: &Policy) -> Decision {
  let session = match state {
    SessionState::Resolving => return Decision::Wait,
    SessionState::SignedOut => return Decision::Redirect(Target::Login),
    SessionState::SignedIn(session) => session,
  };

  if let Some(roles) = &policy.roles
    && !roles.contains(&session.role)
  {
    return Decision::Redirect(Target::Home);
  }

  // The approval check applies to facility sessions only.
  if policy.require_approval && session.role == Role::Facility {
    return match session.facility.as_ref().map(|f| f.status) {
      Some(ApprovalStatus::Rejected) => {
        Decision::Redirect(Target::AccessRevoked)
      }
      Some(ApprovalStatus::Approved) => Decision::Allow,
      // Pending, or the facility record has not landed yet.
      _ => Decision::Redirect(Target::Home),
    };
  }

  Decision::Allow
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use uuid::Uuid;

  use super::*;
  use crate::{
    facility::{ApprovalChange, ApprovalDecision, NewFacility},
    role::Claims,
    session::{AuthIdentity, Session},
  };

  fn session(role: Role, status: Option<ApprovalStatus>) -> SessionState {
    let id = Uuid::new_v4();
    let facility = status.map(|status| {
      let mut f = NewFacility {
        name:           "Gate Test Bank".into(),
        license_no:     "LIC-1".into(),
        contact_phone:  None,
        address:        None,
        price_per_unit: 1000,
      }
      .into_facility(id, Utc::now());
      match status {
        ApprovalStatus::Pending => {}
        ApprovalStatus::Approved => {
          ApprovalChange::new(ApprovalDecision::Approved, Utc::now())
            .apply(&mut f)
        }
        ApprovalStatus::Rejected => {
          ApprovalChange::new(ApprovalDecision::Rejected, Utc::now())
            .apply(&mut f)
        }
      }
      f
    });
    SessionState::SignedIn(Session {
      identity: AuthIdentity { subject_id: id, email: "gate@example.com".into() },
      role,
      claims: Claims::default(),
      profile: None,
      facility,
    })
  }

  #[test]
  fn resolving_waits() {
    assert_eq!(
      decide(&SessionState::Resolving, &Policy::signed_in()),
      Decision::Wait
    );
  }

  #[test]
  fn signed_out_redirects_to_login() {
    assert_eq!(
      decide(&SessionState::SignedOut, &Policy::signed_in()),
      Decision::Redirect(Target::Login)
    );
  }

  #[test]
  fn wrong_role_redirects_home() {
    let state = session(Role::Donor, None);
    assert_eq!(
      decide(&state, &Policy::role(Role::Admin)),
      Decision::Redirect(Target::Home)
    );
  }

  #[test]
  fn matching_role_allows() {
    let state = session(Role::Admin, None);
    assert_eq!(decide(&state, &Policy::role(Role::Admin)), Decision::Allow);
  }

  #[test]
  fn pending_facility_never_allowed_through_approval_gate() {
    let state = session(Role::Facility, Some(ApprovalStatus::Pending));
    assert_eq!(
      decide(&state, &Policy::approved_facility()),
      Decision::Redirect(Target::Home)
    );
  }

  #[test]
  fn missing_facility_record_is_not_allowed_through_approval_gate() {
    let state = session(Role::Facility, None);
    assert_eq!(
      decide(&state, &Policy::approved_facility()),
      Decision::Redirect(Target::Home)
    );
  }

  #[test]
  fn rejected_facility_redirects_to_access_revoked() {
    let state = session(Role::Facility, Some(ApprovalStatus::Rejected));
    assert_eq!(
      decide(&state, &Policy::approved_facility()),
      Decision::Redirect(Target::AccessRevoked)
    );
  }

  #[test]
  fn approved_facility_allowed() {
    let state = session(Role::Facility, Some(ApprovalStatus::Approved));
    assert_eq!(
      decide(&state, &Policy::approved_facility()),
      Decision::Allow
    );
  }
}
