//! Facility record and the pure core of the approval state machine.
//!
//! The stored source of truth for approval is the single `status` enum;
//! the boolean view is derived at the edge ([`Facility::approved`]).
//! Transitions are expressed as an [`ApprovalChange`], applied to the
//! record as one single-record update by the storage backend.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::blood::BloodGroup;

// ─── Approval ────────────────────────────────────────────────────────────────

/// A facility account's standing with the platform.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ApprovalStatus {
  #[default]
  Pending,
  Approved,
  Rejected,
}

/// An admin's verdict on a facility account. `approved` and `rejected` are
/// reversible into each other; the machine is not terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApprovalDecision {
  Approved,
  Rejected,
}

/// The field update produced by one approval transition.
///
/// Entering a state clears the timestamp of the opposite prior state:
/// stale opposite-state timestamps read as a re-rejection (or
/// re-approval) in downstream activity feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApprovalChange {
  pub status:      ApprovalStatus,
  pub approved_at: Option<DateTime<Utc>>,
  pub rejected_at: Option<DateTime<Utc>>,
}

impl ApprovalChange {
  pub fn new(decision: ApprovalDecision, at: DateTime<Utc>) -> Self {
    match decision {
      ApprovalDecision::Approved => Self {
        status:      ApprovalStatus::Approved,
        approved_at: Some(at),
        rejected_at: None,
      },
      ApprovalDecision::Rejected => Self {
        status:      ApprovalStatus::Rejected,
        approved_at: None,
        rejected_at: Some(at),
      },
    }
  }

  pub fn apply(&self, facility: &mut Facility) {
    facility.status = self.status;
    facility.approved_at = self.approved_at;
    facility.rejected_at = self.rejected_at;
  }
}

// ─── Facility ────────────────────────────────────────────────────────────────

/// Keyed by the same subject identifier as its owning profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facility {
  pub subject_id:     Uuid,
  pub name:           String,
  pub license_no:     String,
  pub contact_phone:  Option<String>,
  pub address:        Option<String>,
  /// Price charged per blood unit, in currency minor units.
  pub price_per_unit: i64,
  pub status:         ApprovalStatus,
  pub approved_at:    Option<DateTime<Utc>>,
  pub rejected_at:    Option<DateTime<Utc>>,
  /// Stocked units per blood group.
  pub inventory:      BTreeMap<BloodGroup, u32>,
  pub created_at:     DateTime<Utc>,
}

impl Facility {
  /// Derived boolean view over [`Facility::status`]; nothing stores this.
  pub fn approved(&self) -> bool {
    self.status == ApprovalStatus::Approved
  }
}

/// Input to facility registration.
#[derive(Debug, Clone, Deserialize)]
pub struct NewFacility {
  pub name:           String,
  pub license_no:     String,
  pub contact_phone:  Option<String>,
  pub address:        Option<String>,
  pub price_per_unit: i64,
}

impl NewFacility {
  /// New facilities always start out pending review.
  pub fn into_facility(self, subject_id: Uuid, at: DateTime<Utc>) -> Facility {
    Facility {
      subject_id,
      name: self.name,
      license_no: self.license_no,
      contact_phone: self.contact_phone,
      address: self.address,
      price_per_unit: self.price_per_unit,
      status: ApprovalStatus::Pending,
      approved_at: None,
      rejected_at: None,
      inventory: BTreeMap::new(),
      created_at: at,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn facility() -> Facility {
    NewFacility {
      name:           "Central Blood Bank".into(),
      license_no:     "LIC-100".into(),
      contact_phone:  None,
      address:        None,
      price_per_unit: 5000,
    }
    .into_facility(Uuid::new_v4(), Utc::now())
  }

  #[test]
  fn approving_sets_status_and_clears_rejection() {
    let mut f = facility();
    let earlier = Utc::now();
    ApprovalChange::new(ApprovalDecision::Rejected, earlier).apply(&mut f);

    let now = Utc::now();
    ApprovalChange::new(ApprovalDecision::Approved, now).apply(&mut f);

    assert_eq!(f.status, ApprovalStatus::Approved);
    assert!(f.approved());
    assert_eq!(f.approved_at, Some(now));
    assert_eq!(f.rejected_at, None);
  }

  #[test]
  fn rejecting_sets_status_and_clears_approval() {
    let mut f = facility();
    ApprovalChange::new(ApprovalDecision::Approved, Utc::now()).apply(&mut f);

    let now = Utc::now();
    ApprovalChange::new(ApprovalDecision::Rejected, now).apply(&mut f);

    assert_eq!(f.status, ApprovalStatus::Rejected);
    assert!(!f.approved());
    assert_eq!(f.rejected_at, Some(now));
    assert_eq!(f.approved_at, None);
  }

  #[test]
  fn same_transition_twice_is_idempotent() {
    let mut a = facility();
    let mut b = facility();
    b.subject_id = a.subject_id;

    let at = Utc::now();
    let change = ApprovalChange::new(ApprovalDecision::Approved, at);
    change.apply(&mut a);
    change.apply(&mut a);
    change.apply(&mut b);

    assert_eq!(a.status, b.status);
    assert_eq!(a.approved_at, b.approved_at);
    assert_eq!(a.rejected_at, b.rejected_at);
  }
}
