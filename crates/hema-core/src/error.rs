//! Error types for `hema-core`.

use chrono::NaiveDate;
use thiserror::Error;
use uuid::Uuid;

use crate::{blood::BloodGroup, eligibility::ELIGIBILITY_WINDOW_DAYS, role::Role};

/// The record collection a lookup failure refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum RecordKind {
  Profile,
  Facility,
  Request,
  Donation,
  Ledger,
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("{kind} record not found: {id}")]
  NotFound { kind: RecordKind, id: Uuid },

  /// Signing in under the wrong role tab.
  #[error("account is registered as {actual}, not {expected}")]
  RoleMismatch { expected: Role, actual: Role },

  /// A fulfillment was attempted against a record that is no longer
  /// pending. Completing twice would double-count revenue.
  #[error("{kind} {id} is not pending")]
  NotPending { kind: RecordKind, id: Uuid },

  #[error(
    "donor is inside the {ELIGIBILITY_WINDOW_DAYS}-day window; next eligible on {next_eligible}"
  )]
  DonationWindow { next_eligible: NaiveDate },

  /// An unapproved facility cannot take requests or donations.
  #[error("facility {id} is not approved")]
  FacilityNotApproved { id: Uuid },

  #[error("facility has {available} unit(s) of {group}, {requested} requested")]
  InsufficientStock {
    group:     BloodGroup,
    available: u32,
    requested: u32,
  },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
