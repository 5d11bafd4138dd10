//! Request and donation work items.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::blood::BloodGroup;

/// Shared status for requests and donations. A work item is mutated only
/// by the owning facility (status transitions) after creation.
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
pub enum FulfillmentStatus {
  #[default]
  Pending,
  Completed,
  Rejected,
}

// ─── Request ─────────────────────────────────────────────────────────────────

/// A fulfillment ask against a facility's inventory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
  pub request_id:   Uuid,
  pub facility_id:  Uuid,
  pub requester_id: Uuid,
  pub blood_group:  BloodGroup,
  pub units:        u32,
  /// Computed at creation from the facility's per-unit price; minor units.
  pub total_cost:   i64,
  pub status:       FulfillmentStatus,
  pub created_at:   DateTime<Utc>,
  pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewRequest {
  pub facility_id: Uuid,
  pub blood_group: BloodGroup,
  pub units:       u32,
}

// ─── Donation ────────────────────────────────────────────────────────────────

/// A scheduled donation. Doubles as a facility work item and as the
/// historical basis for eligibility computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Donation {
  pub donation_id:    Uuid,
  pub donor_id:       Uuid,
  pub facility_id:    Uuid,
  pub blood_group:    BloodGroup,
  pub preferred_date: NaiveDate,
  pub status:         FulfillmentStatus,
  pub created_at:     DateTime<Utc>,
  pub completed_at:   Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewDonation {
  pub facility_id:    Uuid,
  pub blood_group:    BloodGroup,
  pub preferred_date: NaiveDate,
}
