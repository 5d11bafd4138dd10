//! Encoding and decoding helpers between Rust domain types and the
//! plain-text representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings, calendar dates as ISO
//! dates, enums as their display tokens, UUIDs as hyphenated lowercase
//! strings.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use hema_core::{
  blood::BloodGroup,
  facility::{ApprovalStatus, Facility},
  ledger::{RevenueLedger, Transaction},
  profile::Profile,
  request::{Donation, FulfillmentStatus, Request},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String {
  id.hyphenated().to_string()
}

pub fn decode_uuid(s: &str) -> Result<Uuid> {
  Ok(Uuid::parse_str(s)?)
}

// ─── Timestamps and dates ────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339()
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn decode_dt_opt(s: Option<&str>) -> Result<Option<DateTime<Utc>>> {
  s.map(decode_dt).transpose()
}

pub fn encode_date(d: NaiveDate) -> String {
  d.to_string()
}

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  s.parse().map_err(|_| Error::DateParse(s.to_string()))
}

// ─── Enum tokens ─────────────────────────────────────────────────────────────

pub fn decode_approval_status(s: &str) -> Result<ApprovalStatus> {
  s.parse().map_err(|_| Error::UnknownToken {
    field: "status",
    token: s.to_string(),
  })
}

pub fn decode_fulfillment_status(s: &str) -> Result<FulfillmentStatus> {
  s.parse().map_err(|_| Error::UnknownToken {
    field: "status",
    token: s.to_string(),
  })
}

pub fn decode_blood_group(s: &str) -> Result<BloodGroup> {
  s.parse().map_err(|_| Error::UnknownToken {
    field: "blood_group",
    token: s.to_string(),
  })
}

// ─── Raw row types ───────────────────────────────────────────────────────────
//
// Mirrors of the SQLite rows; decoding into domain types happens outside
// the connection callback so `rusqlite::Error` stays inside it.

pub struct RawProfile {
  pub subject_id:   String,
  pub display_name: String,
  pub email:        String,
  pub phone:        Option<String>,
  pub raw_role:     Option<String>,
  pub created_at:   String,
}

impl RawProfile {
  pub fn into_profile(self) -> Result<Profile> {
    Ok(Profile {
      subject_id:   decode_uuid(&self.subject_id)?,
      display_name: self.display_name,
      email:        self.email,
      phone:        self.phone,
      raw_role:     self.raw_role,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

pub struct RawFacility {
  pub subject_id:     String,
  pub name:           String,
  pub license_no:     String,
  pub contact_phone:  Option<String>,
  pub address:        Option<String>,
  pub price_per_unit: i64,
  pub status:         String,
  pub approved_at:    Option<String>,
  pub rejected_at:    Option<String>,
  pub created_at:     String,
}

impl RawFacility {
  /// `inventory` rows are loaded separately and joined here.
  pub fn into_facility(
    self,
    inventory: Vec<(String, u32)>,
  ) -> Result<Facility> {
    let mut stocked = BTreeMap::new();
    for (group, units) in inventory {
      stocked.insert(decode_blood_group(&group)?, units);
    }
    Ok(Facility {
      subject_id:     decode_uuid(&self.subject_id)?,
      name:           self.name,
      license_no:     self.license_no,
      contact_phone:  self.contact_phone,
      address:        self.address,
      price_per_unit: self.price_per_unit,
      status:         decode_approval_status(&self.status)?,
      approved_at:    decode_dt_opt(self.approved_at.as_deref())?,
      rejected_at:    decode_dt_opt(self.rejected_at.as_deref())?,
      inventory:      stocked,
      created_at:     decode_dt(&self.created_at)?,
    })
  }
}

pub struct RawRequest {
  pub request_id:   String,
  pub facility_id:  String,
  pub requester_id: String,
  pub blood_group:  String,
  pub units:        u32,
  pub total_cost:   i64,
  pub status:       String,
  pub created_at:   String,
  pub completed_at: Option<String>,
}

impl RawRequest {
  pub fn into_request(self) -> Result<Request> {
    Ok(Request {
      request_id:   decode_uuid(&self.request_id)?,
      facility_id:  decode_uuid(&self.facility_id)?,
      requester_id: decode_uuid(&self.requester_id)?,
      blood_group:  decode_blood_group(&self.blood_group)?,
      units:        self.units,
      total_cost:   self.total_cost,
      status:       decode_fulfillment_status(&self.status)?,
      created_at:   decode_dt(&self.created_at)?,
      completed_at: decode_dt_opt(self.completed_at.as_deref())?,
    })
  }
}

pub struct RawDonation {
  pub donation_id:    String,
  pub donor_id:       String,
  pub facility_id:    String,
  pub blood_group:    String,
  pub preferred_date: String,
  pub status:         String,
  pub created_at:     String,
  pub completed_at:   Option<String>,
}

impl RawDonation {
  pub fn into_donation(self) -> Result<Donation> {
    Ok(Donation {
      donation_id:    decode_uuid(&self.donation_id)?,
      donor_id:       decode_uuid(&self.donor_id)?,
      facility_id:    decode_uuid(&self.facility_id)?,
      blood_group:    decode_blood_group(&self.blood_group)?,
      preferred_date: decode_date(&self.preferred_date)?,
      status:         decode_fulfillment_status(&self.status)?,
      created_at:     decode_dt(&self.created_at)?,
      completed_at:   decode_dt_opt(self.completed_at.as_deref())?,
    })
  }
}

pub struct RawLedger {
  pub facility_id:            String,
  pub total_revenue:          i64,
  pub monthly_revenue:        i64,
  pub weekly_revenue:         i64,
  pub completed_transactions: i64,
  pub updated_at:             String,
}

impl RawLedger {
  pub fn into_ledger(self) -> Result<RevenueLedger> {
    Ok(RevenueLedger {
      facility_id:            decode_uuid(&self.facility_id)?,
      total_revenue:          self.total_revenue,
      monthly_revenue:        self.monthly_revenue,
      weekly_revenue:         self.weekly_revenue,
      completed_transactions: self.completed_transactions,
      updated_at:             decode_dt(&self.updated_at)?,
    })
  }
}

pub struct RawTransaction {
  pub transaction_id: String,
  pub facility_id:    String,
  pub request_id:     String,
  pub blood_group:    String,
  pub amount:         i64,
  pub recorded_at:    String,
}

impl RawTransaction {
  pub fn into_transaction(self) -> Result<Transaction> {
    Ok(Transaction {
      transaction_id: decode_uuid(&self.transaction_id)?,
      facility_id:    decode_uuid(&self.facility_id)?,
      request_id:     decode_uuid(&self.request_id)?,
      blood_group:    decode_blood_group(&self.blood_group)?,
      amount:         self.amount,
      recorded_at:    decode_dt(&self.recorded_at)?,
    })
  }
}
