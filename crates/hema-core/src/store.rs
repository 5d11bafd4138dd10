//! The `MarketStore` trait and supporting types.
//!
//! The trait is implemented by storage backends (e.g. `hema-store-sqlite`).
//! The workflows in `hema-engine` depend on this abstraction, not on any
//! concrete backend. Record shapes are validated at this boundary — no
//! loosely-merged field maps flow through.

use std::future::Future;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  blood::BloodGroup,
  facility::{ApprovalChange, Facility},
  ledger::{NewTransaction, RevenueLedger, Transaction},
  profile::Profile,
  request::{Donation, Request},
  watch::RecordWatch,
};

/// Abstraction over the marketplace document store.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (tokio with `axum`). Reads of a single
/// record return `Option`; absence is not an error at this layer.
pub trait MarketStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Profiles ──────────────────────────────────────────────────────────

  fn get_profile(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Profile>, Self::Error>> + Send + '_;

  /// Create or fully replace a profile record.
  fn put_profile<'a>(
    &'a self,
    profile: &'a Profile,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Used only by the registration rollback; deleting an absent profile
  /// is not an error.
  fn delete_profile(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  // ── Facilities ────────────────────────────────────────────────────────

  fn get_facility(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Facility>, Self::Error>> + Send + '_;

  fn put_facility<'a>(
    &'a self,
    facility: &'a Facility,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn delete_facility(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn list_facilities(
    &self,
    only_approved: bool,
  ) -> impl Future<Output = Result<Vec<Facility>, Self::Error>> + Send + '_;

  /// Apply an approval transition as one single-record update and notify
  /// watchers. Returns the updated record, or `None` if the facility does
  /// not exist.
  fn update_facility_approval(
    &self,
    id: Uuid,
    change: ApprovalChange,
  ) -> impl Future<Output = Result<Option<Facility>, Self::Error>> + Send + '_;

  /// Replace the stocked units for one blood group and notify watchers.
  fn set_inventory(
    &self,
    facility_id: Uuid,
    group: BloodGroup,
    units: u32,
  ) -> impl Future<Output = Result<Option<Facility>, Self::Error>> + Send + '_;

  /// Open a live watch on a facility record. The receiver is seeded with
  /// the current value and updated on every facility write. The guard must
  /// be cancelled (or dropped) to release the backend registration;
  /// backends keep an accurate live-watcher count.
  fn watch_facility(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<RecordWatch<Facility>, Self::Error>> + Send + '_;

  // ── Requests ──────────────────────────────────────────────────────────

  fn get_request(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Request>, Self::Error>> + Send + '_;

  fn put_request<'a>(
    &'a self,
    request: &'a Request,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  fn requests_for_facility(
    &self,
    facility_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Request>, Self::Error>> + Send + '_;

  // ── Donations ─────────────────────────────────────────────────────────

  fn get_donation(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Option<Donation>, Self::Error>> + Send + '_;

  fn put_donation<'a>(
    &'a self,
    donation: &'a Donation,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// The donor's full donation history, the basis for eligibility.
  fn donations_for_donor(
    &self,
    donor_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Donation>, Self::Error>> + Send + '_;

  // ── Ledger and transactions ───────────────────────────────────────────

  fn get_ledger(
    &self,
    facility_id: Uuid,
  ) -> impl Future<Output = Result<Option<RevenueLedger>, Self::Error>> + Send + '_;

  /// Credit one completed request into the facility's running totals.
  ///
  /// This is a single atomic upsert-increment: it seeds the ledger from
  /// this request when absent, and concurrent credits never lose an
  /// increment. Returns the ledger after the credit.
  fn credit_ledger(
    &self,
    facility_id: Uuid,
    amount: i64,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<RevenueLedger, Self::Error>> + Send + '_;

  /// Append an immutable transaction record. The id and `recorded_at` are
  /// assigned by the store.
  fn append_transaction(
    &self,
    tx: NewTransaction,
  ) -> impl Future<Output = Result<Transaction, Self::Error>> + Send + '_;

  fn transactions_for_facility(
    &self,
    facility_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Transaction>, Self::Error>> + Send + '_;
}
