//! The fulfillment ledger workflow and work-item intake.
//!
//! Completing a request touches three independent records with no
//! cross-step atomicity. A failure after the status write surfaces as
//! [`Error::Partial`] naming the completed steps — never retried
//! automatically, since re-crediting the ledger would double-count.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use hema_core::{
  eligibility,
  error::RecordKind,
  facility::Facility,
  ledger::{NewTransaction, RevenueLedger, Transaction},
  request::{Donation, FulfillmentStatus, NewDonation, NewRequest, Request},
  store::MarketStore,
};

use crate::{Error, Result};

/// Everything written by a completed request.
#[derive(Debug)]
pub struct FulfillmentReceipt {
  pub request:     Request,
  pub ledger:      RevenueLedger,
  pub transaction: Transaction,
}

pub struct Fulfillment<S> {
  store: Arc<S>,
}

impl<S: MarketStore> Fulfillment<S> {
  pub fn new(store: Arc<S>) -> Self {
    Self { store }
  }

  // ── Intake ────────────────────────────────────────────────────────────

  /// Create a pending request, priced from the facility's per-unit rate.
  pub async fn place_request(
    &self,
    requester_id: Uuid,
    new: NewRequest,
  ) -> Result<Request> {
    let facility = self.approved_facility(new.facility_id).await?;

    let available = facility
      .inventory
      .get(&new.blood_group)
      .copied()
      .unwrap_or(0);
    if available < new.units {
      return Err(
        hema_core::Error::InsufficientStock {
          group:     new.blood_group,
          available,
          requested: new.units,
        }
        .into(),
      );
    }

    let request = Request {
      request_id:   Uuid::new_v4(),
      facility_id:  new.facility_id,
      requester_id,
      blood_group:  new.blood_group,
      units:        new.units,
      total_cost:   i64::from(new.units) * facility.price_per_unit,
      status:       FulfillmentStatus::Pending,
      created_at:   Utc::now(),
      completed_at: None,
    };
    self.store.put_request(&request).await.map_err(Error::store)?;
    Ok(request)
  }

  /// Create a pending donation, re-checking the 90-day window against the
  /// donor's most recent completed donation. The advisory display uses
  /// the same rule ([`eligibility::compute`]), so the two cannot
  /// disagree.
  pub async fn submit_donation(
    &self,
    donor_id: Uuid,
    new: NewDonation,
  ) -> Result<Donation> {
    self.approved_facility(new.facility_id).await?;

    let history = self
      .store
      .donations_for_donor(donor_id)
      .await
      .map_err(Error::store)?;
    eligibility::enforce(&history, Utc::now().date_naive())?;

    let donation = Donation {
      donation_id:    Uuid::new_v4(),
      donor_id,
      facility_id:    new.facility_id,
      blood_group:    new.blood_group,
      preferred_date: new.preferred_date,
      status:         FulfillmentStatus::Pending,
      created_at:     Utc::now(),
      completed_at:   None,
    };
    self
      .store
      .put_donation(&donation)
      .await
      .map_err(Error::store)?;
    Ok(donation)
  }

  // ── Completion ────────────────────────────────────────────────────────

  /// Mark a pending request completed and propagate the money: status
  /// write, ledger credit, transaction append — in that order, each an
  /// independent write.
  pub async fn complete_request(
    &self,
    id: Uuid,
  ) -> Result<FulfillmentReceipt> {
    // Step 1: re-read. Nothing has been written yet, so a failure here
    // has no partial effect.
    let mut request = self
      .store
      .get_request(id)
      .await
      .map_err(Error::store)?
      .ok_or(hema_core::Error::NotFound { kind: RecordKind::Request, id })?;
    if request.status != FulfillmentStatus::Pending {
      return Err(
        hema_core::Error::NotPending { kind: RecordKind::Request, id }.into(),
      );
    }

    // Step 2: status transition.
    let now = Utc::now();
    request.status = FulfillmentStatus::Completed;
    request.completed_at = Some(now);
    self.store.put_request(&request).await.map_err(Error::store)?;

    // Step 3: ledger credit — a single atomic upsert-increment in the
    // store, seeded from this request when the ledger is absent.
    let ledger = self
      .store
      .credit_ledger(request.facility_id, request.total_cost, now)
      .await
      .map_err(|e| partial("complete_request", &["request_status"], e))?;

    // Step 4: the immutable transaction record.
    let transaction = self
      .store
      .append_transaction(NewTransaction {
        facility_id: request.facility_id,
        request_id:  request.request_id,
        blood_group: request.blood_group,
        amount:      request.total_cost,
      })
      .await
      .map_err(|e| {
        partial("complete_request", &["request_status", "ledger_credit"], e)
      })?;

    Ok(FulfillmentReceipt { request, ledger, transaction })
  }

  /// Donations carry no money: the workflow is steps 1–2 only.
  pub async fn complete_donation(&self, id: Uuid) -> Result<Donation> {
    let mut donation = self
      .store
      .get_donation(id)
      .await
      .map_err(Error::store)?
      .ok_or(hema_core::Error::NotFound { kind: RecordKind::Donation, id })?;
    if donation.status != FulfillmentStatus::Pending {
      return Err(
        hema_core::Error::NotPending { kind: RecordKind::Donation, id }
          .into(),
      );
    }

    donation.status = FulfillmentStatus::Completed;
    donation.completed_at = Some(Utc::now());
    self
      .store
      .put_donation(&donation)
      .await
      .map_err(Error::store)?;
    Ok(donation)
  }

  // ── Helpers ───────────────────────────────────────────────────────────

  async fn approved_facility(&self, id: Uuid) -> Result<Facility> {
    let facility = self
      .store
      .get_facility(id)
      .await
      .map_err(Error::store)?
      .ok_or(hema_core::Error::NotFound { kind: RecordKind::Facility, id })?;
    if !facility.approved() {
      return Err(hema_core::Error::FacilityNotApproved { id }.into());
    }
    Ok(facility)
  }
}

/// Log a partial failure with enough context to reconcile manually, then
/// surface it to the caller.
fn partial(
  operation: &'static str,
  completed: &[&'static str],
  source: impl std::error::Error + Send + Sync + 'static,
) -> Error {
  tracing::error!(
    operation,
    ?completed,
    error = %source,
    "workflow stopped partway; manual reconciliation required"
  );
  Error::Partial {
    operation,
    completed: completed.to_vec(),
    source: Box::new(source),
  }
}
