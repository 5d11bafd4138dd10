//! Admin transitions over facility approval state.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use hema_core::{
  error::RecordKind,
  facility::{ApprovalChange, ApprovalDecision, Facility},
  store::MarketStore,
};

use crate::{Error, Result};

/// Applies admin approval decisions.
///
/// The write lands as one single-record update. Any signed-in session for
/// the facility observes it through its live watch — that watch *is* the
/// revocation mechanism; there is no polling or cached check to refresh.
pub struct Approvals<S> {
  store: Arc<S>,
}

impl<S: MarketStore> Approvals<S> {
  pub fn new(store: Arc<S>) -> Self {
    Self { store }
  }

  /// Transition a facility to `decision`. Reversible in both directions;
  /// applying the same decision twice is idempotent.
  pub async fn transition(
    &self,
    id: Uuid,
    decision: ApprovalDecision,
  ) -> Result<Facility> {
    let change = ApprovalChange::new(decision, Utc::now());
    self
      .store
      .update_facility_approval(id, change)
      .await
      .map_err(Error::store)?
      .ok_or_else(|| {
        hema_core::Error::NotFound { kind: RecordKind::Facility, id }.into()
      })
  }
}
