//! Revenue ledger aggregate and the append-only transaction log.
//!
//! One ledger record per facility, mutated only by the fulfillment
//! workflow. Transactions are immutable once appended.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::blood::BloodGroup;

/// Running totals for one facility, in currency minor units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevenueLedger {
  pub facility_id:            Uuid,
  pub total_revenue:          i64,
  pub monthly_revenue:        i64,
  pub weekly_revenue:         i64,
  pub completed_transactions: i64,
  pub updated_at:             DateTime<Utc>,
}

/// One completed request's financial record. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
  pub transaction_id: Uuid,
  pub facility_id:    Uuid,
  pub request_id:     Uuid,
  pub blood_group:    BloodGroup,
  pub amount:         i64,
  pub recorded_at:    DateTime<Utc>,
}

/// Input to [`MarketStore::append_transaction`](crate::store::MarketStore::append_transaction).
/// The id and `recorded_at` are assigned by the store.
#[derive(Debug, Clone)]
pub struct NewTransaction {
  pub facility_id: Uuid,
  pub request_id:  Uuid,
  pub blood_group: BloodGroup,
  pub amount:      i64,
}
