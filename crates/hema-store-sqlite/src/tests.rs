//! Integration tests for the SQLite backend against an in-memory database.

use chrono::Utc;
use hema_core::{
  blood::BloodGroup,
  facility::{ApprovalChange, ApprovalDecision, ApprovalStatus, NewFacility},
  identity::{IdentityProvider, NewAccount},
  ledger::NewTransaction,
  profile::NewProfile,
  request::{Donation, FulfillmentStatus, Request},
  store::MarketStore,
};
use uuid::Uuid;

use crate::{LocalIdentity, SqliteMarket};

async fn market() -> SqliteMarket {
  SqliteMarket::open_in_memory().await.expect("in-memory store")
}

async fn identity() -> LocalIdentity {
  LocalIdentity::open_in_memory().await.expect("in-memory identity")
}

fn profile(name: &str) -> hema_core::profile::Profile {
  NewProfile {
    display_name: name.into(),
    email:        format!("{}@example.com", name.to_lowercase()),
    phone:        None,
    raw_role:     Some("donor".into()),
  }
  .into_profile(Uuid::new_v4(), Utc::now())
}

fn facility(name: &str) -> hema_core::facility::Facility {
  NewFacility {
    name:           name.into(),
    license_no:     "LIC-42".into(),
    contact_phone:  Some("+1-555-0100".into()),
    address:        None,
    price_per_unit: 5000,
  }
  .into_facility(Uuid::new_v4(), Utc::now())
}

fn request(facility_id: Uuid, total_cost: i64) -> Request {
  Request {
    request_id:   Uuid::new_v4(),
    facility_id,
    requester_id: Uuid::new_v4(),
    blood_group:  BloodGroup::ONegative,
    units:        4,
    total_cost,
    status:       FulfillmentStatus::Pending,
    created_at:   Utc::now(),
    completed_at: None,
  }
}

fn donation(donor_id: Uuid, facility_id: Uuid) -> Donation {
  Donation {
    donation_id:    Uuid::new_v4(),
    donor_id,
    facility_id,
    blood_group:    BloodGroup::APositive,
    preferred_date: "2024-06-01".parse().unwrap(),
    status:         FulfillmentStatus::Pending,
    created_at:     Utc::now(),
    completed_at:   None,
  }
}

// ─── Profiles ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn profile_round_trip() {
  let s = market().await;
  let p = profile("Alice");

  s.put_profile(&p).await.unwrap();
  let fetched = s.get_profile(p.subject_id).await.unwrap().unwrap();
  assert_eq!(fetched, p);
}

#[tokio::test]
async fn get_profile_missing_returns_none() {
  let s = market().await;
  assert!(s.get_profile(Uuid::new_v4()).await.unwrap().is_none());
}

#[tokio::test]
async fn delete_profile_is_idempotent() {
  let s = market().await;
  let p = profile("Bob");
  s.put_profile(&p).await.unwrap();

  s.delete_profile(p.subject_id).await.unwrap();
  assert!(s.get_profile(p.subject_id).await.unwrap().is_none());
  // Deleting again is not an error.
  s.delete_profile(p.subject_id).await.unwrap();
}

// ─── Facilities ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn facility_round_trip_with_inventory() {
  let s = market().await;
  let mut f = facility("Central Bank");
  f.inventory.insert(BloodGroup::OPositive, 12);
  f.inventory.insert(BloodGroup::AbNegative, 2);

  s.put_facility(&f).await.unwrap();
  let fetched = s.get_facility(f.subject_id).await.unwrap().unwrap();
  assert_eq!(fetched, f);
}

#[tokio::test]
async fn list_facilities_filters_by_approval() {
  let s = market().await;
  let mut approved = facility("Approved Bank");
  ApprovalChange::new(ApprovalDecision::Approved, Utc::now())
    .apply(&mut approved);
  let pending = facility("Pending Bank");

  s.put_facility(&approved).await.unwrap();
  s.put_facility(&pending).await.unwrap();

  let all = s.list_facilities(false).await.unwrap();
  assert_eq!(all.len(), 2);

  let only = s.list_facilities(true).await.unwrap();
  assert_eq!(only.len(), 1);
  assert_eq!(only[0].subject_id, approved.subject_id);
}

#[tokio::test]
async fn approval_update_clears_opposite_timestamp() {
  let s = market().await;
  let f = facility("Flip Bank");
  s.put_facility(&f).await.unwrap();

  let rejected = s
    .update_facility_approval(
      f.subject_id,
      ApprovalChange::new(ApprovalDecision::Rejected, Utc::now()),
    )
    .await
    .unwrap()
    .unwrap();
  assert_eq!(rejected.status, ApprovalStatus::Rejected);
  assert!(rejected.rejected_at.is_some());
  assert!(rejected.approved_at.is_none());

  let approved = s
    .update_facility_approval(
      f.subject_id,
      ApprovalChange::new(ApprovalDecision::Approved, Utc::now()),
    )
    .await
    .unwrap()
    .unwrap();
  assert_eq!(approved.status, ApprovalStatus::Approved);
  assert!(approved.approved_at.is_some());
  assert!(approved.rejected_at.is_none());
}

#[tokio::test]
async fn approval_update_missing_facility_returns_none() {
  let s = market().await;
  let result = s
    .update_facility_approval(
      Uuid::new_v4(),
      ApprovalChange::new(ApprovalDecision::Approved, Utc::now()),
    )
    .await
    .unwrap();
  assert!(result.is_none());
}

#[tokio::test]
async fn set_inventory_replaces_units() {
  let s = market().await;
  let f = facility("Stock Bank");
  s.put_facility(&f).await.unwrap();

  s.set_inventory(f.subject_id, BloodGroup::BPositive, 7)
    .await
    .unwrap()
    .unwrap();
  let updated = s
    .set_inventory(f.subject_id, BloodGroup::BPositive, 3)
    .await
    .unwrap()
    .unwrap();
  assert_eq!(updated.inventory.get(&BloodGroup::BPositive), Some(&3));

  assert!(
    s.set_inventory(Uuid::new_v4(), BloodGroup::BPositive, 1)
      .await
      .unwrap()
      .is_none()
  );
}

// ─── Facility watches ────────────────────────────────────────────────────────

#[tokio::test]
async fn watch_is_seeded_with_current_value() {
  let s = market().await;
  let f = facility("Watched Bank");
  s.put_facility(&f).await.unwrap();

  let w = s.watch_facility(f.subject_id).await.unwrap();
  assert_eq!(w.current(), Some(f));
}

#[tokio::test]
async fn watch_sees_approval_flip() {
  let s = market().await;
  let f = facility("Live Bank");
  s.put_facility(&f).await.unwrap();

  let mut w = s.watch_facility(f.subject_id).await.unwrap();
  s.update_facility_approval(
    f.subject_id,
    ApprovalChange::new(ApprovalDecision::Approved, Utc::now()),
  )
  .await
  .unwrap();

  assert!(w.changed().await);
  let seen = w.current().unwrap();
  assert_eq!(seen.status, ApprovalStatus::Approved);
}

#[tokio::test]
async fn watch_count_drops_to_zero_after_cancel() {
  let s = market().await;
  let f = facility("Probe Bank");
  s.put_facility(&f).await.unwrap();

  let mut a = s.watch_facility(f.subject_id).await.unwrap();
  let mut b = s.watch_facility(f.subject_id).await.unwrap();
  assert_eq!(s.facility_watch_count(f.subject_id), 2);

  a.cancel();
  // Cancelling twice is a no-op.
  a.cancel();
  assert_eq!(s.facility_watch_count(f.subject_id), 1);

  b.cancel();
  assert_eq!(s.facility_watch_count(f.subject_id), 0);
}

#[tokio::test]
async fn dropping_a_watch_releases_its_registration() {
  let s = market().await;
  let f = facility("Drop Bank");
  s.put_facility(&f).await.unwrap();

  {
    let _w = s.watch_facility(f.subject_id).await.unwrap();
    assert_eq!(s.facility_watch_count(f.subject_id), 1);
  }
  assert_eq!(s.facility_watch_count(f.subject_id), 0);
}

// ─── Requests and donations ──────────────────────────────────────────────────

#[tokio::test]
async fn request_round_trip() {
  let s = market().await;
  let r = request(Uuid::new_v4(), 20000);

  s.put_request(&r).await.unwrap();
  assert_eq!(s.get_request(r.request_id).await.unwrap().unwrap(), r);

  let listed = s.requests_for_facility(r.facility_id).await.unwrap();
  assert_eq!(listed.len(), 1);
}

#[tokio::test]
async fn donation_round_trip_and_listing() {
  let s = market().await;
  let donor = Uuid::new_v4();
  let d1 = donation(donor, Uuid::new_v4());
  let d2 = donation(donor, Uuid::new_v4());

  s.put_donation(&d1).await.unwrap();
  s.put_donation(&d2).await.unwrap();
  s.put_donation(&donation(Uuid::new_v4(), Uuid::new_v4()))
    .await
    .unwrap();

  let history = s.donations_for_donor(donor).await.unwrap();
  assert_eq!(history.len(), 2);
}

// ─── Ledger ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn credit_ledger_seeds_when_absent() {
  let s = market().await;
  let facility_id = Uuid::new_v4();

  assert!(s.get_ledger(facility_id).await.unwrap().is_none());

  let ledger = s
    .credit_ledger(facility_id, 20000, Utc::now())
    .await
    .unwrap();
  assert_eq!(ledger.total_revenue, 20000);
  assert_eq!(ledger.monthly_revenue, 20000);
  assert_eq!(ledger.weekly_revenue, 20000);
  assert_eq!(ledger.completed_transactions, 1);
}

#[tokio::test]
async fn credit_ledger_increments_existing_totals() {
  let s = market().await;
  let facility_id = Uuid::new_v4();

  // Seed the ledger at {total: 100000, transactions: 4}.
  for _ in 0..4 {
    s.credit_ledger(facility_id, 25000, Utc::now()).await.unwrap();
  }

  let ledger = s
    .credit_ledger(facility_id, 20000, Utc::now())
    .await
    .unwrap();
  assert_eq!(ledger.total_revenue, 120000);
  assert_eq!(ledger.completed_transactions, 5);
}

#[tokio::test]
async fn concurrent_credits_lose_nothing() {
  let s = market().await;
  let facility_id = Uuid::new_v4();

  let mut joins = Vec::new();
  for _ in 0..10 {
    let s = s.clone();
    joins.push(tokio::spawn(async move {
      s.credit_ledger(facility_id, 1000, Utc::now()).await.unwrap();
    }));
  }
  for j in joins {
    j.await.unwrap();
  }

  let ledger = s.get_ledger(facility_id).await.unwrap().unwrap();
  assert_eq!(ledger.total_revenue, 10000);
  assert_eq!(ledger.completed_transactions, 10);
}

#[tokio::test]
async fn append_transaction_assigns_id_and_timestamp() {
  let s = market().await;
  let facility_id = Uuid::new_v4();

  let tx = s
    .append_transaction(NewTransaction {
      facility_id,
      request_id: Uuid::new_v4(),
      blood_group: BloodGroup::ONegative,
      amount: 20000,
    })
    .await
    .unwrap();
  assert_eq!(tx.amount, 20000);

  let listed = s.transactions_for_facility(facility_id).await.unwrap();
  assert_eq!(listed, vec![tx]);
}

// ─── Identity ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_account_and_verify_password() {
  let idp = identity().await;
  let created = idp
    .create_account(NewAccount {
      email:    "alice@example.com".into(),
      password: "hunter2!".into(),
    })
    .await
    .unwrap();

  let ok = idp
    .verify_password("alice@example.com", "hunter2!")
    .await
    .unwrap();
  assert_eq!(ok, Some(created));

  let wrong = idp
    .verify_password("alice@example.com", "not-it")
    .await
    .unwrap();
  assert!(wrong.is_none());

  let unknown = idp.verify_password("nobody@example.com", "x").await.unwrap();
  assert!(unknown.is_none());
}

#[tokio::test]
async fn duplicate_email_is_rejected() {
  let idp = identity().await;
  let account = NewAccount {
    email:    "dup@example.com".into(),
    password: "pw".into(),
  };
  idp.create_account(account.clone()).await.unwrap();

  let err = idp.create_account(account).await.unwrap_err();
  assert!(matches!(err, crate::Error::EmailTaken(_)), "{err}");
}

#[tokio::test]
async fn sign_in_drives_auth_watch() {
  let idp = identity().await;
  let created = idp
    .create_account(NewAccount {
      email:    "watcher@example.com".into(),
      password: "pw".into(),
    })
    .await
    .unwrap();

  let mut w = idp.watch_auth().await.unwrap();
  assert_eq!(w.current(), None);

  idp.sign_in("watcher@example.com", "pw").await.unwrap();
  assert!(w.changed().await);
  assert_eq!(w.current(), Some(created));

  idp.sign_out();
  assert!(w.changed().await);
  assert_eq!(w.current(), None);
}

#[tokio::test]
async fn auth_watch_count_tracks_guards() {
  let idp = identity().await;
  let mut a = idp.watch_auth().await.unwrap();
  let _b = idp.watch_auth().await.unwrap();
  assert_eq!(idp.auth_watch_count(), 2);

  a.cancel();
  assert_eq!(idp.auth_watch_count(), 1);
  drop(_b);
  assert_eq!(idp.auth_watch_count(), 0);
}

#[tokio::test]
async fn token_claims_default_and_elevated() {
  let idp = identity().await;
  let created = idp
    .create_account(NewAccount {
      email:    "claims@example.com".into(),
      password: "pw".into(),
    })
    .await
    .unwrap();

  let claims = idp.token_claims(created.subject_id).await.unwrap();
  assert!(!claims.admin);

  idp.set_admin_claim(created.subject_id, true).await.unwrap();
  let claims = idp.token_claims(created.subject_id).await.unwrap();
  assert!(claims.admin);
}

#[tokio::test]
async fn token_claims_for_unknown_account_fails() {
  let idp = identity().await;
  let err = idp.token_claims(Uuid::new_v4()).await.unwrap_err();
  assert!(matches!(err, crate::Error::AccountNotFound(_)), "{err}");
}

#[tokio::test]
async fn deleting_account_signs_it_out() {
  let idp = identity().await;
  let created = idp
    .create_account(NewAccount {
      email:    "gone@example.com".into(),
      password: "pw".into(),
    })
    .await
    .unwrap();
  idp.sign_in("gone@example.com", "pw").await.unwrap();

  let mut w = idp.watch_auth().await.unwrap();
  idp.delete_account(created.subject_id).await.unwrap();

  assert!(w.changed().await);
  assert_eq!(w.current(), None);
  assert!(
    idp
      .verify_password("gone@example.com", "pw")
      .await
      .unwrap()
      .is_none()
  );
}
