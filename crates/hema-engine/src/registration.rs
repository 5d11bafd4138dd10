//! Facility and donor registration with compensating rollback.
//!
//! Account creation spans the identity provider and up to two store
//! records with no transaction across them. On failure the
//! already-written pieces are undone by an explicit, ordered list of
//! compensating actions, each attempted independently of the others'
//! outcomes: an orphaned identity-provider account with no profile is
//! worse than a partially-compensated state with a logged warning. No
//! compensating action is retried, and the caller always receives the
//! original error.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use hema_core::{
  facility::NewFacility,
  identity::{IdentityProvider, NewAccount},
  profile::NewProfile,
  session::AuthIdentity,
  store::MarketStore,
};

use crate::{Error, Result};

/// One undo step of the registration saga.
#[derive(Debug, Clone, Copy)]
enum Compensation {
  Facility(Uuid),
  Profile(Uuid),
  Account(Uuid),
}

pub struct Registration<S, I> {
  store: Arc<S>,
  idp:   Arc<I>,
}

impl<S, I> Registration<S, I>
where
  S: MarketStore,
  I: IdentityProvider,
{
  pub fn new(store: Arc<S>, idp: Arc<I>) -> Self {
    Self { store, idp }
  }

  /// Create the identity account, then the profile record.
  pub async fn register_donor(
    &self,
    account: NewAccount,
    profile: NewProfile,
  ) -> Result<AuthIdentity> {
    let identity = self
      .idp
      .create_account(account)
      .await
      .map_err(Error::identity)?;

    let record = profile.into_profile(identity.subject_id, Utc::now());
    if let Err(e) = self.store.put_profile(&record).await {
      self
        .compensate(&[
          Compensation::Profile(identity.subject_id),
          Compensation::Account(identity.subject_id),
        ])
        .await;
      return Err(Error::store(e));
    }

    Ok(identity)
  }

  /// Create the identity account, the profile record, then the facility
  /// record (which starts out pending approval).
  pub async fn register_facility(
    &self,
    account: NewAccount,
    profile: NewProfile,
    facility: NewFacility,
  ) -> Result<AuthIdentity> {
    let identity = self
      .idp
      .create_account(account)
      .await
      .map_err(Error::identity)?;
    let subject_id = identity.subject_id;
    let now = Utc::now();

    let profile_record = profile.into_profile(subject_id, now);
    if let Err(e) = self.store.put_profile(&profile_record).await {
      self
        .compensate(&[
          Compensation::Profile(subject_id),
          Compensation::Account(subject_id),
        ])
        .await;
      return Err(Error::store(e));
    }

    let facility_record = facility.into_facility(subject_id, now);
    if let Err(e) = self.store.put_facility(&facility_record).await {
      self
        .compensate(&[
          Compensation::Facility(subject_id),
          Compensation::Profile(subject_id),
          Compensation::Account(subject_id),
        ])
        .await;
      return Err(Error::store(e));
    }

    Ok(identity)
  }

  /// Attempt every compensating action in order, regardless of the
  /// others' outcomes. Failures are logged, never retried.
  async fn compensate(&self, steps: &[Compensation]) {
    for step in steps {
      let outcome: std::result::Result<
        (),
        Box<dyn std::error::Error + Send + Sync>,
      > = match *step {
        Compensation::Facility(id) => {
          self.store.delete_facility(id).await.map_err(|e| Box::new(e) as _)
        }
        Compensation::Profile(id) => {
          self.store.delete_profile(id).await.map_err(|e| Box::new(e) as _)
        }
        Compensation::Account(id) => {
          self.idp.delete_account(id).await.map_err(|e| Box::new(e) as _)
        }
      };
      if let Err(error) = outcome {
        tracing::warn!(?step, %error, "compensating action failed; continuing");
      }
    }
  }
}
