//! Handlers for `/register` endpoints — the registration saga over HTTP.

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use hema_core::{
  facility::NewFacility,
  identity::{IdentityProvider, NewAccount},
  profile::NewProfile,
  store::MarketStore,
};
use hema_engine::registration::Registration;
use serde::Deserialize;

use crate::{AppState, error::Error};

#[derive(Debug, Deserialize)]
pub struct DonorBody {
  pub account: NewAccount,
  pub profile: NewProfile,
}

#[derive(Debug, Deserialize)]
pub struct FacilityBody {
  pub account:  NewAccount,
  pub profile:  NewProfile,
  pub facility: NewFacility,
}

/// `POST /register/donor`
pub async fn donor<S, I>(
  State(state): State<AppState<S, I>>,
  Json(body): Json<DonorBody>,
) -> Result<impl IntoResponse, Error>
where
  S: MarketStore,
  I: IdentityProvider,
{
  let identity = Registration::new(state.store.clone(), state.idp.clone())
    .register_donor(body.account, body.profile)
    .await?;
  Ok((StatusCode::CREATED, Json(identity)))
}

/// `POST /register/facility`
pub async fn facility<S, I>(
  State(state): State<AppState<S, I>>,
  Json(body): Json<FacilityBody>,
) -> Result<impl IntoResponse, Error>
where
  S: MarketStore,
  I: IdentityProvider,
{
  let mut profile = body.profile;
  // The canonical facility token; the normalizer matches it
  // case-insensitively either way.
  if profile.raw_role.is_none() {
    profile.raw_role = Some("bloodbank".into());
  }

  let identity = Registration::new(state.store.clone(), state.idp.clone())
    .register_facility(body.account, profile, body.facility)
    .await?;
  Ok((StatusCode::CREATED, Json(identity)))
}
