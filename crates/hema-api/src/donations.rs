//! Handlers for `/donations` and `/eligibility` endpoints.

use axum::{
  Json,
  extract::{Path, State},
  http::{HeaderMap, StatusCode},
  response::IntoResponse,
};
use chrono::Utc;
use hema_core::{
  eligibility::{self, Eligibility},
  gate::{Policy, Target},
  identity::IdentityProvider,
  request::{Donation, NewDonation},
  role::Role,
  store::MarketStore,
};
use hema_engine::fulfillment::Fulfillment;
use uuid::Uuid;

use crate::{
  AppState,
  auth::{authenticate, require},
  error::Error,
};

/// `POST /donations` — donors only; the 90-day window is enforced.
pub async fn create<S, I>(
  State(state): State<AppState<S, I>>,
  headers: HeaderMap,
  Json(body): Json<NewDonation>,
) -> Result<impl IntoResponse, Error>
where
  S: MarketStore,
  I: IdentityProvider,
{
  let session = authenticate(&state, &headers).await?;
  require(&session, &Policy::role(Role::Donor))?;

  let donation = Fulfillment::new(state.store.clone())
    .submit_donation(session.identity.subject_id, body)
    .await?;
  Ok((StatusCode::CREATED, Json(donation)))
}

/// `POST /donations/{id}/complete` — the owning approved facility.
pub async fn complete<S, I>(
  State(state): State<AppState<S, I>>,
  Path(id): Path<Uuid>,
  headers: HeaderMap,
) -> Result<Json<Donation>, Error>
where
  S: MarketStore,
  I: IdentityProvider,
{
  let session = authenticate(&state, &headers).await?;
  require(&session, &Policy::approved_facility())?;

  let donation = state
    .store
    .get_donation(id)
    .await
    .map_err(Error::upstream)?
    .ok_or_else(|| Error::NotFound(format!("donation {id}")))?;
  if donation.facility_id != session.identity.subject_id {
    return Err(Error::Forbidden(Target::Home));
  }

  let donation = Fulfillment::new(state.store.clone())
    .complete_donation(id)
    .await?;
  Ok(Json(donation))
}

/// `GET /eligibility` — the signed-in donor's advisory computation. This
/// is display guidance; `POST /donations` re-checks the same rule.
pub async fn eligibility<S, I>(
  State(state): State<AppState<S, I>>,
  headers: HeaderMap,
) -> Result<Json<Eligibility>, Error>
where
  S: MarketStore,
  I: IdentityProvider,
{
  let session = authenticate(&state, &headers).await?;
  require(&session, &Policy::signed_in())?;

  let history = state
    .store
    .donations_for_donor(session.identity.subject_id)
    .await
    .map_err(Error::upstream)?;
  Ok(Json(eligibility::compute(&history, Utc::now().date_naive())))
}
