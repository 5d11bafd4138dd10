//! Handlers for `/requests` endpoints.

use axum::{
  Json,
  extract::{Path, State},
  http::{HeaderMap, StatusCode},
  response::IntoResponse,
};
use hema_core::{
  gate::{Policy, Target},
  identity::IdentityProvider,
  request::{NewRequest, Request},
  store::MarketStore,
};
use hema_engine::fulfillment::Fulfillment;
use uuid::Uuid;

use crate::{
  AppState,
  auth::{authenticate, require},
  error::Error,
};

/// `POST /requests` — any signed-in requester.
pub async fn create<S, I>(
  State(state): State<AppState<S, I>>,
  headers: HeaderMap,
  Json(body): Json<NewRequest>,
) -> Result<impl IntoResponse, Error>
where
  S: MarketStore,
  I: IdentityProvider,
{
  let session = authenticate(&state, &headers).await?;
  require(&session, &Policy::signed_in())?;

  let request = Fulfillment::new(state.store.clone())
    .place_request(session.identity.subject_id, body)
    .await?;
  Ok((StatusCode::CREATED, Json(request)))
}

/// `POST /requests/{id}/complete` — the owning approved facility.
pub async fn complete<S, I>(
  State(state): State<AppState<S, I>>,
  Path(id): Path<Uuid>,
  headers: HeaderMap,
) -> Result<Json<Request>, Error>
where
  S: MarketStore,
  I: IdentityProvider,
{
  let session = authenticate(&state, &headers).await?;
  require(&session, &Policy::approved_facility())?;

  let request = state
    .store
    .get_request(id)
    .await
    .map_err(Error::upstream)?
    .ok_or_else(|| Error::NotFound(format!("request {id}")))?;
  if request.facility_id != session.identity.subject_id {
    return Err(Error::Forbidden(Target::Home));
  }

  let receipt = Fulfillment::new(state.store.clone())
    .complete_request(id)
    .await?;
  Ok(Json(receipt.request))
}
