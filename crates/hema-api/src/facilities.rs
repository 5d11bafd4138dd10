//! Handlers for `/facilities` endpoints.
//!
//! | Method | Path | Policy |
//! |--------|------|--------|
//! | `GET`  | `/facilities` | public (approved only); `?all=true` is admin |
//! | `GET`  | `/facilities/{id}` | public |
//! | `POST` | `/facilities/{id}/approval` | admin |
//! | `PUT`  | `/facilities/{id}/inventory/{group}` | owning approved facility |

use axum::{
  Json,
  extract::{Path, Query, State},
  http::HeaderMap,
};
use hema_core::{
  blood::BloodGroup,
  facility::{ApprovalDecision, Facility},
  gate::{Policy, Target},
  identity::IdentityProvider,
  role::Role,
  store::MarketStore,
};
use hema_engine::approval::Approvals;
use serde::Deserialize;
use uuid::Uuid;

use crate::{
  AppState,
  auth::{authenticate, require},
  error::Error,
};

// ─── Browse ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  /// Include pending and rejected facilities; admin only.
  #[serde(default)]
  pub all: bool,
}

/// `GET /facilities[?all=true]`
pub async fn list<S, I>(
  State(state): State<AppState<S, I>>,
  Query(params): Query<ListParams>,
  headers: HeaderMap,
) -> Result<Json<Vec<Facility>>, Error>
where
  S: MarketStore,
  I: IdentityProvider,
{
  if params.all {
    let session = authenticate(&state, &headers).await?;
    require(&session, &Policy::role(Role::Admin))?;
  }

  let facilities = state
    .store
    .list_facilities(!params.all)
    .await
    .map_err(Error::upstream)?;
  Ok(Json(facilities))
}

/// `GET /facilities/{id}`
pub async fn get_one<S, I>(
  State(state): State<AppState<S, I>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Facility>, Error>
where
  S: MarketStore,
  I: IdentityProvider,
{
  let facility = state
    .store
    .get_facility(id)
    .await
    .map_err(Error::upstream)?
    .ok_or_else(|| Error::NotFound(format!("facility {id}")))?;
  Ok(Json(facility))
}

// ─── Approval ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ApprovalBody {
  pub decision: ApprovalDecision,
}

/// `POST /facilities/{id}/approval` — body: `{"decision":"approved"}`
pub async fn approval<S, I>(
  State(state): State<AppState<S, I>>,
  Path(id): Path<Uuid>,
  headers: HeaderMap,
  Json(body): Json<ApprovalBody>,
) -> Result<Json<Facility>, Error>
where
  S: MarketStore,
  I: IdentityProvider,
{
  let session = authenticate(&state, &headers).await?;
  require(&session, &Policy::role(Role::Admin))?;

  let facility = Approvals::new(state.store.clone())
    .transition(id, body.decision)
    .await?;
  Ok(Json(facility))
}

// ─── Inventory ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct InventoryBody {
  pub units: u32,
}

/// `PUT /facilities/{id}/inventory/{group}` — body: `{"units":12}`
pub async fn set_inventory<S, I>(
  State(state): State<AppState<S, I>>,
  Path((id, group)): Path<(Uuid, String)>,
  headers: HeaderMap,
  Json(body): Json<InventoryBody>,
) -> Result<Json<Facility>, Error>
where
  S: MarketStore,
  I: IdentityProvider,
{
  let session = authenticate(&state, &headers).await?;
  require(&session, &Policy::approved_facility())?;
  if session.identity.subject_id != id {
    return Err(Error::Forbidden(Target::Home));
  }

  let group: BloodGroup = group
    .parse()
    .map_err(|_| Error::BadRequest(format!("unknown blood group: {group:?}")))?;

  let facility = state
    .store
    .set_inventory(id, group, body.units)
    .await
    .map_err(Error::upstream)?
    .ok_or_else(|| Error::NotFound(format!("facility {id}")))?;
  Ok(Json(facility))
}
