//! Handler for `/session` — credential sign-in with a role tab.

use axum::{Json, extract::State};
use hema_core::{
  identity::IdentityProvider, role::Role, session::Session, store::MarketStore,
};
use hema_engine::session::resolve_snapshot;
use serde::Deserialize;

use crate::{AppState, error::Error};

#[derive(Debug, Deserialize)]
pub struct LoginBody {
  pub email:    String,
  pub password: String,
  /// The role tab the client signed in under; a mismatch with the
  /// resolved role is a conflict naming the actual role.
  pub role:     Option<Role>,
}

/// `POST /session`
pub async fn create<S, I>(
  State(state): State<AppState<S, I>>,
  Json(body): Json<LoginBody>,
) -> Result<Json<Session>, Error>
where
  S: MarketStore,
  I: IdentityProvider,
{
  let identity = state
    .idp
    .verify_password(&body.email, &body.password)
    .await
    .map_err(Error::upstream)?
    .ok_or(Error::Unauthorized)?;

  let session =
    resolve_snapshot(state.store.as_ref(), state.idp.as_ref(), identity)
      .await?;

  if let Some(expected) = body.role
    && session.role != expected
  {
    return Err(
      hema_engine::Error::Domain(hema_core::Error::RoleMismatch {
        expected,
        actual: session.role,
      })
      .into(),
    );
  }

  Ok(Json(session))
}
