//! HTTP Basic authentication and per-route gate enforcement.
//!
//! Every protected route authenticates the request's credentials against
//! the identity provider, resolves a fresh session snapshot, and runs the
//! access gate with the route's policy. There is no server-side session
//! cache to go stale: a revoked facility is denied on its next request.

use axum::http::HeaderMap;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as B64;
use hema_core::{
  gate::{self, Decision, Policy, Target},
  identity::IdentityProvider,
  session::{Session, SessionState},
  store::MarketStore,
};
use hema_engine::session::resolve_snapshot;

use crate::{AppState, error::Error};

/// Verify Basic credentials and resolve the caller's session snapshot.
pub async fn authenticate<S, I>(
  state: &AppState<S, I>,
  headers: &HeaderMap,
) -> Result<Session, Error>
where
  S: MarketStore,
  I: IdentityProvider,
{
  let header_val = headers
    .get(axum::http::header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .ok_or(Error::Unauthorized)?;

  let encoded = header_val
    .strip_prefix("Basic ")
    .ok_or(Error::Unauthorized)?;

  let decoded = B64.decode(encoded).map_err(|_| Error::Unauthorized)?;
  let creds   = std::str::from_utf8(&decoded).map_err(|_| Error::Unauthorized)?;

  let (email, password) = creds.split_once(':').ok_or(Error::Unauthorized)?;

  let identity = state
    .idp
    .verify_password(email, password)
    .await
    .map_err(Error::upstream)?
    .ok_or(Error::Unauthorized)?;

  Ok(resolve_snapshot(state.store.as_ref(), state.idp.as_ref(), identity).await?)
}

/// Run the access gate for this session; a denial maps to HTTP.
pub fn require(session: &Session, policy: &Policy) -> Result<(), Error> {
  match gate::decide(&SessionState::SignedIn(session.clone()), policy) {
    Decision::Allow => Ok(()),
    // A snapshot is never pending; deny rather than grant if it somehow is.
    Decision::Wait => Err(Error::Unauthorized),
    Decision::Redirect(Target::Login) => Err(Error::Unauthorized),
    Decision::Redirect(target) => Err(Error::Forbidden(target)),
  }
}
