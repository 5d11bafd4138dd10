//! The session resolver — a live, cancellable stream of session states.
//!
//! One driver task owns every upstream subscription. Because that task is
//! the only place subscriptions are created or cancelled, "cancel the old
//! nested watch, then establish the new one" is serialized by
//! construction: a session belonging to a superseded identity can never
//! be emitted after the switch.

use std::sync::Arc;

use tokio::sync::{oneshot, watch};

use hema_core::{
  facility::Facility,
  identity::IdentityProvider,
  role::{Claims, Role},
  session::{AuthIdentity, Session, SessionState},
  store::MarketStore,
  watch::{RecordWatch, Subscription},
};

use crate::{Error, Result};

// ─── Handle ──────────────────────────────────────────────────────────────────

/// A live session stream plus its cancel guard.
pub struct SessionHandle {
  rx:    watch::Receiver<SessionState>,
  guard: Subscription,
}

impl SessionHandle {
  /// Snapshot of the latest state.
  pub fn state(&self) -> SessionState {
    self.rx.borrow().clone()
  }

  /// Wait for the next emission. Returns `false` once the resolver is
  /// gone.
  pub async fn changed(&mut self) -> bool {
    self.rx.changed().await.is_ok()
  }

  /// A second receiver over the same stream, for consumers (such as an
  /// access gate) that re-evaluate on every emission.
  pub fn subscribe(&self) -> watch::Receiver<SessionState> {
    self.rx.clone()
  }

  /// Stop the resolver and tear down its subscriptions. Idempotent.
  pub fn cancel(&mut self) {
    self.guard.cancel();
  }
}

// ─── Resolver ────────────────────────────────────────────────────────────────

/// Owned by the composition root and handed down explicitly; never a
/// module-level singleton.
pub struct SessionResolver<S, I> {
  store: Arc<S>,
  idp:   Arc<I>,
}

impl<S, I> SessionResolver<S, I>
where
  S: MarketStore + 'static,
  I: IdentityProvider + 'static,
{
  pub fn new(store: Arc<S>, idp: Arc<I>) -> Self {
    Self { store, idp }
  }

  /// Spawn a driver task and return a handle observing it.
  ///
  /// The first value is [`SessionState::Resolving`]; the identity signed
  /// in at spawn time (if any) is resolved immediately after.
  pub async fn spawn(&self) -> Result<SessionHandle> {
    let auth = self.idp.watch_auth().await.map_err(Error::identity)?;
    let (tx, rx) = watch::channel(SessionState::Resolving);
    let (stop_tx, stop_rx) = oneshot::channel();

    let store = Arc::clone(&self.store);
    let idp = Arc::clone(&self.idp);
    tokio::spawn(drive(store, idp, auth, tx, stop_rx));

    let guard = Subscription::new(move || {
      // An already-exited driver has dropped its receiver; that's fine.
      let _ = stop_tx.send(());
    });

    Ok(SessionHandle { rx, guard })
  }
}

// ─── Snapshot resolution ─────────────────────────────────────────────────────

/// One-shot resolution for stateless callers (e.g. a request-scoped HTTP
/// session). Shares the live resolver's composition rules; a store
/// failure propagates here instead of degrading, since the caller can
/// simply retry the request.
pub async fn resolve_snapshot<S, I>(
  store: &S,
  idp: &I,
  identity: AuthIdentity,
) -> Result<Session>
where
  S: MarketStore,
  I: IdentityProvider,
{
  let profile = store
    .get_profile(identity.subject_id)
    .await
    .map_err(Error::store)?;
  let claims = fetch_claims(idp, &identity).await;
  let role = Role::normalize(
    profile.as_ref().and_then(|p| p.raw_role.as_deref()),
    &claims,
  );

  let facility = if role == Role::Facility {
    store
      .get_facility(identity.subject_id)
      .await
      .map_err(Error::store)?
  } else {
    None
  };

  Ok(Session { identity, role, claims, profile, facility })
}

/// Claims are an enhancement, not a hard dependency: a fetch failure
/// degrades to empty claims.
async fn fetch_claims<I: IdentityProvider>(
  idp: &I,
  identity: &AuthIdentity,
) -> Claims {
  match idp.token_claims(identity.subject_id).await {
    Ok(claims) => claims,
    Err(error) => {
      tracing::warn!(%error, "claim fetch failed; proceeding with empty claims");
      Claims::default()
    }
  }
}

// ─── Driver ──────────────────────────────────────────────────────────────────

async fn drive<S, I>(
  store: Arc<S>,
  idp: Arc<I>,
  mut auth: RecordWatch<AuthIdentity>,
  tx: watch::Sender<SessionState>,
  mut stop: oneshot::Receiver<()>,
) where
  S: MarketStore,
  I: IdentityProvider,
{
  let mut facility: Option<RecordWatch<Facility>> = None;

  // Resolve whatever identity is already signed in.
  resolve(&*store, &*idp, auth.current(), &mut facility, &tx).await;

  loop {
    tokio::select! {
      _ = &mut stop => break,
      changed = auth.changed() => {
        if !changed { break; }
        resolve(&*store, &*idp, auth.current(), &mut facility, &tx).await;
      }
      changed = facility_changed(&mut facility) => {
        if changed {
          remerge(&facility, &tx);
        } else {
          // The backend channel is gone; stop selecting on it.
          facility = None;
        }
      }
    }
  }

  // Tear both subscriptions down before the task exits.
  if let Some(mut w) = facility.take() {
    w.cancel();
  }
  auth.cancel();
}

/// Wait for the nested facility watch to change; pends forever while no
/// watch is open.
async fn facility_changed(watch: &mut Option<RecordWatch<Facility>>) -> bool {
  match watch {
    Some(w) => w.changed().await,
    None => std::future::pending().await,
  }
}

async fn resolve<S, I>(
  store: &S,
  idp: &I,
  identity: Option<AuthIdentity>,
  facility: &mut Option<RecordWatch<Facility>>,
  tx: &watch::Sender<SessionState>,
) where
  S: MarketStore,
  I: IdentityProvider,
{
  // Cancel the previous identity's nested watch before anything else, so
  // a stale emission can never follow an identity switch.
  if let Some(mut w) = facility.take() {
    w.cancel();
  }

  let Some(identity) = identity else {
    emit(tx, SessionState::SignedOut);
    return;
  };

  // Profile absence is the registration race, not an error; a failed
  // fetch degrades the same way.
  let profile = match store.get_profile(identity.subject_id).await {
    Ok(profile) => profile,
    Err(error) => {
      tracing::warn!(%error, "profile fetch failed; resolving without profile");
      None
    }
  };

  let claims = fetch_claims(idp, &identity).await;
  let role = Role::normalize(
    profile.as_ref().and_then(|p| p.raw_role.as_deref()),
    &claims,
  );

  let mut session = Session {
    identity,
    role,
    claims,
    profile,
    facility: None,
  };

  // Facility sessions get a nested live subscription on their record;
  // everyone else resolves once.
  if role == Role::Facility {
    match store.watch_facility(session.identity.subject_id).await {
      Ok(w) => {
        session.facility = w.current();
        *facility = Some(w);
      }
      Err(error) => {
        tracing::warn!(
          %error,
          "facility watch failed; resolving without facility record"
        );
      }
    }
  }

  emit(tx, SessionState::SignedIn(session));
}

/// Re-emit the current session with the latest facility value merged in.
fn remerge(
  facility: &Option<RecordWatch<Facility>>,
  tx: &watch::Sender<SessionState>,
) {
  let value = facility.as_ref().and_then(RecordWatch::current);
  tx.send_if_modified(|state| match state {
    SessionState::SignedIn(session) if session.facility != value => {
      session.facility = value;
      true
    }
    _ => false,
  });
}

fn emit(tx: &watch::Sender<SessionState>, next: SessionState) {
  tx.send_if_modified(|state| {
    if *state == next {
      false
    } else {
      *state = next;
      true
    }
  });
}
