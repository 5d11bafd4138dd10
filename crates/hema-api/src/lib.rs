//! JSON REST API for the hema marketplace.
//!
//! Exposes an axum [`Router`] backed by any [`MarketStore`] and
//! [`IdentityProvider`] pair. Requests authenticate with HTTP Basic
//! credentials; each protected route declares a gate policy that is
//! evaluated against a freshly resolved session snapshot.

pub mod auth;
pub mod donations;
pub mod error;
pub mod facilities;
pub mod registration;
pub mod requests;
pub mod session;

pub use error::Error;

use std::{path::PathBuf, sync::Arc};

use axum::{
  Router,
  routing::{get, post, put},
};
use hema_core::{identity::IdentityProvider, store::MarketStore};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

// ─── Configuration ───────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `config.toml`.
#[derive(Deserialize, Clone)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  pub store_path: PathBuf,
}

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all handlers. Owned by the composition
/// root and passed down explicitly.
pub struct AppState<S, I> {
  pub store: Arc<S>,
  pub idp:   Arc<I>,
}

impl<S, I> Clone for AppState<S, I> {
  fn clone(&self) -> Self {
    Self { store: Arc::clone(&self.store), idp: Arc::clone(&self.idp) }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the API router for a store/identity-provider pair.
pub fn router<S, I>(state: AppState<S, I>) -> Router
where
  S: MarketStore + 'static,
  I: IdentityProvider + 'static,
{
  Router::new()
    // Registration and sign-in
    .route("/register/donor", post(registration::donor::<S, I>))
    .route("/register/facility", post(registration::facility::<S, I>))
    .route("/session", post(session::create::<S, I>))
    // Facilities
    .route("/facilities", get(facilities::list::<S, I>))
    .route("/facilities/{id}", get(facilities::get_one::<S, I>))
    .route("/facilities/{id}/approval", post(facilities::approval::<S, I>))
    .route(
      "/facilities/{id}/inventory/{group}",
      put(facilities::set_inventory::<S, I>),
    )
    // Requests
    .route("/requests", post(requests::create::<S, I>))
    .route("/requests/{id}/complete", post(requests::complete::<S, I>))
    // Donations
    .route("/donations", post(donations::create::<S, I>))
    .route("/donations/{id}/complete", post(donations::complete::<S, I>))
    .route("/eligibility", get(donations::eligibility::<S, I>))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

// ─── Integration tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use base64::Engine as _;
  use base64::engine::general_purpose::STANDARD as B64;
  use chrono::{Days, Utc};
  use hema_core::{
    blood::BloodGroup,
    identity::{IdentityProvider, NewAccount},
    request::{Donation, FulfillmentStatus},
    store::MarketStore,
  };
  use hema_store_sqlite::{LocalIdentity, SqliteMarket};
  use serde_json::{Value, json};
  use tower::ServiceExt as _;
  use uuid::Uuid;

  use super::*;

  const PASSWORD: &str = "secret-password";

  async fn make_state() -> AppState<SqliteMarket, LocalIdentity> {
    AppState {
      store: Arc::new(SqliteMarket::open_in_memory().await.unwrap()),
      idp:   Arc::new(LocalIdentity::open_in_memory().await.unwrap()),
    }
  }

  fn basic(email: &str) -> String {
    format!("Basic {}", B64.encode(format!("{email}:{PASSWORD}")))
  }

  async fn send(
    state: AppState<SqliteMarket, LocalIdentity>,
    method: &str,
    uri: &str,
    auth: Option<&str>,
    body: Option<Value>,
  ) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(a) = auth {
      builder = builder.header(header::AUTHORIZATION, a);
    }
    let body = match body {
      Some(v) => {
        builder = builder.header(header::CONTENT_TYPE, "application/json");
        Body::from(v.to_string())
      }
      None => Body::empty(),
    };
    let resp = router(state)
      .oneshot(builder.body(body).unwrap())
      .await
      .unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
      .await
      .unwrap();
    let value = if bytes.is_empty() {
      Value::Null
    } else {
      serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
  }

  async fn register_donor(
    state: &AppState<SqliteMarket, LocalIdentity>,
    email: &str,
  ) -> Uuid {
    let (status, body) = send(
      state.clone(),
      "POST",
      "/register/donor",
      None,
      Some(json!({
        "account": { "email": email, "password": PASSWORD },
        "profile": {
          "display_name": "Donor",
          "email": email,
          "phone": null,
          "raw_role": "donor",
        },
      })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["subject_id"].as_str().unwrap().parse().unwrap()
  }

  async fn register_facility(
    state: &AppState<SqliteMarket, LocalIdentity>,
    email: &str,
  ) -> Uuid {
    let (status, body) = send(
      state.clone(),
      "POST",
      "/register/facility",
      None,
      Some(json!({
        "account": { "email": email, "password": PASSWORD },
        "profile": {
          "display_name": "Bank",
          "email": email,
          "phone": null,
          "raw_role": null,
        },
        "facility": {
          "name": "API Test Bank",
          "license_no": "LIC-9",
          "contact_phone": null,
          "address": null,
          "price_per_unit": 5000,
        },
      })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["subject_id"].as_str().unwrap().parse().unwrap()
  }

  /// Seed an admin account directly through the identity provider, the
  /// way external tooling grants the claim.
  async fn seed_admin(
    state: &AppState<SqliteMarket, LocalIdentity>,
    email: &str,
  ) {
    let identity = state
      .idp
      .create_account(NewAccount {
        email:    email.into(),
        password: PASSWORD.into(),
      })
      .await
      .unwrap();
    state
      .idp
      .set_admin_claim(identity.subject_id, true)
      .await
      .unwrap();
  }

  // ── Auth ────────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn unauthenticated_request_returns_401_with_challenge() {
    let state = make_state().await;
    let req = Request::builder()
      .method("POST")
      .uri(format!("/requests/{}/complete", Uuid::new_v4()))
      .body(Body::empty())
      .unwrap();
    let resp = router(state).oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().contains_key(header::WWW_AUTHENTICATE));
  }

  // ── Session ─────────────────────────────────────────────────────────────

  #[tokio::test]
  async fn session_with_wrong_role_tab_conflicts() {
    let state = make_state().await;
    register_donor(&state, "roletab@example.com").await;

    let (status, body) = send(
      state.clone(),
      "POST",
      "/session",
      None,
      Some(json!({
        "email": "roletab@example.com",
        "password": PASSWORD,
        "role": "facility",
      })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT, "{body}");
    let message = body["error"].as_str().unwrap();
    assert!(message.contains("donor"), "should name the actual role: {message}");

    let (status, body) = send(
      state,
      "POST",
      "/session",
      None,
      Some(json!({
        "email": "roletab@example.com",
        "password": PASSWORD,
        "role": "donor",
      })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["role"], "donor");
  }

  // ── Approval flow ───────────────────────────────────────────────────────

  #[tokio::test]
  async fn admin_approval_unlocks_public_listing() {
    let state = make_state().await;
    let facility_id = register_facility(&state, "listed@example.com").await;
    seed_admin(&state, "admin@example.com").await;

    // Pending facilities are not browsable.
    let (_, listed) =
      send(state.clone(), "GET", "/facilities", None, None).await;
    assert_eq!(listed.as_array().unwrap().len(), 0);

    let (status, body) = send(
      state.clone(),
      "POST",
      &format!("/facilities/{facility_id}/approval"),
      Some(&basic("admin@example.com")),
      Some(json!({ "decision": "approved" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["status"], "approved");
    assert!(body["rejected_at"].is_null());

    let (_, listed) = send(state, "GET", "/facilities", None, None).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);
  }

  #[tokio::test]
  async fn non_admin_cannot_transition_approval() {
    let state = make_state().await;
    let facility_id = register_facility(&state, "victim@example.com").await;
    register_donor(&state, "mallory@example.com").await;

    let (status, _) = send(
      state,
      "POST",
      &format!("/facilities/{facility_id}/approval"),
      Some(&basic("mallory@example.com")),
      Some(json!({ "decision": "approved" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
  }

  #[tokio::test]
  async fn pending_facility_cannot_manage_inventory() {
    let state = make_state().await;
    let facility_id = register_facility(&state, "pending@example.com").await;

    let (status, body) = send(
      state,
      "PUT",
      &format!("/facilities/{facility_id}/inventory/O%2B"),
      Some(&basic("pending@example.com")),
      Some(json!({ "units": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["redirect"], "home");
  }

  // ── Marketplace flow ────────────────────────────────────────────────────

  #[tokio::test]
  async fn request_lifecycle_end_to_end() {
    let state = make_state().await;
    let facility_id = register_facility(&state, "market@example.com").await;
    seed_admin(&state, "boss@example.com").await;
    register_donor(&state, "buyer@example.com").await;

    send(
      state.clone(),
      "POST",
      &format!("/facilities/{facility_id}/approval"),
      Some(&basic("boss@example.com")),
      Some(json!({ "decision": "approved" })),
    )
    .await;

    let (status, body) = send(
      state.clone(),
      "PUT",
      &format!("/facilities/{facility_id}/inventory/O-"),
      Some(&basic("market@example.com")),
      Some(json!({ "units": 10 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let (status, request) = send(
      state.clone(),
      "POST",
      "/requests",
      Some(&basic("buyer@example.com")),
      Some(json!({
        "facility_id": facility_id,
        "blood_group": "O-",
        "units": 4,
      })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{request}");
    assert_eq!(request["total_cost"], 20000);
    let request_id = request["request_id"].as_str().unwrap();

    let (status, completed) = send(
      state.clone(),
      "POST",
      &format!("/requests/{request_id}/complete"),
      Some(&basic("market@example.com")),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{completed}");
    assert_eq!(completed["status"], "completed");

    // Completing twice conflicts instead of double-counting.
    let (status, _) = send(
      state.clone(),
      "POST",
      &format!("/requests/{request_id}/complete"),
      Some(&basic("market@example.com")),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let ledger = state
      .store
      .get_ledger(facility_id)
      .await
      .unwrap()
      .expect("ledger created");
    assert_eq!(ledger.total_revenue, 20000);
    assert_eq!(ledger.completed_transactions, 1);
  }

  // ── Donations ───────────────────────────────────────────────────────────

  #[tokio::test]
  async fn donation_inside_window_is_unprocessable() {
    let state = make_state().await;
    let facility_id = register_facility(&state, "dbank@example.com").await;
    seed_admin(&state, "dadmin@example.com").await;
    let donor_id = register_donor(&state, "donor@example.com").await;

    send(
      state.clone(),
      "POST",
      &format!("/facilities/{facility_id}/approval"),
      Some(&basic("dadmin@example.com")),
      Some(json!({ "decision": "approved" })),
    )
    .await;

    // A completed donation 30 days ago.
    let today = Utc::now().date_naive();
    state
      .store
      .put_donation(&Donation {
        donation_id:    Uuid::new_v4(),
        donor_id,
        facility_id,
        blood_group:    BloodGroup::APositive,
        preferred_date: today.checked_sub_days(Days::new(30)).unwrap(),
        status:         FulfillmentStatus::Completed,
        created_at:     Utc::now(),
        completed_at:   Some(Utc::now()),
      })
      .await
      .unwrap();

    let (status, body) = send(
      state.clone(),
      "POST",
      "/donations",
      Some(&basic("donor@example.com")),
      Some(json!({
        "facility_id": facility_id,
        "blood_group": "A+",
        "preferred_date": today,
      })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");
    let expected = today.checked_add_days(Days::new(60)).unwrap();
    assert_eq!(body["next_eligible"], json!(expected));

    let (status, advisory) = send(
      state,
      "GET",
      "/eligibility",
      Some(&basic("donor@example.com")),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(advisory["eligible"], false);
    assert_eq!(advisory["days_left"], 60);
  }

  #[tokio::test]
  async fn fresh_donor_is_eligible_now() {
    let state = make_state().await;
    register_donor(&state, "fresh@example.com").await;

    let (status, advisory) = send(
      state,
      "GET",
      "/eligibility",
      Some(&basic("fresh@example.com")),
      None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(advisory["eligible"], true);
    assert_eq!(advisory["band"], "ready");
  }
}
