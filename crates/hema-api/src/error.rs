//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! User-visible policy: authorization failures carry their redirect
//! target; role conflicts name the mismatched role; partial failures and
//! upstream trouble show a generic retry prompt while the detail is
//! logged server-side.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use chrono::NaiveDate;
use hema_core::gate::Target;
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum Error {
  #[error("unauthorized")]
  Unauthorized,

  /// The gate denied access; the payload carries the redirect target.
  #[error("forbidden")]
  Forbidden(Target),

  #[error("not found: {0}")]
  NotFound(String),

  #[error("conflict: {0}")]
  Conflict(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  /// The donor's eligibility window has not elapsed.
  #[error("donor not yet eligible; next eligible on {next_eligible}")]
  Window { next_eligible: NaiveDate },

  /// Partial failure or upstream trouble. The caller gets a generic
  /// retry prompt; the context has already been logged.
  #[error("temporarily unavailable")]
  Unavailable,
}

impl Error {
  /// Log an upstream failure and degrade it to the generic retry prompt.
  pub fn upstream(error: impl std::fmt::Display) -> Self {
    tracing::error!(%error, "upstream call failed");
    Error::Unavailable
  }
}

impl From<hema_engine::Error> for Error {
  fn from(e: hema_engine::Error) -> Self {
    match e {
      hema_engine::Error::Domain(domain) => match domain {
        hema_core::Error::NotFound { kind, id } => {
          Error::NotFound(format!("{kind} {id}"))
        }
        hema_core::Error::RoleMismatch { .. } => {
          Error::Conflict(domain.to_string())
        }
        hema_core::Error::NotPending { .. } => {
          Error::Conflict(domain.to_string())
        }
        hema_core::Error::DonationWindow { next_eligible } => {
          Error::Window { next_eligible }
        }
        hema_core::Error::FacilityNotApproved { .. } => {
          Error::Forbidden(Target::Home)
        }
        hema_core::Error::InsufficientStock { .. } => {
          Error::Conflict(domain.to_string())
        }
      },
      other => Error::upstream(other),
    }
  }
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    match self {
      Error::Unauthorized => {
        let mut res = (
          StatusCode::UNAUTHORIZED,
          Json(json!({ "error": "unauthorized" })),
        )
          .into_response();
        res.headers_mut().insert(
          header::WWW_AUTHENTICATE,
          HeaderValue::from_static("Basic realm=\"hema\""),
        );
        res
      }
      Error::Forbidden(target) => (
        StatusCode::FORBIDDEN,
        Json(json!({ "error": "forbidden", "redirect": target })),
      )
        .into_response(),
      Error::NotFound(m) => {
        (StatusCode::NOT_FOUND, Json(json!({ "error": m }))).into_response()
      }
      Error::Conflict(m) => {
        (StatusCode::CONFLICT, Json(json!({ "error": m }))).into_response()
      }
      Error::BadRequest(m) => {
        (StatusCode::BAD_REQUEST, Json(json!({ "error": m }))).into_response()
      }
      Error::Window { next_eligible } => (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(json!({
          "error": "donor is inside the 90-day eligibility window",
          "next_eligible": next_eligible,
        })),
      )
        .into_response(),
      Error::Unavailable => (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "error": "temporarily unavailable, please retry" })),
      )
        .into_response(),
    }
  }
}
