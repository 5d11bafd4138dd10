//! Error type for `hema-store-sqlite`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored enum token no longer matches any known variant.
  #[error("unknown {field} token: {token:?}")]
  UnknownToken { field: &'static str, token: String },

  #[error("password hash error: {0}")]
  PasswordHash(String),

  #[error("an account with email {0:?} already exists")]
  EmailTaken(String),

  #[error("account not found: {0}")]
  AccountNotFound(Uuid),

  #[error("invalid credentials")]
  BadCredentials,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
