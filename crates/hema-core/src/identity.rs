//! The `IdentityProvider` trait — the managed identity service boundary.
//!
//! The provider owns accounts, tokens, and claims. This system reads
//! claims; it never writes them — the elevated-privilege flag is granted
//! by external administrative tooling.

use std::future::Future;

use serde::Deserialize;
use uuid::Uuid;

use crate::{role::Claims, session::AuthIdentity, watch::RecordWatch};

/// Credentials for account creation.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAccount {
  pub email:    String,
  pub password: String,
}

pub trait IdentityProvider: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Live stream of authentication events. The receiver holds the
  /// currently signed-in identity, or `None` when signed out.
  fn watch_auth(
    &self,
  ) -> impl Future<Output = Result<RecordWatch<AuthIdentity>, Self::Error>> + Send + '_;

  fn create_account(
    &self,
    account: NewAccount,
  ) -> impl Future<Output = Result<AuthIdentity, Self::Error>> + Send + '_;

  /// Used only by the registration rollback.
  fn delete_account(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Custom claims attached to the identity's token. Callers treat a
  /// failure here as a missing enhancement, not a hard error.
  fn token_claims(
    &self,
    id: Uuid,
  ) -> impl Future<Output = Result<Claims, Self::Error>> + Send + '_;

  /// Check credentials without changing the signed-in state. Returns
  /// `None` on unknown email or wrong password.
  fn verify_password<'a>(
    &'a self,
    email: &'a str,
    password: &'a str,
  ) -> impl Future<Output = Result<Option<AuthIdentity>, Self::Error>> + Send + 'a;
}
