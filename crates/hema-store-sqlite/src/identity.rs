//! [`LocalIdentity`] — a password-verifying identity provider backed by
//! the same SQLite database.
//!
//! Plays the role of the managed identity service: it owns accounts and
//! token claims, and drives the auth event stream consumed by the session
//! resolver. Passwords are stored as argon2 PHC strings.

use std::sync::{Arc, Mutex, PoisonError};

use argon2::{
  Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
  password_hash::SaltString,
};
use chrono::Utc;
use rand_core::OsRng;
use rusqlite::OptionalExtension as _;
use tokio::sync::watch;
use uuid::Uuid;

use hema_core::{
  identity::{IdentityProvider, NewAccount},
  role::Claims,
  session::AuthIdentity,
  watch::{RecordWatch, Subscription},
};

use crate::{
  Error, Result,
  encode::{decode_uuid, encode_dt, encode_uuid},
  schema::SCHEMA,
};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
  mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cloning is cheap — connection and auth channel are shared.
#[derive(Clone)]
pub struct LocalIdentity {
  conn:     tokio_rusqlite::Connection,
  /// The single signed-in identity, mirroring a client-side auth SDK.
  auth:     Arc<watch::Sender<Option<AuthIdentity>>>,
  watchers: Arc<Mutex<usize>>,
}

impl LocalIdentity {
  pub async fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn).await
  }

  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn).await
  }

  async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
    conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(Self {
      conn,
      auth: Arc::new(watch::channel(None).0),
      watchers: Arc::new(Mutex::new(0)),
    })
  }

  /// Verify credentials and publish the identity as signed in.
  pub async fn sign_in(
    &self,
    email: &str,
    password: &str,
  ) -> Result<AuthIdentity> {
    let identity = self
      .verify_password(email, password)
      .await?
      .ok_or(Error::BadCredentials)?;
    self.auth.send_replace(Some(identity.clone()));
    Ok(identity)
  }

  pub fn sign_out(&self) {
    self.auth.send_replace(None);
  }

  /// Number of live auth watch guards. Test probe for subscription leaks.
  pub fn auth_watch_count(&self) -> usize {
    *lock(&self.watchers)
  }

  /// The write surface used by external administrative tooling (and
  /// tests). The application itself only ever reads claims.
  pub async fn set_admin_claim(&self, id: Uuid, admin: bool) -> Result<()> {
    let claims = Claims { admin, ..Claims::default() };
    let id_str = encode_uuid(id);
    let json   = serde_json::to_string(&claims)?;

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR REPLACE INTO claims (subject_id, claims_json)
           VALUES (?1, ?2)",
          rusqlite::params![id_str, json],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── IdentityProvider impl ───────────────────────────────────────────────────

impl IdentityProvider for LocalIdentity {
  type Error = Error;

  async fn watch_auth(&self) -> Result<RecordWatch<AuthIdentity>> {
    let rx = self.auth.subscribe();
    *lock(&self.watchers) += 1;

    let watchers = Arc::clone(&self.watchers);
    let guard = Subscription::new(move || {
      *lock(&watchers) -= 1;
    });

    Ok(RecordWatch { rx, guard })
  }

  async fn create_account(&self, account: NewAccount) -> Result<AuthIdentity> {
    let subject_id = Uuid::new_v4();

    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(account.password.as_bytes(), &salt)
      .map_err(|e| Error::PasswordHash(e.to_string()))?
      .to_string();

    let id_str     = encode_uuid(subject_id);
    let email      = account.email.clone();
    let created_at = encode_dt(Utc::now());

    let taken: bool = self
      .conn
      .call(move |conn| {
        let taken: bool = conn
          .query_row(
            "SELECT 1 FROM accounts WHERE email = ?1",
            rusqlite::params![email],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);

        if !taken {
          conn.execute(
            "INSERT INTO accounts (subject_id, email, password_hash, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![id_str, email, hash, created_at],
          )?;
        }
        Ok(taken)
      })
      .await?;

    if taken {
      return Err(Error::EmailTaken(account.email));
    }

    Ok(AuthIdentity { subject_id, email: account.email })
  }

  async fn delete_account(&self, id: Uuid) -> Result<()> {
    let id_str = encode_uuid(id);
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "DELETE FROM accounts WHERE subject_id = ?1",
          rusqlite::params![id_str],
        )?;
        Ok(())
      })
      .await?;

    // A deleted identity cannot stay signed in.
    if self.auth.borrow().as_ref().is_some_and(|a| a.subject_id == id) {
      self.auth.send_replace(None);
    }
    Ok(())
  }

  async fn token_claims(&self, id: Uuid) -> Result<Claims> {
    let id_str = encode_uuid(id);

    // Outer None: no such account. Inner None: account with no claims.
    let row: Option<Option<String>> = self
      .conn
      .call(move |conn| {
        let exists: bool = conn
          .query_row(
            "SELECT 1 FROM accounts WHERE subject_id = ?1",
            rusqlite::params![id_str],
            |_| Ok(true),
          )
          .optional()?
          .unwrap_or(false);

        if !exists {
          return Ok(None);
        }

        let json: Option<String> = conn
          .query_row(
            "SELECT claims_json FROM claims WHERE subject_id = ?1",
            rusqlite::params![id_str],
            |row| row.get(0),
          )
          .optional()?;

        Ok(Some(json))
      })
      .await?;

    match row {
      None => Err(Error::AccountNotFound(id)),
      Some(None) => Ok(Claims::default()),
      Some(Some(json)) => Ok(serde_json::from_str(&json)?),
    }
  }

  async fn verify_password(
    &self,
    email: &str,
    password: &str,
  ) -> Result<Option<AuthIdentity>> {
    let email_owned = email.to_string();

    let row: Option<(String, String)> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT subject_id, password_hash FROM accounts WHERE email = ?1",
              rusqlite::params![email_owned],
              |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?,
        )
      })
      .await?;

    let Some((id_str, hash)) = row else { return Ok(None) };

    let parsed = PasswordHash::new(&hash)
      .map_err(|e| Error::PasswordHash(e.to_string()))?;
    if Argon2::default()
      .verify_password(password.as_bytes(), &parsed)
      .is_err()
    {
      return Ok(None);
    }

    Ok(Some(AuthIdentity {
      subject_id: decode_uuid(&id_str)?,
      email:      email.to_string(),
    }))
  }
}
