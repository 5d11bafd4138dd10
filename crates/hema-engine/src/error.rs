//! Error type for `hema-engine` workflows.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error(transparent)]
  Domain(#[from] hema_core::Error),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("identity provider error: {0}")]
  Identity(#[source] Box<dyn std::error::Error + Send + Sync>),

  /// A multi-step workflow stopped partway. Never retried automatically:
  /// re-running a ledger credit after a partial success double-counts
  /// revenue.
  #[error("{operation} partially applied (completed: {completed:?}): {source}")]
  Partial {
    operation: &'static str,
    completed: Vec<&'static str>,
    #[source]
    source:    Box<dyn std::error::Error + Send + Sync>,
  },
}

impl Error {
  pub fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Error::Store(Box::new(e))
  }

  pub fn identity(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Error::Identity(Box::new(e))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
