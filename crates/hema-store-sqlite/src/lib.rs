//! SQLite backend for the hema marketplace.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. Provides both ports:
//! [`SqliteMarket`] (the document store) and [`LocalIdentity`] (a local,
//! password-verifying identity provider).

mod encode;
mod identity;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use identity::LocalIdentity;
pub use store::SqliteMarket;

#[cfg(test)]
mod tests;
