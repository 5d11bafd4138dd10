//! Core types and trait definitions for the hema blood-bank marketplace.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it; it depends on nothing proprietary.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod blood;
pub mod eligibility;
pub mod error;
pub mod facility;
pub mod gate;
pub mod identity;
pub mod ledger;
pub mod profile;
pub mod request;
pub mod role;
pub mod session;
pub mod store;
pub mod watch;

pub use error::{Error, Result};
