//! Stateful workflows for the hema marketplace: session resolution,
//! facility approval, fulfillment, and registration.
//!
//! Everything here is generic over the `hema-core` ports; no HTTP and no
//! database code. The composition root constructs these with whatever
//! backend it has and passes them down — there is no ambient global
//! session state.

pub mod approval;
pub mod error;
pub mod fulfillment;
pub mod registration;
pub mod session;

pub use error::{Error, Result};
