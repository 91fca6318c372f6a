//! Core types and trait definitions for Level Up! progress and billing state.
//!
//! This crate is deliberately free of HTTP and database dependencies. It owns
//! the client-side progress reducer, the billing reconciler, the per-field
//! sync merge and the entitlement gate. Storage backends implement
//! [`store::LevelUpStore`]; the HTTP layer and the client binary depend on
//! this crate, not the other way round.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod account;
pub mod achievements;
pub mod billing;
pub mod clock;
pub mod error;
pub mod gate;
pub mod journal;
pub mod machine;
pub mod progress;
pub mod store;
pub mod sync;

pub use error::{Error, Result};
