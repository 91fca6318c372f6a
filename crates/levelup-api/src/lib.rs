//! JSON REST API for Level Up!.
//!
//! Exposes an axum [`Router`] backed by any [`LevelUpStore`], an
//! [`Authenticator`](auth::Authenticator) and a
//! [`Payments`](payments::Payments) collaborator. TLS and listening are the
//! caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", levelup_api::api_router(state))
//! ```

pub mod auth;
pub mod billing;
pub mod config;
pub mod error;
pub mod journal;
pub mod payments;
pub mod progress;
pub mod stripe;
pub mod subscription;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use levelup_core::store::LevelUpStore;
use tower_http::trace::TraceLayer;

pub use config::{ApiConfig, PlanPrices};
pub use error::ApiError;

use auth::Authenticator;
use payments::Payments;

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct AppState<S> {
  pub store:    Arc<S>,
  pub auth:     Arc<dyn Authenticator>,
  pub payments: Arc<dyn Payments>,
  pub config:   Arc<ApiConfig>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      store:    Arc::clone(&self.store),
      auth:     Arc::clone(&self.auth),
      payments: Arc::clone(&self.payments),
      config:   Arc::clone(&self.config),
    }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: AppState<S>) -> Router<()>
where
  S: LevelUpStore + 'static,
{
  Router::new()
    // Progress
    .route("/user/progress", get(progress::read::<S>).post(progress::write::<S>))
    .route("/user/subscription", get(subscription::summary))
    // Journals
    .route("/user/moods", get(journal::list_moods::<S>).post(journal::add_moods::<S>))
    .route("/user/iceberg", get(journal::list_iceberg::<S>).post(journal::add_iceberg::<S>))
    // Billing
    .route("/checkout", post(billing::checkout::<S>))
    .route("/portal", get(billing::portal::<S>))
    .route("/webhooks/stripe", post(billing::webhook::<S>))
    .route("/health", get(health))
    .layer(TraceLayer::new_for_http())
    .with_state(state)
}

async fn health() -> &'static str { "ok" }

#[cfg(test)]
mod tests;
