//! Error types for `levelup-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("level id out of range: {0} (expected 1..=8)")]
  InvalidLevel(u8),

  #[error("mood intensity out of range: {0} (expected 1..=10)")]
  InvalidIntensity(u8),

  #[error("unknown plan: {0:?}")]
  UnknownPlan(String),

  #[error("unknown subscription status: {0:?}")]
  UnknownStatus(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
