//! Session handling: which screen to show after an authentication change.
//!
//! The subscription status is fetched fresh on every change and never kept
//! between calls.

use anyhow::Result;
use levelup_core::{
  clock::Clock,
  gate::{Screen, SubscriptionSummary},
  machine::{ProgressMachine, SnapshotStore},
};

use crate::client::ApiClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthEvent {
  SignedIn,
  TokenRefreshed,
  SignedOut,
}

/// Where the current subscription status comes from.
pub trait SubscriptionSource {
  /// `None` when there is no valid session.
  async fn current_subscription(&self) -> Result<Option<SubscriptionSummary>>;
}

impl SubscriptionSource for ApiClient {
  async fn current_subscription(&self) -> Result<Option<SubscriptionSummary>> {
    if !self.is_signed_in() {
      return Ok(None);
    }
    self.fetch_subscription().await
  }
}

/// Resolve the screen for `event`. Reaching [`Screen::Unlocked`] records
/// today's activity on the streak.
pub async fn on_auth_change<Src, S, C>(
  event: AuthEvent,
  source: &Src,
  machine: &mut ProgressMachine<S, C>,
) -> Result<Screen>
where
  Src: SubscriptionSource,
  S: SnapshotStore,
  C: Clock,
{
  let status = match event {
    AuthEvent::SignedOut => None,
    AuthEvent::SignedIn | AuthEvent::TokenRefreshed => {
      source.current_subscription().await?.map(|s| s.status)
    }
  };

  let screen = Screen::for_status(status);
  tracing::debug!(?event, ?status, ?screen, "resolved screen");

  if screen == Screen::Unlocked && machine.update_streak()? {
    tracing::debug!(streak = machine.progress().current_streak, "recorded activity");
  }
  Ok(screen)
}
