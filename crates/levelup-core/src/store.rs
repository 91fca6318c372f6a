//! The `LevelUpStore` trait: the persistence boundary.
//!
//! Implemented by storage backends (e.g. `levelup-store-sqlite`). The HTTP
//! layer and the billing reconciler depend on this abstraction, not on any
//! concrete backend.

use std::future::Future;

use crate::{
  account::{Identity, UserAccount},
  billing::SubscriptionChange,
  journal::{IcebergEntry, MoodEntry},
  progress::UserProgress,
  sync::ProgressPatch,
};

/// Abstraction over the server-side record of accounts, progress and
/// journals.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait LevelUpStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Accounts ──────────────────────────────────────────────────────────

  /// Return the account for `identity`, creating an `INACTIVE` one if none
  /// exists yet. An existing account is returned as stored.
  fn ensure_account<'a>(
    &'a self,
    identity: &'a Identity,
  ) -> impl Future<Output = Result<UserAccount, Self::Error>> + Send + 'a;

  fn get_account<'a>(
    &'a self,
    user_id: &'a str,
  ) -> impl Future<Output = Result<Option<UserAccount>, Self::Error>> + Send + 'a;

  /// Look an account up by its payments-provider customer id.
  fn find_account_by_customer<'a>(
    &'a self,
    customer_id: &'a str,
  ) -> impl Future<Output = Result<Option<UserAccount>, Self::Error>> + Send + 'a;

  /// Write the subscription fields named by `change`. Returns the updated
  /// account, or `None` if `user_id` does not exist.
  fn apply_subscription_change<'a>(
    &'a self,
    user_id: &'a str,
    change: &'a SubscriptionChange,
  ) -> impl Future<Output = Result<Option<UserAccount>, Self::Error>> + Send + 'a;

  // ── Progress ──────────────────────────────────────────────────────────

  /// Read the user's progress, creating an all-default row on a miss.
  fn get_or_create_progress<'a>(
    &'a self,
    user_id: &'a str,
  ) -> impl Future<Output = Result<UserProgress, Self::Error>> + Send + 'a;

  /// Replace each field present in `patch`; create the row (patch over
  /// defaults) if it does not exist. Returns the stored result.
  fn upsert_progress<'a>(
    &'a self,
    user_id: &'a str,
    patch: &'a ProgressPatch,
  ) -> impl Future<Output = Result<UserProgress, Self::Error>> + Send + 'a;

  // ── Journals (append-only) ────────────────────────────────────────────

  /// Insert entries whose ids are not stored yet. Returns how many were new.
  fn add_mood_entries<'a>(
    &'a self,
    user_id: &'a str,
    entries: &'a [MoodEntry],
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + 'a;

  /// Newest first.
  fn list_mood_entries<'a>(
    &'a self,
    user_id: &'a str,
  ) -> impl Future<Output = Result<Vec<MoodEntry>, Self::Error>> + Send + 'a;

  fn add_iceberg_entries<'a>(
    &'a self,
    user_id: &'a str,
    entries: &'a [IcebergEntry],
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + 'a;

  /// Newest first.
  fn list_iceberg_entries<'a>(
    &'a self,
    user_id: &'a str,
  ) -> impl Future<Output = Result<Vec<IcebergEntry>, Self::Error>> + Send + 'a;
}
