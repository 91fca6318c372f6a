//! Moving local state to and from the server.
//!
//! Progress is pulled before it is pushed, so the push only carries fields
//! this device changed. Journal entries are uploaded oldest first and are
//! only marked acknowledged once the server has accepted their batch.

use anyhow::Result;
use levelup_core::{
  clock::Clock,
  journal::{IcebergEntry, MoodEntry},
  machine::{ProgressMachine, SnapshotStore},
  progress::UserProgress,
  sync::ProgressPatch,
};

use crate::client::ApiClient;

/// The server side of a sync.
pub trait ProgressRemote {
  async fn fetch(&self) -> Result<UserProgress>;
  async fn push(&self, patch: &ProgressPatch) -> Result<UserProgress>;
  async fn upload_moods(&self, entries: &[MoodEntry]) -> Result<usize>;
  async fn upload_iceberg(&self, entries: &[IcebergEntry]) -> Result<usize>;
}

impl ProgressRemote for ApiClient {
  async fn fetch(&self) -> Result<UserProgress> { self.fetch_progress().await }

  async fn push(&self, patch: &ProgressPatch) -> Result<UserProgress> {
    self.push_progress(patch).await
  }

  async fn upload_moods(&self, entries: &[MoodEntry]) -> Result<usize> {
    ApiClient::upload_moods(self, entries).await
  }

  async fn upload_iceberg(&self, entries: &[IcebergEntry]) -> Result<usize> {
    ApiClient::upload_iceberg(self, entries).await
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
  /// Whether a progress patch was sent.
  pub pushed:            bool,
  /// Entries the server had not seen before.
  pub moods_uploaded:    usize,
  pub icebergs_uploaded: usize,
}

/// Fetch the stored progress and rebase local edits on top of it.
pub async fn pull<R, S, C>(remote: &R, machine: &mut ProgressMachine<S, C>) -> Result<()>
where
  R: ProgressRemote,
  S: SnapshotStore,
  C: Clock,
{
  let server = remote.fetch().await?;
  machine.sync_from_server(server)?;
  Ok(())
}

/// Send unconfirmed local changes. Returns `false` if there was nothing to
/// send.
pub async fn push<R, S, C>(remote: &R, machine: &mut ProgressMachine<S, C>) -> Result<bool>
where
  R: ProgressRemote,
  S: SnapshotStore,
  C: Clock,
{
  let patch = machine.pending_patch();
  if patch.is_empty() {
    return Ok(false);
  }
  let stored = remote.push(&patch).await?;
  machine.sync_from_server(stored)?;
  Ok(true)
}

/// Upload journal entries the server has not acknowledged yet.
pub async fn upload_logs<R, S, C>(
  remote: &R,
  machine: &mut ProgressMachine<S, C>,
) -> Result<(usize, usize)>
where
  R: ProgressRemote,
  S: SnapshotStore,
  C: Clock,
{
  let (moods, bergs) = machine.unsynced_logs();

  let moods_inserted = if moods.is_empty() {
    0
  } else {
    let inserted = remote.upload_moods(&moods).await?;
    machine.mark_logs_synced(moods.iter().map(|e| e.id))?;
    inserted
  };
  let bergs_inserted = if bergs.is_empty() {
    0
  } else {
    let inserted = remote.upload_iceberg(&bergs).await?;
    machine.mark_logs_synced(bergs.iter().map(|e| e.id))?;
    inserted
  };

  Ok((moods_inserted, bergs_inserted))
}

/// Pull, push, then upload journals.
pub async fn sync_all<R, S, C>(remote: &R, machine: &mut ProgressMachine<S, C>) -> Result<SyncReport>
where
  R: ProgressRemote,
  S: SnapshotStore,
  C: Clock,
{
  pull(remote, machine).await?;
  let pushed = push(remote, machine).await?;
  let (moods_uploaded, icebergs_uploaded) = upload_logs(remote, machine).await?;

  let report = SyncReport { pushed, moods_uploaded, icebergs_uploaded };
  tracing::info!(?report, "sync complete");
  Ok(report)
}
