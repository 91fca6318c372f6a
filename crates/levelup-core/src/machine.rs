//! The client-side progress state machine.
//!
//! [`ProgressMachine`] owns a working copy of [`UserProgress`] plus the two
//! journals and applies the transitions the front end dispatches. It is an
//! ordinary value: construct one per session and hand it to whatever needs
//! it.
//!
//! Each transition runs against a copy of the state, the copy is written to
//! the [`SnapshotStore`], and only then does it replace the in-memory state.
//! A failed write therefore leaves the machine exactly as it was.

use std::{
  cell::{Cell, RefCell},
  collections::BTreeSet,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{
  achievements::{self, Achievement},
  clock::{Clock, SystemClock},
  journal::{IcebergEntry, MoodEntry, NewIcebergEntry, NewMoodEntry},
  progress::{
    CalmDownKit, LEVEL_COMPLETION_REWARD, LevelData, LevelId, UserProgress, dedup_in_order,
  },
  sync::{self, ProgressPatch},
};

// ─── Persisted state ─────────────────────────────────────────────────────────

/// Everything the machine persists locally between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LocalState {
  /// Working copy, optimistically updated.
  pub progress:        UserProgress,
  /// Last progress the server confirmed; `None` before the first sync.
  pub confirmed:       Option<UserProgress>,
  /// Newest first.
  pub mood_logs:       Vec<MoodEntry>,
  /// Newest first.
  pub iceberg_entries: Vec<IcebergEntry>,
  /// Ids of journal entries the server has acknowledged.
  pub synced_log_ids:  BTreeSet<Uuid>,
}

/// Durable local storage for [`LocalState`].
pub trait SnapshotStore {
  type Error: std::error::Error + Send + Sync + 'static;

  /// The last saved state, or `None` if nothing has been saved yet.
  fn load(&self) -> Result<Option<LocalState>, Self::Error>;

  /// Persist `state`. Must not return before the write is durable enough to
  /// survive the process exiting.
  fn save(&self, state: &LocalState) -> Result<(), Self::Error>;
}

/// Keeps the snapshot in memory. Writes can be made to fail for testing.
#[derive(Debug, Default)]
pub struct MemorySnapshots {
  saved:       RefCell<Option<LocalState>>,
  saves:       Cell<usize>,
  fail_writes: Cell<bool>,
}

#[derive(Debug, Error)]
#[error("snapshot write refused")]
pub struct SnapshotWriteRefused;

impl MemorySnapshots {
  pub fn new() -> Self { Self::default() }

  pub fn with_state(state: LocalState) -> Self {
    Self { saved: RefCell::new(Some(state)), ..Self::default() }
  }

  pub fn saved(&self) -> Option<LocalState> { self.saved.borrow().clone() }

  /// Number of successful writes so far.
  pub fn save_count(&self) -> usize { self.saves.get() }

  pub fn fail_writes(&self, fail: bool) { self.fail_writes.set(fail) }
}

impl SnapshotStore for MemorySnapshots {
  type Error = SnapshotWriteRefused;

  fn load(&self) -> Result<Option<LocalState>, Self::Error> { Ok(self.saved()) }

  fn save(&self, state: &LocalState) -> Result<(), Self::Error> {
    if self.fail_writes.get() {
      return Err(SnapshotWriteRefused);
    }
    *self.saved.borrow_mut() = Some(state.clone());
    self.saves.set(self.saves.get() + 1);
    Ok(())
  }
}

// ─── Machine ─────────────────────────────────────────────────────────────────

pub struct ProgressMachine<S, C = SystemClock> {
  state:     LocalState,
  snapshots: S,
  clock:     C,
}

impl<S: SnapshotStore, C: Clock> ProgressMachine<S, C> {
  /// Restore from `snapshots`, starting from defaults if nothing was saved.
  pub fn load(snapshots: S, clock: C) -> Result<Self, S::Error> {
    let state = snapshots.load()?.unwrap_or_default();
    Ok(Self { state, snapshots, clock })
  }

  pub fn state(&self) -> &LocalState { &self.state }

  pub fn progress(&self) -> &UserProgress { &self.state.progress }

  pub fn mood_logs(&self) -> &[MoodEntry] { &self.state.mood_logs }

  pub fn iceberg_entries(&self) -> &[IcebergEntry] { &self.state.iceberg_entries }

  pub fn snapshots(&self) -> &S { &self.snapshots }

  pub fn clock(&self) -> &C { &self.clock }

  pub fn achievements(&self) -> Vec<Achievement> {
    achievements::unlocked(&self.state.progress, self.state.mood_logs.len())
  }

  /// Run `f` against a copy of the state; persist and commit the copy if it
  /// differs from the current state.
  fn transition<R>(&mut self, f: impl FnOnce(&mut LocalState) -> R) -> Result<R, S::Error> {
    let mut next = self.state.clone();
    let out = f(&mut next);
    if next != self.state {
      self.snapshots.save(&next)?;
      self.state = next;
    }
    Ok(out)
  }

  // ── Progress transitions ────────────────────────────────────────────────

  pub fn add_stars(&mut self, amount: u32) -> Result<(), S::Error> {
    self.transition(|s| {
      s.progress.total_stars = s.progress.total_stars.saturating_add(amount);
    })
  }

  /// Mark `level` complete, award its badge and the completion reward.
  /// Returns `false` (and changes nothing) if it was already complete.
  pub fn complete_level(&mut self, level: LevelId) -> Result<bool, S::Error> {
    self.transition(|s| {
      let p = &mut s.progress;
      if p.completed_levels.contains(&level) {
        return false;
      }
      p.completed_levels.push(level);
      if !p.earned_badges.contains(&level) {
        p.earned_badges.push(level);
      }
      p.total_stars = p.total_stars.saturating_add(LEVEL_COMPLETION_REWARD);
      true
    })
  }

  /// Shallow-merge `data` into the level's scratch map.
  pub fn update_level_progress(
    &mut self,
    level: LevelId,
    data: LevelData,
  ) -> Result<(), S::Error> {
    self.transition(|s| {
      s.progress.level_progress.entry(level).or_default().extend(data);
    })
  }

  /// Record activity today. Returns `false` if today was already counted.
  pub fn update_streak(&mut self) -> Result<bool, S::Error> {
    let today = self.clock.today();
    self.transition(|s| {
      let p = &mut s.progress;
      if p.last_active_date == Some(today) {
        return false;
      }
      let continues = p.last_active_date.is_some() && p.last_active_date == today.pred_opt();
      p.current_streak = if continues { p.current_streak.saturating_add(1) } else { 1 };
      p.longest_streak = p.longest_streak.max(p.current_streak);
      p.last_active_date = Some(today);
      true
    })
  }

  pub fn update_calm_down_kit(&mut self, kit: CalmDownKit) -> Result<(), S::Error> {
    self.transition(|s| s.progress.calm_down_kit = kit.normalized())
  }

  pub fn update_qualities(&mut self, mut qualities: Vec<String>) -> Result<(), S::Error> {
    dedup_in_order(&mut qualities);
    self.transition(|s| s.progress.my_qualities = qualities)
  }

  // ── Journals ────────────────────────────────────────────────────────────

  pub fn add_mood_log(&mut self, entry: NewMoodEntry) -> Result<MoodEntry, S::Error> {
    let entry = entry.record(Uuid::new_v4(), self.clock.now());
    self.transition(|s| s.mood_logs.insert(0, entry.clone()))?;
    Ok(entry)
  }

  pub fn add_iceberg_entry(&mut self, entry: NewIcebergEntry) -> Result<IcebergEntry, S::Error> {
    let entry = entry.record(Uuid::new_v4(), self.clock.now());
    self.transition(|s| s.iceberg_entries.insert(0, entry.clone()))?;
    Ok(entry)
  }

  /// Journal entries the server has not acknowledged yet, in the order
  /// they were recorded. Timestamps play no part, so entries made after the
  /// device clock stepped backwards are still found.
  pub fn unsynced_logs(&self) -> (Vec<MoodEntry>, Vec<IcebergEntry>) {
    let synced = &self.state.synced_log_ids;
    let moods = self.state.mood_logs.iter().rev().filter(|e| !synced.contains(&e.id)).cloned();
    let bergs =
      self.state.iceberg_entries.iter().rev().filter(|e| !synced.contains(&e.id)).cloned();
    (moods.collect(), bergs.collect())
  }

  pub fn mark_logs_synced(&mut self, ids: impl IntoIterator<Item = Uuid>) -> Result<(), S::Error> {
    self.transition(|s| s.synced_log_ids.extend(ids))
  }

  // ── Reset ───────────────────────────────────────────────────────────────

  /// Wipe progress and both journals. The confirmed snapshot is kept so the
  /// next push sends the cleared values to the server.
  pub fn reset(&mut self) -> Result<(), S::Error> {
    self.transition(|s| {
      s.progress = UserProgress::default();
      s.mood_logs.clear();
      s.iceberg_entries.clear();
      s.synced_log_ids.clear();
    })
  }

  // ── Server sync ─────────────────────────────────────────────────────────

  /// What to send to the server: every field changed since the confirmed
  /// snapshot, or since the defaults if nothing was confirmed yet.
  pub fn pending_patch(&self) -> ProgressPatch {
    sync::unsent(self.state.confirmed.as_ref(), &self.state.progress)
  }

  /// Adopt `server` as the confirmed snapshot and rebase unsent local edits
  /// on top of it. Used both for push replies and pulls.
  pub fn sync_from_server(&mut self, server: UserProgress) -> Result<(), S::Error> {
    self.transition(|s| {
      s.progress = sync::rebase(s.confirmed.as_ref(), &s.progress, &server);
      s.confirmed = Some(server);
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::NaiveDate;

  use super::*;
  use crate::{
    clock::FixedClock,
    journal::Intensity,
    progress::LevelValue,
  };

  fn date(y: i32, m: u32, d: u32) -> NaiveDate { NaiveDate::from_ymd_opt(y, m, d).unwrap() }

  fn level(id: u8) -> LevelId { LevelId::new(id).unwrap() }

  fn machine_on(day: NaiveDate) -> ProgressMachine<MemorySnapshots, FixedClock> {
    ProgressMachine::load(MemorySnapshots::new(), FixedClock::on(day)).unwrap()
  }

  // ── Stars and levels ──────────────────────────────────────────────────────

  #[test]
  fn add_stars_accumulates_and_persists() {
    let mut m = machine_on(date(2024, 1, 1));
    m.add_stars(2).unwrap();
    m.add_stars(5).unwrap();
    assert_eq!(m.progress().total_stars, 7);
    assert_eq!(m.snapshots().saved().unwrap().progress.total_stars, 7);
  }

  #[test]
  fn complete_level_is_idempotent() {
    let mut m = machine_on(date(2024, 1, 1));
    assert!(m.complete_level(level(3)).unwrap());
    assert!(!m.complete_level(level(3)).unwrap());
    assert!(!m.complete_level(level(3)).unwrap());

    let p = m.progress();
    assert_eq!(p.completed_levels, vec![level(3)]);
    assert_eq!(p.earned_badges, vec![level(3)]);
    assert_eq!(p.total_stars, LEVEL_COMPLETION_REWARD);
  }

  #[test]
  fn repeated_completion_does_not_write_again() {
    let mut m = machine_on(date(2024, 1, 1));
    m.complete_level(level(1)).unwrap();
    let writes = m.snapshots().save_count();
    m.complete_level(level(1)).unwrap();
    assert_eq!(m.snapshots().save_count(), writes);
  }

  #[test]
  fn completion_order_is_preserved() {
    let mut m = machine_on(date(2024, 1, 1));
    for id in [4, 1, 7, 1, 4] {
      m.complete_level(level(id)).unwrap();
    }
    assert_eq!(m.progress().completed_levels, vec![level(4), level(1), level(7)]);
    assert_eq!(m.progress().total_stars, 30);
  }

  #[test]
  fn level_progress_is_shallow_merged() {
    let mut m = machine_on(date(2024, 1, 1));
    let mut first = LevelData::new();
    first.insert("step".into(), LevelValue::Number(1.0));
    first.insert("choice".into(), "B".into());
    m.update_level_progress(level(1), first).unwrap();

    let mut second = LevelData::new();
    second.insert("step".into(), LevelValue::Number(2.0));
    m.update_level_progress(level(1), second).unwrap();

    let data = m.progress().level_data(level(1)).unwrap();
    assert_eq!(data["step"], LevelValue::Number(2.0));
    assert_eq!(data["choice"], LevelValue::Text("B".into()));
  }

  // ── Streaks ───────────────────────────────────────────────────────────────

  #[test]
  fn first_activity_starts_streak() {
    let mut m = machine_on(date(2024, 1, 1));
    assert!(m.update_streak().unwrap());
    let p = m.progress();
    assert_eq!(p.current_streak, 1);
    assert_eq!(p.longest_streak, 1);
    assert_eq!(p.last_active_date, Some(date(2024, 1, 1)));
  }

  #[test]
  fn same_day_is_counted_once() {
    let mut m = machine_on(date(2024, 1, 1));
    m.update_streak().unwrap();
    let before = m.progress().clone();
    assert!(!m.update_streak().unwrap());
    assert_eq!(m.progress(), &before);
  }

  #[test]
  fn consecutive_day_extends_streak() {
    let mut m = machine_on(date(2024, 1, 1));
    m.update_streak().unwrap();
    m.clock().set_date(date(2024, 1, 2));
    m.update_streak().unwrap();
    assert_eq!(m.progress().current_streak, 2);
    assert_eq!(m.progress().longest_streak, 2);
  }

  #[test]
  fn gap_resets_streak_but_keeps_longest() {
    let mut m = machine_on(date(2024, 1, 1));
    m.update_streak().unwrap();
    m.clock().set_date(date(2024, 1, 2));
    m.update_streak().unwrap();
    m.clock().set_date(date(2024, 1, 5));
    m.update_streak().unwrap();
    assert_eq!(m.progress().current_streak, 1);
    assert_eq!(m.progress().longest_streak, 2);
  }

  #[test]
  fn streak_crosses_month_and_year_boundaries() {
    let mut m = machine_on(date(2023, 12, 31));
    m.update_streak().unwrap();
    m.clock().advance_days(1);
    m.update_streak().unwrap();
    assert_eq!(m.progress().current_streak, 2);
    assert_eq!(m.progress().last_active_date, Some(date(2024, 1, 1)));
  }

  #[test]
  fn longest_streak_never_below_current() {
    let mut m = machine_on(date(2024, 3, 1));
    let gaps = [1, 1, 3, 1, 1, 1, 1, 5, 1, 0, 1];
    for gap in gaps {
      m.clock().advance_days(gap);
      m.update_streak().unwrap();
      let p = m.progress();
      assert!(p.longest_streak >= p.current_streak, "{p:?}");
    }
    assert_eq!(m.progress().longest_streak, 5);
  }

  // ── Journals ──────────────────────────────────────────────────────────────

  #[test]
  fn journal_entries_are_prepended_with_fresh_ids() {
    let mut m = machine_on(date(2024, 1, 1));
    let first = m.add_mood_log(NewMoodEntry::new("😠", Intensity::new(7).unwrap())).unwrap();
    m.clock().advance_days(1);
    let second = m.add_mood_log(NewMoodEntry::new("😊", Intensity::new(2).unwrap())).unwrap();

    assert_ne!(first.id, second.id);
    assert_eq!(m.mood_logs()[0].id, second.id);
    assert_eq!(m.mood_logs()[1], first);

    let berg = m
      .add_iceberg_entry(NewIcebergEntry {
        behavior: "Slammed the door".into(),
        feeling:  "Embarrassed".into(),
        need:     "Space".into(),
      })
      .unwrap();
    assert_eq!(m.iceberg_entries(), &[berg]);
  }

  #[test]
  fn unsynced_logs_exclude_acknowledged_ids() {
    let mut m = machine_on(date(2024, 1, 1));
    let a = m.add_mood_log(NewMoodEntry::new("😢", Intensity::new(4).unwrap())).unwrap();
    m.clock().advance_days(1);
    let b = m.add_mood_log(NewMoodEntry::new("😊", Intensity::new(3).unwrap())).unwrap();

    let (moods, bergs) = m.unsynced_logs();
    assert_eq!(moods, vec![a.clone(), b.clone()]);
    assert!(bergs.is_empty());

    m.mark_logs_synced([a.id]).unwrap();
    let (moods, _) = m.unsynced_logs();
    assert_eq!(moods, vec![b]);
  }

  #[test]
  fn entries_recorded_after_clock_steps_back_stay_pending() {
    let mut m = machine_on(date(2024, 1, 2));
    let a = m.add_mood_log(NewMoodEntry::new("A", Intensity::new(5).unwrap())).unwrap();
    m.mark_logs_synced([a.id]).unwrap();

    m.clock().set_date(date(2024, 1, 1));
    let b = m.add_mood_log(NewMoodEntry::new("B", Intensity::new(5).unwrap())).unwrap();
    assert!(b.created_at < a.created_at);

    let (moods, _) = m.unsynced_logs();
    assert_eq!(moods, vec![b]);
  }

  #[test]
  fn reset_forgets_acknowledged_ids() {
    let mut m = machine_on(date(2024, 1, 1));
    let a = m.add_mood_log(NewMoodEntry::new("😢", Intensity::new(4).unwrap())).unwrap();
    m.mark_logs_synced([a.id]).unwrap();

    m.reset().unwrap();
    assert!(m.state().synced_log_ids.is_empty());
  }

  // ── Kit, qualities, reset ─────────────────────────────────────────────────

  #[test]
  fn kit_and_qualities_are_replaced() {
    let mut m = machine_on(date(2024, 1, 1));
    m.update_qualities(vec!["Kind".into(), "Brave".into(), "Kind".into()]).unwrap();
    m.update_qualities(vec!["Funny".into()]).unwrap();
    assert_eq!(m.progress().my_qualities, vec!["Funny".to_string()]);

    let kit = CalmDownKit { sad: vec!["Cuddle a pet".into()], ..Default::default() };
    m.update_calm_down_kit(kit.clone()).unwrap();
    assert_eq!(m.progress().calm_down_kit, kit);
  }

  #[test]
  fn reset_restores_defaults_and_clears_logs() {
    let mut m = machine_on(date(2024, 1, 1));
    m.complete_level(level(1)).unwrap();
    m.update_streak().unwrap();
    m.update_qualities(vec!["Kind".into()]).unwrap();
    m.add_mood_log(NewMoodEntry::new("😠", Intensity::new(9).unwrap())).unwrap();

    m.reset().unwrap();
    assert_eq!(m.progress(), &UserProgress::default());
    assert!(m.mood_logs().is_empty());
    assert!(m.iceberg_entries().is_empty());

    let reloaded =
      ProgressMachine::load(MemorySnapshots::with_state(m.snapshots().saved().unwrap()), SystemClock)
        .unwrap();
    assert_eq!(reloaded.progress(), &UserProgress::default());
  }

  // ── Persistence ───────────────────────────────────────────────────────────

  #[test]
  fn failed_write_leaves_state_untouched() {
    let mut m = machine_on(date(2024, 1, 1));
    m.add_stars(3).unwrap();
    m.snapshots().fail_writes(true);

    assert!(m.complete_level(level(2)).is_err());
    assert_eq!(m.progress().total_stars, 3);
    assert!(m.progress().completed_levels.is_empty());

    m.snapshots().fail_writes(false);
    assert!(m.complete_level(level(2)).unwrap());
    assert_eq!(m.progress().total_stars, 13);
  }

  #[test]
  fn load_restores_saved_state() {
    let mut m = machine_on(date(2024, 1, 1));
    m.complete_level(level(6)).unwrap();
    let saved = m.snapshots().saved().unwrap();

    let again = ProgressMachine::load(MemorySnapshots::with_state(saved), FixedClock::on(date(2024, 1, 2)))
      .unwrap();
    assert_eq!(again.progress().completed_levels, vec![level(6)]);
  }

  // ── Sync ──────────────────────────────────────────────────────────────────

  #[test]
  fn pending_patch_before_and_after_confirmation() {
    let mut m = machine_on(date(2024, 1, 1));
    m.add_stars(5).unwrap();
    assert_eq!(m.pending_patch(), ProgressPatch { total_stars: Some(5), ..Default::default() });

    let server = m.pending_patch().applied(&UserProgress::default());
    m.sync_from_server(server).unwrap();
    assert!(m.pending_patch().is_empty());

    m.complete_level(level(2)).unwrap();
    let patch = m.pending_patch();
    assert_eq!(patch.total_stars, Some(15));
    assert_eq!(patch.completed_levels, Some(vec![level(2)]));
    assert_eq!(patch.my_qualities, None);
  }

  #[test]
  fn pull_keeps_local_edits_and_takes_remote_fields() {
    let mut m = machine_on(date(2024, 1, 1));
    m.sync_from_server(UserProgress::default()).unwrap();
    m.add_stars(4).unwrap();

    let mut server = UserProgress::default();
    server.my_qualities = vec!["Patient".into()];
    m.sync_from_server(server.clone()).unwrap();

    assert_eq!(m.progress().total_stars, 4);
    assert_eq!(m.progress().my_qualities, vec!["Patient".to_string()]);
    assert_eq!(m.state().confirmed.as_ref(), Some(&server));
    assert_eq!(m.pending_patch().total_stars, Some(4));
  }

  #[test]
  fn reset_is_pushed_as_cleared_fields() {
    let mut m = machine_on(date(2024, 1, 1));
    m.complete_level(level(1)).unwrap();
    let confirmed = m.progress().clone();
    m.sync_from_server(confirmed).unwrap();

    m.reset().unwrap();
    let patch = m.pending_patch();
    assert_eq!(patch.total_stars, Some(0));
    assert_eq!(patch.completed_levels, Some(vec![]));
    assert_eq!(patch.earned_badges, Some(vec![]));
  }
}
