//! Per-field last-write-wins synchronisation of [`UserProgress`].
//!
//! A [`ProgressPatch`] names the fields a writer wants to replace. The server
//! applies it as an upsert: present fields overwrite the stored value
//! wholesale, absent fields are left alone. The client computes patches by
//! diffing its working copy against the last snapshot the server confirmed,
//! and rebases server replies on top of its own unsent edits.
//!
//! There is no version or conflict detection; two devices writing the same
//! field race, and the later write wins.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize};

use crate::progress::{CalmDownKit, LevelData, LevelId, UserProgress, dedup_in_order};

/// A partial [`UserProgress`] document.
///
/// On the wire a missing key and `null` both mean "leave untouched", except
/// for `lastActiveDate`, where `null` clears the stored date.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressPatch {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub total_stars:      Option<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub current_streak:   Option<u32>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub longest_streak:   Option<u32>,
  #[serde(
    default,
    deserialize_with = "present_or_null",
    skip_serializing_if = "Option::is_none"
  )]
  pub last_active_date: Option<Option<NaiveDate>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub completed_levels: Option<Vec<LevelId>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub earned_badges:    Option<Vec<LevelId>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub level_progress:   Option<BTreeMap<LevelId, LevelData>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub calm_down_kit:    Option<CalmDownKit>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub my_qualities:     Option<Vec<String>>,
}

/// Distinguishes a present `null` (`Some(None)`) from a missing key (`None`,
/// via `#[serde(default)]`).
fn present_or_null<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
  D: Deserializer<'de>,
  T: Deserialize<'de>,
{
  Option::<T>::deserialize(deserializer).map(Some)
}

impl ProgressPatch {
  /// A patch that replaces every field with `progress`'s value.
  pub fn full(progress: &UserProgress) -> Self {
    Self {
      total_stars:      Some(progress.total_stars),
      current_streak:   Some(progress.current_streak),
      longest_streak:   Some(progress.longest_streak),
      last_active_date: Some(progress.last_active_date),
      completed_levels: Some(progress.completed_levels.clone()),
      earned_badges:    Some(progress.earned_badges.clone()),
      level_progress:   Some(progress.level_progress.clone()),
      calm_down_kit:    Some(progress.calm_down_kit.clone()),
      my_qualities:     Some(progress.my_qualities.clone()),
    }
  }

  /// The fields of `current` whose values differ from `base`.
  pub fn diff(base: &UserProgress, current: &UserProgress) -> Self {
    fn changed<T: PartialEq + Clone>(base: &T, current: &T) -> Option<T> {
      (base != current).then(|| current.clone())
    }

    Self {
      total_stars:      changed(&base.total_stars, &current.total_stars),
      current_streak:   changed(&base.current_streak, &current.current_streak),
      longest_streak:   changed(&base.longest_streak, &current.longest_streak),
      last_active_date: changed(&base.last_active_date, &current.last_active_date),
      completed_levels: changed(&base.completed_levels, &current.completed_levels),
      earned_badges:    changed(&base.earned_badges, &current.earned_badges),
      level_progress:   changed(&base.level_progress, &current.level_progress),
      calm_down_kit:    changed(&base.calm_down_kit, &current.calm_down_kit),
      my_qualities:     changed(&base.my_qualities, &current.my_qualities),
    }
  }

  pub fn is_empty(&self) -> bool { *self == Self::default() }

  /// Overwrite each present field of `target`. No merging inside a field.
  pub fn apply_to(&self, target: &mut UserProgress) {
    if let Some(v) = self.total_stars {
      target.total_stars = v;
    }
    if let Some(v) = self.current_streak {
      target.current_streak = v;
    }
    if let Some(v) = self.longest_streak {
      target.longest_streak = v;
    }
    if let Some(v) = self.last_active_date {
      target.last_active_date = v;
    }
    if let Some(v) = &self.completed_levels {
      target.completed_levels = v.clone();
    }
    if let Some(v) = &self.earned_badges {
      target.earned_badges = v.clone();
    }
    if let Some(v) = &self.level_progress {
      target.level_progress = v.clone();
    }
    if let Some(v) = &self.calm_down_kit {
      target.calm_down_kit = v.clone();
    }
    if let Some(v) = &self.my_qualities {
      target.my_qualities = v.clone();
    }
  }

  /// `base` with this patch applied.
  pub fn applied(&self, base: &UserProgress) -> UserProgress {
    let mut out = base.clone();
    self.apply_to(&mut out);
    out
  }

  /// Drop duplicates inside the collection fields, keeping first
  /// occurrences. Writers may send lists built from stale state.
  pub fn normalized(mut self) -> Self {
    for list in [&mut self.completed_levels, &mut self.earned_badges].into_iter().flatten() {
      dedup_in_order(list);
    }
    if let Some(qualities) = &mut self.my_qualities {
      dedup_in_order(qualities);
    }
    self.calm_down_kit = self.calm_down_kit.map(CalmDownKit::normalized);
    self
  }
}

/// Merge a fresh server snapshot into a client working copy.
///
/// Fields the client changed since `confirmed` (its last server-confirmed
/// snapshot) are newer local writes and survive; every other field takes the
/// server's value. Before the first confirmed snapshot the defaults stand in
/// for it, so a fresh install adopts whatever the server already has.
pub fn rebase(
  confirmed: Option<&UserProgress>,
  working: &UserProgress,
  server: &UserProgress,
) -> UserProgress {
  unsent(confirmed, working).applied(server)
}

/// Fields of `working` changed since `confirmed` (or since the defaults).
pub fn unsent(confirmed: Option<&UserProgress>, working: &UserProgress) -> ProgressPatch {
  match confirmed {
    Some(base) => ProgressPatch::diff(base, working),
    None => ProgressPatch::diff(&UserProgress::default(), working),
  }
}
