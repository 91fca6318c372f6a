//! Gamification progress: stars, streaks, levels, and per-level scratch data.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Stars awarded the first time a level is completed.
pub const LEVEL_COMPLETION_REWARD: u32 = 10;

/// Number of levels in the programme.
pub const LEVEL_COUNT: u8 = 8;

// ─── Level identity ──────────────────────────────────────────────────────────

/// A level identifier in `1..=8`.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub struct LevelId(u8);

impl LevelId {
  pub fn new(id: u8) -> Result<Self> {
    if (1..=LEVEL_COUNT).contains(&id) {
      Ok(Self(id))
    } else {
      Err(Error::InvalidLevel(id))
    }
  }

  pub fn get(self) -> u8 { self.0 }

  /// Every level, in order.
  pub fn all() -> impl Iterator<Item = LevelId> { (1..=LEVEL_COUNT).map(LevelId) }
}

impl TryFrom<u8> for LevelId {
  type Error = Error;

  fn try_from(id: u8) -> Result<Self> { Self::new(id) }
}

impl From<LevelId> for u8 {
  fn from(id: LevelId) -> Self { id.0 }
}

impl std::fmt::Display for LevelId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    self.0.fmt(f)
  }
}

// ─── Per-level scratch data ──────────────────────────────────────────────────

/// One value in a level's scratch map. Deliberately a closed set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LevelValue {
  Flag(bool),
  Number(f64),
  Text(String),
  List(Vec<String>),
}

impl From<bool> for LevelValue {
  fn from(v: bool) -> Self { Self::Flag(v) }
}

impl From<f64> for LevelValue {
  fn from(v: f64) -> Self { Self::Number(v) }
}

impl From<&str> for LevelValue {
  fn from(v: &str) -> Self { Self::Text(v.to_owned()) }
}

impl From<String> for LevelValue {
  fn from(v: String) -> Self { Self::Text(v) }
}

impl From<Vec<String>> for LevelValue {
  fn from(v: Vec<String>) -> Self { Self::List(v) }
}

/// Free-form data a level keeps between visits (selected answers, step
/// reached, ...).
pub type LevelData = BTreeMap<String, LevelValue>;

// ─── Calm-down kit ───────────────────────────────────────────────────────────

/// The four feelings a calm-down kit has tools for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
  Mad,
  Sad,
  Worried,
  Stressed,
}

/// Chosen coping tools per feeling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalmDownKit {
  pub mad:      Vec<String>,
  pub sad:      Vec<String>,
  pub worried:  Vec<String>,
  pub stressed: Vec<String>,
}

impl CalmDownKit {
  pub fn tools(&self, emotion: Emotion) -> &[String] {
    match emotion {
      Emotion::Mad => &self.mad,
      Emotion::Sad => &self.sad,
      Emotion::Worried => &self.worried,
      Emotion::Stressed => &self.stressed,
    }
  }

  pub fn tools_mut(&mut self, emotion: Emotion) -> &mut Vec<String> {
    match emotion {
      Emotion::Mad => &mut self.mad,
      Emotion::Sad => &mut self.sad,
      Emotion::Worried => &mut self.worried,
      Emotion::Stressed => &mut self.stressed,
    }
  }

  /// Drop duplicate tools within each feeling, keeping first occurrences.
  pub fn normalized(mut self) -> Self {
    for list in [&mut self.mad, &mut self.sad, &mut self.worried, &mut self.stressed] {
      dedup_in_order(list);
    }
    self
  }
}

// ─── UserProgress ────────────────────────────────────────────────────────────

/// The gamification aggregate, one per account.
///
/// Every field defaults, so a snapshot or request body missing fields still
/// deserialises.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProgress {
  pub total_stars:      u32,
  pub current_streak:   u32,
  pub longest_streak:   u32,
  pub last_active_date: Option<NaiveDate>,
  /// Unique, in completion order.
  pub completed_levels: Vec<LevelId>,
  /// Unique, in award order. Mirrors `completed_levels`.
  pub earned_badges:    Vec<LevelId>,
  pub level_progress:   BTreeMap<LevelId, LevelData>,
  pub calm_down_kit:    CalmDownKit,
  pub my_qualities:     Vec<String>,
}

impl UserProgress {
  pub fn is_level_complete(&self, level: LevelId) -> bool {
    self.completed_levels.contains(&level)
  }

  pub fn has_badge(&self, level: LevelId) -> bool { self.earned_badges.contains(&level) }

  pub fn level_data(&self, level: LevelId) -> Option<&LevelData> {
    self.level_progress.get(&level)
  }
}

/// Remove repeated elements, keeping the first occurrence of each.
pub(crate) fn dedup_in_order<T: PartialEq + Clone>(items: &mut Vec<T>) {
  let mut seen: Vec<T> = Vec::with_capacity(items.len());
  items.retain(|item| {
    if seen.contains(item) {
      false
    } else {
      seen.push(item.clone());
      true
    }
  });
}
