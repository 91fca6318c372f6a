//! Achievements derived from progress. Never stored.

use serde::{Deserialize, Serialize};
use strum::{EnumIter, IntoEnumIterator as _};

use crate::progress::UserProgress;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, EnumIter)]
#[serde(rename_all = "snake_case")]
pub enum Achievement {
  FirstStar,
  StarCollector,
  Superstar,
  FirstLevel,
  Halfway,
  Champion,
  Streak3,
  Streak7,
  MoodTracker,
}

/// What has to be reached for an achievement to unlock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Requirement {
  Stars(u32),
  Levels(usize),
  /// Measured against the longest streak, so a broken streak keeps it.
  Streak(u32),
  Moods(usize),
}

impl Achievement {
  pub fn name(self) -> &'static str {
    match self {
      Self::FirstStar => "First Star",
      Self::StarCollector => "Star Collector",
      Self::Superstar => "Superstar",
      Self::FirstLevel => "Level Up!",
      Self::Halfway => "Halfway Hero",
      Self::Champion => "Champion",
      Self::Streak3 => "On Fire",
      Self::Streak7 => "Week Warrior",
      Self::MoodTracker => "Mood Master",
    }
  }

  pub fn requirement(self) -> Requirement {
    match self {
      Self::FirstStar => Requirement::Stars(1),
      Self::StarCollector => Requirement::Stars(50),
      Self::Superstar => Requirement::Stars(100),
      Self::FirstLevel => Requirement::Levels(1),
      Self::Halfway => Requirement::Levels(4),
      Self::Champion => Requirement::Levels(8),
      Self::Streak3 => Requirement::Streak(3),
      Self::Streak7 => Requirement::Streak(7),
      Self::MoodTracker => Requirement::Moods(7),
    }
  }

  pub fn is_met(self, progress: &UserProgress, mood_count: usize) -> bool {
    match self.requirement() {
      Requirement::Stars(n) => progress.total_stars >= n,
      Requirement::Levels(n) => progress.completed_levels.len() >= n,
      Requirement::Streak(n) => progress.longest_streak >= n,
      Requirement::Moods(n) => mood_count >= n,
    }
  }
}

/// Every achievement `progress` has earned, in catalogue order.
pub fn unlocked(progress: &UserProgress, mood_count: usize) -> Vec<Achievement> {
  Achievement::iter().filter(|a| a.is_met(progress, mood_count)).collect()
}
