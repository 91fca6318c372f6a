//! Append-only journals: mood check-ins and iceberg reflections.
//!
//! Entries are immutable once created. Ids are generated where the entry is
//! first recorded (usually the client), so re-uploading an entry is a no-op.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// How strong a feeling is, `1..=10`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Intensity(u8);

impl Intensity {
  pub fn new(value: u8) -> Result<Self> {
    if (1..=10).contains(&value) {
      Ok(Self(value))
    } else {
      Err(Error::InvalidIntensity(value))
    }
  }

  pub fn get(self) -> u8 { self.0 }
}

impl TryFrom<u8> for Intensity {
  type Error = Error;

  fn try_from(value: u8) -> Result<Self> { Self::new(value) }
}

impl From<Intensity> for u8 {
  fn from(i: Intensity) -> Self { i.0 }
}

// ─── Mood ────────────────────────────────────────────────────────────────────

/// Input to [`crate::machine::ProgressMachine::add_mood_log`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMoodEntry {
  pub emoji:     String,
  pub intensity: Intensity,
  pub trigger:   Option<String>,
  pub note:      Option<String>,
}

impl NewMoodEntry {
  pub fn new(emoji: impl Into<String>, intensity: Intensity) -> Self {
    Self { emoji: emoji.into(), intensity, trigger: None, note: None }
  }

  pub(crate) fn record(self, id: Uuid, created_at: DateTime<Utc>) -> MoodEntry {
    MoodEntry {
      id,
      emoji: self.emoji,
      intensity: self.intensity,
      trigger: self.trigger,
      note: self.note,
      created_at,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoodEntry {
  pub id:         Uuid,
  pub emoji:      String,
  pub intensity:  Intensity,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub trigger:    Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub note:       Option<String>,
  pub created_at: DateTime<Utc>,
}

// ─── Iceberg ─────────────────────────────────────────────────────────────────

/// What was seen on the surface, and what was underneath it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewIcebergEntry {
  pub behavior: String,
  pub feeling:  String,
  pub need:     String,
}

impl NewIcebergEntry {
  pub(crate) fn record(self, id: Uuid, created_at: DateTime<Utc>) -> IcebergEntry {
    IcebergEntry {
      id,
      behavior: self.behavior,
      feeling: self.feeling,
      need: self.need,
      created_at,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IcebergEntry {
  pub id:         Uuid,
  pub behavior:   String,
  pub feeling:    String,
  pub need:       String,
  pub created_at: DateTime<Utc>,
}
