//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 UTC strings with a fixed nanosecond
//! width, so they sort lexically. Calendar dates are `YYYY-MM-DD`. Progress
//! collections are stored as compact JSON. UUIDs are hyphenated lowercase.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use levelup_core::{
  account::{Plan, SubscriptionStatus, UserAccount},
  journal::{IcebergEntry, Intensity, MoodEntry},
  progress::UserProgress,
};
use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── Dates ───────────────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339_opts(SecondsFormat::Nanos, true) }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

// ─── JSON columns ────────────────────────────────────────────────────────────

pub fn encode_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
  Ok(serde_json::to_string(value)?)
}

pub fn decode_json<T: DeserializeOwned>(s: &str) -> Result<T> { Ok(serde_json::from_str(s)?) }

// ─── Integers ────────────────────────────────────────────────────────────────

pub fn encode_count(n: u32) -> i64 { i64::from(n) }

fn decode_count(column: &'static str, value: i64) -> Result<u32> {
  u32::try_from(value).map_err(|_| Error::OutOfRange { column, value })
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `users` row.
pub struct RawAccount {
  pub user_id:               String,
  pub email:                 String,
  pub name:                  Option<String>,
  pub customer_id:           Option<String>,
  pub subscription_id:       Option<String>,
  pub subscription_status:   String,
  pub subscription_plan:     Option<String>,
  pub subscription_end_date: Option<String>,
  pub created_at:            String,
}

impl RawAccount {
  pub const COLUMNS: &'static str = "user_id, email, name, customer_id, subscription_id, \
                                     subscription_status, subscription_plan, \
                                     subscription_end_date, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      user_id:               row.get(0)?,
      email:                 row.get(1)?,
      name:                  row.get(2)?,
      customer_id:           row.get(3)?,
      subscription_id:       row.get(4)?,
      subscription_status:   row.get(5)?,
      subscription_plan:     row.get(6)?,
      subscription_end_date: row.get(7)?,
      created_at:            row.get(8)?,
    })
  }

  pub fn into_account(self) -> Result<UserAccount> {
    Ok(UserAccount {
      user_id:               self.user_id,
      email:                 self.email,
      name:                  self.name,
      customer_id:           self.customer_id,
      subscription_id:       self.subscription_id,
      subscription_status:   SubscriptionStatus::parse(&self.subscription_status)?,
      subscription_plan:     self.subscription_plan.as_deref().map(Plan::parse).transpose()?,
      subscription_end_date: self.subscription_end_date.as_deref().map(decode_dt).transpose()?,
      created_at:            decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read directly from a `user_progress` row.
pub struct RawProgress {
  pub total_stars:      i64,
  pub current_streak:   i64,
  pub longest_streak:   i64,
  pub last_active_date: Option<String>,
  pub completed_levels: String,
  pub earned_badges:    String,
  pub level_progress:   String,
  pub calm_down_kit:    String,
  pub my_qualities:     String,
}

impl RawProgress {
  pub const COLUMNS: &'static str = "total_stars, current_streak, longest_streak, \
                                     last_active_date, completed_levels, earned_badges, \
                                     level_progress, calm_down_kit, my_qualities";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      total_stars:      row.get(0)?,
      current_streak:   row.get(1)?,
      longest_streak:   row.get(2)?,
      last_active_date: row.get(3)?,
      completed_levels: row.get(4)?,
      earned_badges:    row.get(5)?,
      level_progress:   row.get(6)?,
      calm_down_kit:    row.get(7)?,
      my_qualities:     row.get(8)?,
    })
  }

  pub fn into_progress(self) -> Result<UserProgress> {
    Ok(UserProgress {
      total_stars:      decode_count("total_stars", self.total_stars)?,
      current_streak:   decode_count("current_streak", self.current_streak)?,
      longest_streak:   decode_count("longest_streak", self.longest_streak)?,
      last_active_date: self.last_active_date.as_deref().map(decode_date).transpose()?,
      completed_levels: decode_json(&self.completed_levels)?,
      earned_badges:    decode_json(&self.earned_badges)?,
      level_progress:   decode_json(&self.level_progress)?,
      calm_down_kit:    decode_json(&self.calm_down_kit)?,
      my_qualities:     decode_json(&self.my_qualities)?,
    })
  }
}

/// Raw values read directly from a `mood_entries` row.
pub struct RawMood {
  pub entry_id:   String,
  pub emoji:      String,
  pub intensity:  i64,
  pub trigger:    Option<String>,
  pub note:       Option<String>,
  pub created_at: String,
}

impl RawMood {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      entry_id:   row.get(0)?,
      emoji:      row.get(1)?,
      intensity:  row.get(2)?,
      trigger:    row.get(3)?,
      note:       row.get(4)?,
      created_at: row.get(5)?,
    })
  }

  pub fn into_entry(self) -> Result<MoodEntry> {
    let intensity = u8::try_from(self.intensity)
      .map_err(|_| Error::OutOfRange { column: "intensity", value: self.intensity })?;
    Ok(MoodEntry {
      id:         decode_uuid(&self.entry_id)?,
      emoji:      self.emoji,
      intensity:  Intensity::new(intensity)?,
      trigger:    self.trigger,
      note:       self.note,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read directly from an `iceberg_entries` row.
pub struct RawIceberg {
  pub entry_id:   String,
  pub behavior:   String,
  pub feeling:    String,
  pub need:       String,
  pub created_at: String,
}

impl RawIceberg {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      entry_id:   row.get(0)?,
      behavior:   row.get(1)?,
      feeling:    row.get(2)?,
      need:       row.get(3)?,
      created_at: row.get(4)?,
    })
  }

  pub fn into_entry(self) -> Result<IcebergEntry> {
    Ok(IcebergEntry {
      id:         decode_uuid(&self.entry_id)?,
      behavior:   self.behavior,
      feeling:    self.feeling,
      need:       self.need,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn timestamps_sort_lexically() {
    let a = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    let b = DateTime::from_timestamp(1_700_000_000, 500).unwrap();
    assert!(encode_dt(a) < encode_dt(b));
    assert_eq!(decode_dt(&encode_dt(b)).unwrap(), b);
  }

  #[test]
  fn negative_counts_are_rejected() {
    assert!(matches!(
      decode_count("total_stars", -1),
      Err(Error::OutOfRange { column: "total_stars", value: -1 })
    ));
  }
}
