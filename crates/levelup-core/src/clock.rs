//! Time source for the progress machine.
//!
//! Streaks are counted in the user's local calendar days, so "today" is a
//! [`NaiveDate`] rather than an instant.

use std::cell::Cell;

use chrono::{DateTime, Days, Local, NaiveDate, Utc};

pub trait Clock {
  /// The current calendar date for streak purposes.
  fn today(&self) -> NaiveDate;

  /// The current instant, used to timestamp journal entries.
  fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time; "today" is the local date.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn today(&self) -> NaiveDate { Local::now().date_naive() }

  fn now(&self) -> DateTime<Utc> { Utc::now() }
}

/// A clock that only moves when told to. "Today" is the UTC date of the
/// current instant.
#[derive(Debug, Clone)]
pub struct FixedClock {
  now: Cell<DateTime<Utc>>,
}

impl FixedClock {
  pub fn new(now: DateTime<Utc>) -> Self { Self { now: Cell::new(now) } }

  /// A clock set to noon UTC on `date`.
  pub fn on(date: NaiveDate) -> Self {
    Self::new(date.and_hms_opt(12, 0, 0).unwrap_or_default().and_utc())
  }

  pub fn set(&self, now: DateTime<Utc>) { self.now.set(now) }

  pub fn set_date(&self, date: NaiveDate) {
    self.set(date.and_hms_opt(12, 0, 0).unwrap_or_default().and_utc())
  }

  pub fn advance_days(&self, days: u64) {
    let now = self.now.get();
    self.set(now.checked_add_days(Days::new(days)).unwrap_or(now));
  }
}

impl Clock for FixedClock {
  fn today(&self) -> NaiveDate { self.now.get().date_naive() }

  fn now(&self) -> DateTime<Utc> { self.now.get() }
}
