//! [`SqliteStore`], the SQLite implementation of [`LevelUpStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::{OptionalExtension as _, types::Value};

use levelup_core::{
  account::{Identity, UserAccount},
  billing::SubscriptionChange,
  journal::{IcebergEntry, MoodEntry},
  progress::UserProgress,
  store::LevelUpStore,
  sync::ProgressPatch,
};

use crate::{
  Result,
  encode::{
    RawAccount, RawIceberg, RawMood, RawProgress, encode_count, encode_date, encode_dt,
    encode_json, encode_uuid,
  },
  error::Error,
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Level Up! store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn select_account(
    &self,
    column: &'static str,
    key: String,
  ) -> Result<Option<UserAccount>> {
    let raw: Option<RawAccount> = self
      .conn
      .call(move |conn| {
        let sql = format!("SELECT {} FROM users WHERE {column} = ?1", RawAccount::COLUMNS);
        Ok(conn.query_row(&sql, rusqlite::params![key], RawAccount::from_row).optional()?)
      })
      .await?;
    raw.map(RawAccount::into_account).transpose()
  }

  /// Run `INSERT ... ON CONFLICT DO UPDATE` for the given `(column, value)`
  /// pairs, then read the row back. Columns not listed keep their stored
  /// value, or their default on insert.
  async fn write_progress(
    &self,
    user_id: String,
    columns: Vec<(&'static str, Value)>,
  ) -> Result<UserProgress> {
    let raw: RawProgress = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;

        let names: Vec<&str> = columns.iter().map(|(name, _)| *name).collect();
        let sql = if names.is_empty() {
          "INSERT OR IGNORE INTO user_progress (user_id) VALUES (?1)".to_owned()
        } else {
          let placeholders: Vec<String> = (2..=names.len() + 1).map(|i| format!("?{i}")).collect();
          let updates: Vec<String> = names.iter().map(|n| format!("{n} = excluded.{n}")).collect();
          format!(
            "INSERT INTO user_progress (user_id, {}) VALUES (?1, {})
             ON CONFLICT(user_id) DO UPDATE SET {}",
            names.join(", "),
            placeholders.join(", "),
            updates.join(", "),
          )
        };

        let params = std::iter::once(Value::Text(user_id.clone()))
          .chain(columns.into_iter().map(|(_, value)| value));
        tx.execute(&sql, rusqlite::params_from_iter(params))?;

        let raw = tx.query_row(
          &format!("SELECT {} FROM user_progress WHERE user_id = ?1", RawProgress::COLUMNS),
          rusqlite::params![user_id],
          RawProgress::from_row,
        )?;
        tx.commit()?;
        Ok(raw)
      })
      .await?;
    raw.into_progress()
  }
}

/// Column values for each field present in `patch`.
fn patch_columns(patch: &ProgressPatch) -> Result<Vec<(&'static str, Value)>> {
  let mut columns = Vec::new();
  if let Some(n) = patch.total_stars {
    columns.push(("total_stars", Value::Integer(encode_count(n))));
  }
  if let Some(n) = patch.current_streak {
    columns.push(("current_streak", Value::Integer(encode_count(n))));
  }
  if let Some(n) = patch.longest_streak {
    columns.push(("longest_streak", Value::Integer(encode_count(n))));
  }
  if let Some(date) = patch.last_active_date {
    let value = date.map(encode_date).map_or(Value::Null, Value::Text);
    columns.push(("last_active_date", value));
  }
  if let Some(levels) = &patch.completed_levels {
    columns.push(("completed_levels", Value::Text(encode_json(levels)?)));
  }
  if let Some(badges) = &patch.earned_badges {
    columns.push(("earned_badges", Value::Text(encode_json(badges)?)));
  }
  if let Some(data) = &patch.level_progress {
    columns.push(("level_progress", Value::Text(encode_json(data)?)));
  }
  if let Some(kit) = &patch.calm_down_kit {
    columns.push(("calm_down_kit", Value::Text(encode_json(kit)?)));
  }
  if let Some(qualities) = &patch.my_qualities {
    columns.push(("my_qualities", Value::Text(encode_json(qualities)?)));
  }
  Ok(columns)
}

fn optional_text(value: Option<String>) -> Value { value.map_or(Value::Null, Value::Text) }

// ─── LevelUpStore impl ───────────────────────────────────────────────────────

impl LevelUpStore for SqliteStore {
  type Error = Error;

  // ── Accounts ──────────────────────────────────────────────────────────────

  async fn ensure_account(&self, identity: &Identity) -> Result<UserAccount> {
    let fresh = UserAccount::new(identity, Utc::now());
    let user_id = fresh.user_id.clone();
    let email = fresh.email.clone();
    let name = fresh.name.clone();
    let status = fresh.subscription_status.as_ref().to_owned();
    let at_str = encode_dt(fresh.created_at);

    let raw: RawAccount = self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT OR IGNORE INTO users (user_id, email, name, subscription_status, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)",
          rusqlite::params![user_id, email, name, status, at_str],
        )?;
        let sql = format!("SELECT {} FROM users WHERE user_id = ?1", RawAccount::COLUMNS);
        Ok(conn.query_row(&sql, rusqlite::params![user_id], RawAccount::from_row)?)
      })
      .await?;
    raw.into_account()
  }

  async fn get_account(&self, user_id: &str) -> Result<Option<UserAccount>> {
    self.select_account("user_id", user_id.to_owned()).await
  }

  async fn find_account_by_customer(&self, customer_id: &str) -> Result<Option<UserAccount>> {
    self.select_account("customer_id", customer_id.to_owned()).await
  }

  async fn apply_subscription_change(
    &self,
    user_id: &str,
    change: &SubscriptionChange,
  ) -> Result<Option<UserAccount>> {
    let mut columns: Vec<(&'static str, Value)> = Vec::new();
    if let Some(customer_id) = &change.customer_id {
      columns.push(("customer_id", Value::Text(customer_id.clone())));
    }
    if let Some(subscription_id) = &change.subscription_id {
      columns.push(("subscription_id", optional_text(subscription_id.clone())));
    }
    if let Some(status) = change.status {
      columns.push(("subscription_status", Value::Text(status.as_ref().to_owned())));
    }
    if let Some(plan) = change.plan {
      columns.push(("subscription_plan", Value::Text(plan.as_ref().to_owned())));
    }
    if let Some(end_date) = change.end_date {
      columns.push(("subscription_end_date", Value::Text(encode_dt(end_date))));
    }

    if !columns.is_empty() {
      let id = user_id.to_owned();
      self
        .conn
        .call(move |conn| {
          let sets: Vec<String> =
            columns.iter().enumerate().map(|(i, (name, _))| format!("{name} = ?{}", i + 2)).collect();
          let sql = format!("UPDATE users SET {} WHERE user_id = ?1", sets.join(", "));
          let params =
            std::iter::once(Value::Text(id)).chain(columns.into_iter().map(|(_, value)| value));
          conn.execute(&sql, rusqlite::params_from_iter(params))?;
          Ok(())
        })
        .await?;
    }

    self.get_account(user_id).await
  }

  // ── Progress ──────────────────────────────────────────────────────────────

  async fn get_or_create_progress(&self, user_id: &str) -> Result<UserProgress> {
    self.write_progress(user_id.to_owned(), Vec::new()).await
  }

  async fn upsert_progress(&self, user_id: &str, patch: &ProgressPatch) -> Result<UserProgress> {
    let columns = patch_columns(patch)?;
    self.write_progress(user_id.to_owned(), columns).await
  }

  // ── Journals ──────────────────────────────────────────────────────────────

  async fn add_mood_entries(&self, user_id: &str, entries: &[MoodEntry]) -> Result<usize> {
    let user_id = user_id.to_owned();
    let rows: Vec<_> = entries
      .iter()
      .map(|e| {
        (
          encode_uuid(e.id),
          e.emoji.clone(),
          i64::from(e.intensity.get()),
          e.trigger.clone(),
          e.note.clone(),
          encode_dt(e.created_at),
        )
      })
      .collect();

    let inserted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
          let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO mood_entries
               (entry_id, user_id, emoji, intensity, trigger_text, note, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
          )?;
          for (id, emoji, intensity, trigger, note, at) in rows {
            inserted +=
              stmt.execute(rusqlite::params![id, user_id, emoji, intensity, trigger, note, at])?;
          }
        }
        tx.commit()?;
        Ok(inserted)
      })
      .await?;
    Ok(inserted)
  }

  async fn list_mood_entries(&self, user_id: &str) -> Result<Vec<MoodEntry>> {
    let user_id = user_id.to_owned();
    let raws: Vec<RawMood> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT entry_id, emoji, intensity, trigger_text, note, created_at
           FROM mood_entries
           WHERE user_id = ?1
           ORDER BY created_at DESC, entry_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![user_id], RawMood::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawMood::into_entry).collect()
  }

  async fn add_iceberg_entries(&self, user_id: &str, entries: &[IcebergEntry]) -> Result<usize> {
    let user_id = user_id.to_owned();
    let rows: Vec<_> = entries
      .iter()
      .map(|e| {
        (
          encode_uuid(e.id),
          e.behavior.clone(),
          e.feeling.clone(),
          e.need.clone(),
          encode_dt(e.created_at),
        )
      })
      .collect();

    let inserted = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut inserted = 0;
        {
          let mut stmt = tx.prepare(
            "INSERT OR IGNORE INTO iceberg_entries
               (entry_id, user_id, behavior, feeling, need, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
          )?;
          for (id, behavior, feeling, need, at) in rows {
            inserted += stmt.execute(rusqlite::params![id, user_id, behavior, feeling, need, at])?;
          }
        }
        tx.commit()?;
        Ok(inserted)
      })
      .await?;
    Ok(inserted)
  }

  async fn list_iceberg_entries(&self, user_id: &str) -> Result<Vec<IcebergEntry>> {
    let user_id = user_id.to_owned();
    let raws: Vec<RawIceberg> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT entry_id, behavior, feeling, need, created_at
           FROM iceberg_entries
           WHERE user_id = ?1
           ORDER BY created_at DESC, entry_id",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![user_id], RawIceberg::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    raws.into_iter().map(RawIceberg::into_entry).collect()
  }
}
