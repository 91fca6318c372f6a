//! Handlers for the append-only journals.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/user/moods` | Newest first |
//! | `POST` | `/user/moods` | Body: list of entries with client ids; returns `{"inserted":n}` |
//! | `GET`  | `/user/iceberg` | Newest first |
//! | `POST` | `/user/iceberg` | As for moods |

use axum::{Json, body::Bytes, extract::State};
use levelup_core::{
  journal::{IcebergEntry, MoodEntry},
  store::LevelUpStore,
};
use serde::{Serialize, de::DeserializeOwned};

use crate::{AppState, auth::CurrentUser, error::ApiError};

#[derive(Debug, Serialize)]
pub struct Inserted {
  pub inserted: usize,
}

fn parse_entries<T: DeserializeOwned>(body: &[u8]) -> Result<Vec<T>, ApiError> {
  serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("invalid entries: {e}")))
}

// ─── Moods ───────────────────────────────────────────────────────────────────

/// `GET /user/moods`
pub async fn list_moods<S>(
  State(state): State<AppState<S>>,
  CurrentUser(account): CurrentUser,
) -> Result<Json<Vec<MoodEntry>>, ApiError>
where
  S: LevelUpStore + 'static,
{
  let entries = state
    .store
    .list_mood_entries(&account.user_id)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(entries))
}

/// `POST /user/moods`
pub async fn add_moods<S>(
  State(state): State<AppState<S>>,
  CurrentUser(account): CurrentUser,
  body: Bytes,
) -> Result<Json<Inserted>, ApiError>
where
  S: LevelUpStore + 'static,
{
  let entries: Vec<MoodEntry> = parse_entries(&body)?;
  let inserted = state
    .store
    .add_mood_entries(&account.user_id, &entries)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(Inserted { inserted }))
}

// ─── Iceberg ─────────────────────────────────────────────────────────────────

/// `GET /user/iceberg`
pub async fn list_iceberg<S>(
  State(state): State<AppState<S>>,
  CurrentUser(account): CurrentUser,
) -> Result<Json<Vec<IcebergEntry>>, ApiError>
where
  S: LevelUpStore + 'static,
{
  let entries = state
    .store
    .list_iceberg_entries(&account.user_id)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(entries))
}

/// `POST /user/iceberg`
pub async fn add_iceberg<S>(
  State(state): State<AppState<S>>,
  CurrentUser(account): CurrentUser,
  body: Bytes,
) -> Result<Json<Inserted>, ApiError>
where
  S: LevelUpStore + 'static,
{
  let entries: Vec<IcebergEntry> = parse_entries(&body)?;
  let inserted = state
    .store
    .add_iceberg_entries(&account.user_id, &entries)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(Inserted { inserted }))
}
