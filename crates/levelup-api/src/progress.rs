//! Handlers for `/user/progress`.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/user/progress` | Creates a default row on first read |
//! | `POST` | `/user/progress` | Body: partial progress; present fields replace stored ones |

use axum::{Json, body::Bytes, extract::State};
use levelup_core::{progress::UserProgress, store::LevelUpStore, sync::ProgressPatch};

use crate::{AppState, auth::CurrentUser, error::ApiError};

/// `GET /user/progress`
pub async fn read<S>(
  State(state): State<AppState<S>>,
  CurrentUser(account): CurrentUser,
) -> Result<Json<UserProgress>, ApiError>
where
  S: LevelUpStore + 'static,
{
  let progress = state
    .store
    .get_or_create_progress(&account.user_id)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(progress))
}

/// `POST /user/progress`
///
/// The body is parsed by hand so a malformed document is a 400 rather than
/// axum's 422.
pub async fn write<S>(
  State(state): State<AppState<S>>,
  CurrentUser(account): CurrentUser,
  body: Bytes,
) -> Result<Json<UserProgress>, ApiError>
where
  S: LevelUpStore + 'static,
{
  let patch: ProgressPatch = serde_json::from_slice(&body)
    .map_err(|e| ApiError::BadRequest(format!("invalid progress document: {e}")))?;
  let patch = patch.normalized();

  let stored = state
    .store
    .upsert_progress(&account.user_id, &patch)
    .await
    .map_err(ApiError::store)?;
  Ok(Json(stored))
}
