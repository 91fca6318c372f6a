//! Bearer-token authentication and the [`CurrentUser`] extractor.
//!
//! The auth provider issues HS256 access tokens. `sub` is the user id,
//! `email` the address and `user_metadata.name` the display name.

use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header, request::Parts},
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use levelup_core::{
  account::{Identity, UserAccount},
  store::LevelUpStore,
};
use serde::{Deserialize, Serialize};

use crate::{AppState, error::ApiError};

/// Resolves the caller's identity from request headers.
pub trait Authenticator: Send + Sync {
  fn authenticate(&self, headers: &HeaderMap) -> Result<Identity, ApiError>;
}

// ─── JWT ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserMetadata {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
}

/// Claims read from an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
  pub sub:           String,
  #[serde(default)]
  pub email:         String,
  pub exp:           u64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub aud:           Option<String>,
  #[serde(default)]
  pub user_metadata: UserMetadata,
}

impl From<Claims> for Identity {
  fn from(claims: Claims) -> Self {
    Self {
      user_id: claims.sub,
      email:   claims.email,
      name:    claims.user_metadata.name,
    }
  }
}

/// Verifies HS256 tokens signed with a shared secret.
pub struct JwtAuthenticator {
  key:        DecodingKey,
  validation: Validation,
}

impl JwtAuthenticator {
  /// `audience`, when set, must match the token's `aud` claim. Otherwise
  /// `aud` is not checked.
  pub fn new(secret: &str, audience: Option<&str>) -> Self {
    let mut validation = Validation::new(Algorithm::HS256);
    match audience {
      Some(aud) => validation.set_audience(&[aud]),
      None => validation.validate_aud = false,
    }
    Self { key: DecodingKey::from_secret(secret.as_bytes()), validation }
  }

  pub fn verify(&self, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    decode::<Claims>(token, &self.key, &self.validation).map(|data| data.claims)
  }
}

impl Authenticator for JwtAuthenticator {
  fn authenticate(&self, headers: &HeaderMap) -> Result<Identity, ApiError> {
    let token = bearer_token(headers).ok_or(ApiError::Unauthorized)?;
    let claims = self.verify(token).map_err(|e| {
      tracing::debug!(error = %e, "rejected access token");
      ApiError::Unauthorized
    })?;
    if claims.sub.is_empty() {
      return Err(ApiError::Unauthorized);
    }
    Ok(claims.into())
  }
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
  headers
    .get(header::AUTHORIZATION)?
    .to_str()
    .ok()?
    .strip_prefix("Bearer ")
    .map(str::trim)
    .filter(|t| !t.is_empty())
}

// ─── Extractor ───────────────────────────────────────────────────────────────

/// The authenticated caller's account, created on first access.
pub struct CurrentUser(pub UserAccount);

impl<S> FromRequestParts<AppState<S>> for CurrentUser
where
  S: LevelUpStore + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    let identity = state.auth.authenticate(&parts.headers)?;
    let account = state.store.ensure_account(&identity).await.map_err(ApiError::store)?;
    Ok(CurrentUser(account))
  }
}
