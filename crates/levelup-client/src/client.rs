//! Async HTTP client wrapping the Level Up! JSON API.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use levelup_core::{
  gate::SubscriptionSummary,
  journal::{IcebergEntry, MoodEntry},
  progress::UserProgress,
  sync::ProgressPatch,
};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;

/// Connection settings for the API.
#[derive(Debug, Clone)]
pub struct ClientConfig {
  pub base_url: String,
  /// Access token from the auth provider; `None` when signed out.
  pub token:    Option<String>,
}

/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct ApiClient {
  client: Client,
  config: ClientConfig,
}

#[derive(Deserialize)]
struct Inserted {
  inserted: usize,
}

impl ApiClient {
  pub fn new(config: ClientConfig) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(30))
      .build()
      .context("failed to build HTTP client")?;
    Ok(Self { client, config })
  }

  pub fn is_signed_in(&self) -> bool { self.config.token.is_some() }

  fn url(&self, path: &str) -> String {
    format!("{}/api{}", self.config.base_url.trim_end_matches('/'), path)
  }

  fn auth(&self, req: RequestBuilder) -> RequestBuilder {
    match &self.config.token {
      Some(token) => req.bearer_auth(token),
      None => req,
    }
  }

  // ── Progress ──────────────────────────────────────────────────────────────

  /// `GET /api/user/progress`
  pub async fn fetch_progress(&self) -> Result<UserProgress> {
    let resp = self
      .auth(self.client.get(self.url("/user/progress")))
      .send()
      .await
      .context("GET /user/progress failed")?;

    if !resp.status().is_success() {
      return Err(anyhow!("GET /user/progress → {}", resp.status()));
    }
    resp.json().await.context("deserialising progress")
  }

  /// `POST /api/user/progress`, returning what the server stored.
  pub async fn push_progress(&self, patch: &ProgressPatch) -> Result<UserProgress> {
    let resp = self
      .auth(self.client.post(self.url("/user/progress")))
      .json(patch)
      .send()
      .await
      .context("POST /user/progress failed")?;

    if !resp.status().is_success() {
      return Err(anyhow!("POST /user/progress → {}", resp.status()));
    }
    resp.json().await.context("deserialising stored progress")
  }

  // ── Subscription ──────────────────────────────────────────────────────────

  /// `GET /api/user/subscription`. `None` when the token is rejected.
  pub async fn fetch_subscription(&self) -> Result<Option<SubscriptionSummary>> {
    let resp = self
      .auth(self.client.get(self.url("/user/subscription")))
      .send()
      .await
      .context("GET /user/subscription failed")?;

    match resp.status() {
      StatusCode::UNAUTHORIZED => Ok(None),
      s if s.is_success() => resp.json().await.map(Some).context("deserialising subscription"),
      s => Err(anyhow!("GET /user/subscription → {s}")),
    }
  }

  // ── Journals ──────────────────────────────────────────────────────────────

  async fn upload<T: serde::Serialize>(&self, path: &str, entries: &[T]) -> Result<usize> {
    let resp = self
      .auth(self.client.post(self.url(path)))
      .json(entries)
      .send()
      .await
      .with_context(|| format!("POST {path} failed"))?;

    if !resp.status().is_success() {
      return Err(anyhow!("POST {path} → {}", resp.status()));
    }
    let body: Inserted = resp.json().await.context("deserialising upload result")?;
    Ok(body.inserted)
  }

  /// `POST /api/user/moods`
  pub async fn upload_moods(&self, entries: &[MoodEntry]) -> Result<usize> {
    self.upload("/user/moods", entries).await
  }

  /// `POST /api/user/iceberg`
  pub async fn upload_iceberg(&self, entries: &[IcebergEntry]) -> Result<usize> {
    self.upload("/user/iceberg", entries).await
  }
}
