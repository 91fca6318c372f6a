//! Server configuration, layered from an optional TOML file and `LEVELUP_*`
//! environment variables.

use std::path::{Path, PathBuf};

use anyhow::Context as _;
use levelup_api::{PlanPrices, stripe::DEFAULT_API_BASE};
use serde::Deserialize;

/// Prefix for environment overrides; nested keys use `__`
/// (`LEVELUP_PRICES__CHILD_MONTHLY`).
pub const ENV_PREFIX: &str = "LEVELUP";

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                  String,
  #[serde(default = "default_port")]
  pub port:                  u16,
  #[serde(default = "default_database_path")]
  pub database_path:         PathBuf,
  pub app_url:               String,
  pub jwt_secret:            String,
  #[serde(default)]
  pub jwt_audience:          Option<String>,
  pub stripe_secret_key:     String,
  pub stripe_webhook_secret: String,
  #[serde(default = "default_stripe_api_base")]
  pub stripe_api_base:       String,
  #[serde(default)]
  pub prices:                PlanPrices,
}

fn default_host() -> String { "127.0.0.1".to_owned() }

fn default_port() -> u16 { 3000 }

fn default_database_path() -> PathBuf { PathBuf::from("levelup.db") }

fn default_stripe_api_base() -> String { DEFAULT_API_BASE.to_owned() }

impl ServerConfig {
  /// Read `path` (if it exists) under the environment.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let settings = config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix(ENV_PREFIX)
          .prefix_separator("_")
          .separator("__"),
      )
      .build()
      .context("failed to read config file")?;

    settings.try_deserialize().context("failed to deserialise ServerConfig")
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}
