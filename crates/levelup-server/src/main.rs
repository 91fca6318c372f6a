//! levelup-server binary.
//!
//! Reads `config.toml` (or the path given with `--config`) under `LEVELUP_*`
//! environment overrides, opens an in-process SQLite store, and serves the
//! JSON API under `/api`.

mod settings;

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use axum::Router;
use clap::Parser;
use levelup_api::{
  ApiConfig, AppState,
  auth::JwtAuthenticator,
  stripe::{StripeClient, StripeConfig},
};
use levelup_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use settings::ServerConfig;

#[derive(Parser)]
#[command(author, version, about = "Level Up! progress and subscription server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let server_cfg = ServerConfig::load(&cli.config)?;

  let database_path = expand_tilde(&server_cfg.database_path);
  let store = SqliteStore::open(&database_path)
    .await
    .with_context(|| format!("failed to open store at {database_path:?}"))?;

  let payments = StripeClient::new(StripeConfig {
    api_base:       server_cfg.stripe_api_base.clone(),
    secret_key:     server_cfg.stripe_secret_key.clone(),
    webhook_secret: server_cfg.stripe_webhook_secret.clone(),
  })
  .context("failed to build payments client")?;

  let state = AppState {
    store:    Arc::new(store),
    auth:     Arc::new(JwtAuthenticator::new(
      &server_cfg.jwt_secret,
      server_cfg.jwt_audience.as_deref(),
    )),
    payments: Arc::new(payments),
    config:   Arc::new(ApiConfig {
      app_url: server_cfg.app_url.clone(),
      prices:  server_cfg.prices.clone(),
    }),
  };

  let app = Router::new().nest("/api", levelup_api::api_router(state));
  let address = server_cfg.address();

  tracing::info!(database = ?database_path, "Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
