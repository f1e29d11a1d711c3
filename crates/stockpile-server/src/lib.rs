//! Server assembly for Stockpile: configuration loading and the top-level
//! router the `stockpile` binary serves.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use axum::Router;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use stockpile_core::{import::RetentionPolicy, ledger::Ledger, store::ImportStore};
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime configuration, deserialised from `stockpile.toml` and `STOCKPILE_*`
/// environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  pub host:       String,
  pub port:       u16,
  pub store_path: PathBuf,
  /// What cancelling a candidate does to its records.
  #[serde(default)]
  pub retention:  RetentionPolicy,
}

impl ServerConfig {
  /// Load from `path` (optional) overlaid by the environment.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .set_default("host", "127.0.0.1")?
      .set_default("port", 8080_i64)?
      .set_default("store_path", "stockpile.db")?
      .add_source(config::File::from(path).required(false))
      .add_source(config::Environment::with_prefix("STOCKPILE"))
      .build()?
      .try_deserialize()
  }

  /// `host:port` to bind.
  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// The API mounted under `/api`, with request tracing.
pub fn router<S>(ledger: Arc<Ledger<S>>) -> Router
where
  S: ImportStore + 'static,
{
  Router::new()
    .nest("/api", stockpile_api::api_router(ledger))
    .layer(TraceLayer::new_for_http())
}

// ─── Helpers ──────────────────────────────────────────────────────────────────

/// SHA-256 of an uploaded file's bytes, hex encoded.
pub fn file_checksum(bytes: &[u8]) -> String {
  hex::encode(Sha256::digest(bytes))
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

#[cfg(test)]
mod tests {
  use axum::{
    body::Body,
    http::{Request, StatusCode},
  };
  use stockpile_store_sqlite::SqliteStore;
  use tower::ServiceExt as _;
  use uuid::Uuid;

  use super::*;

  #[test]
  fn checksum_is_sha256_hex() {
    assert_eq!(
      file_checksum(b"abc"),
      "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
    );
  }

  #[test]
  fn tilde_expands_only_as_prefix() {
    let plain = Path::new("/var/lib/stockpile.db");
    assert_eq!(expand_tilde(plain), plain);
    assert_eq!(expand_tilde(Path::new("a/~/b")), Path::new("a/~/b"));
    if let Ok(home) = std::env::var("HOME") {
      assert_eq!(
        expand_tilde(Path::new("~/stockpile.db")),
        PathBuf::from(home).join("stockpile.db")
      );
    }
  }

  #[test]
  fn config_file_overrides_defaults() {
    let path =
      std::env::temp_dir().join(format!("stockpile-{}.toml", Uuid::new_v4()));
    std::fs::write(&path, "port = 9090\nretention = \"purge_cancelled\"\n")
      .unwrap();

    let cfg = ServerConfig::load(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(cfg.port, 9090);
    assert_eq!(cfg.retention, RetentionPolicy::PurgeCancelled);
    assert_eq!(cfg.store_path, PathBuf::from("stockpile.db"));
  }

  #[test]
  fn missing_config_file_uses_defaults() {
    let path =
      std::env::temp_dir().join(format!("absent-{}.toml", Uuid::new_v4()));
    let cfg = ServerConfig::load(&path).unwrap();
    assert_eq!(cfg.retention, RetentionPolicy::Retain);
    assert!(!cfg.host.is_empty());
  }

  #[tokio::test]
  async fn api_is_mounted_under_prefix() {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let app = router(Arc::new(Ledger::new(store)));

    let req = Request::builder().uri("/api/sanity").body(Body::empty()).unwrap();
    let resp = app.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);

    let req = Request::builder().uri("/sanity").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
  }
}
