//! Error type for `stockpile-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A lifecycle rule rejected the operation (not found, invalid state,
  /// conflict, broken invariant).
  #[error("core error: {0}")]
  Core(#[from] stockpile_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("unknown {kind} in database: {value:?}")]
  Decode { kind: &'static str, value: String },
}

impl From<Error> for stockpile_core::Error {
  fn from(e: Error) -> Self {
    match e {
      Error::Core(core) => core,
      other => stockpile_core::Error::Store(Box::new(other)),
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
