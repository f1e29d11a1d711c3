//! Error types for `stockpile-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::import::{DataSource, ImportStatus};

#[derive(Debug, Error)]
pub enum Error {
  /// More than one import is active for a data source. Never auto-corrected.
  #[error("{active} active imports for data source {data_source}")]
  DomainInvariantViolation {
    data_source: DataSource,
    active:      usize,
  },

  #[error("cannot {operation} import {import_id}: status is {status}")]
  InvalidState {
    import_id: Uuid,
    status:    ImportStatus,
    operation: &'static str,
  },

  /// Another promotion for the same source won the race. Retryable.
  #[error("concurrent promotion for data source {data_source}")]
  Conflict { data_source: DataSource },

  #[error("import not found: {0}")]
  ImportNotFound(Uuid),

  #[error("unknown {kind} discriminant: {value:?}")]
  UnknownDiscriminant { kind: &'static str, value: String },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Whether the caller may re-validate and try again.
  pub fn is_retryable(&self) -> bool { matches!(self, Self::Conflict { .. }) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
