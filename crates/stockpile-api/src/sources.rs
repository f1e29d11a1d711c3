//! Handlers for per-source state and the single-active sanity check.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/sources/:source/active` | 404 if the source has no active import |
//! | `GET`  | `/sanity` | `{"ok": bool, "active_counts": {...}}` |

use std::{collections::BTreeMap, sync::Arc};

use axum::{Json, extract::State};
use serde::Serialize;
use stockpile_core::{
  import::{DataSource, Import},
  ledger::Ledger,
  store::ImportStore,
};

use crate::{error::ApiError, extract::ApiPath};

/// `GET /sources/:source/active`
pub async fn active<S: ImportStore>(
  State(ledger): State<Arc<Ledger<S>>>,
  ApiPath(source): ApiPath<String>,
) -> Result<Json<Import>, ApiError> {
  let data_source = DataSource::parse(&source)?;
  ledger
    .current_active(data_source)
    .await?
    .map(Json)
    .ok_or_else(|| {
      ApiError::NotFound(format!("no active import for {data_source}"))
    })
}

#[derive(Debug, Serialize)]
pub struct Sanity {
  pub ok:            bool,
  pub active_counts: BTreeMap<DataSource, usize>,
}

/// `GET /sanity`
pub async fn sanity<S: ImportStore>(
  State(ledger): State<Arc<Ledger<S>>>,
) -> Result<Json<Sanity>, ApiError> {
  let active_counts = ledger.active_counts().await?;
  let ok = active_counts.values().all(|&n| n <= 1);
  Ok(Json(Sanity { ok, active_counts }))
}
