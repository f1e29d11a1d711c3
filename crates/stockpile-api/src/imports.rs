//! Handlers for `/imports` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/imports` | Optional `?data_source=` and `?status=` |
//! | `POST` | `/imports` | Body: `{"data_source", "provenance", "records"}` |
//! | `GET`  | `/imports/:id` | 404 if not found |
//! | `GET`  | `/imports/:id/records` | Optional `?kind=` |
//! | `GET`  | `/imports/:id/delta` | Candidates only |
//! | `POST` | `/imports/:id/promote` | Returns the reviewed delta |
//! | `POST` | `/imports/:id/cancel` | Returns the cancelled import |

use std::sync::Arc;

use axum::{
  Json,
  extract::State,
  http::StatusCode,
  response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use stockpile_core::{
  delta::UploadDelta,
  import::{DataSource, Import, ImportFilter, Provenance},
  ledger::Ledger,
  record::{NewRecord, Record, RecordKind},
  store::ImportStore,
};
use uuid::Uuid;

use crate::{
  error::ApiError,
  extract::{ApiJson, ApiPath, ApiQuery},
};

// ─── List ─────────────────────────────────────────────────────────────────────

/// `GET /imports[?data_source=<source>][&status=<status>]`
pub async fn list<S: ImportStore>(
  State(ledger): State<Arc<Ledger<S>>>,
  ApiQuery(filter): ApiQuery<ImportFilter>,
) -> Result<Json<Vec<Import>>, ApiError> {
  Ok(Json(ledger.list_imports(filter).await?))
}

// ─── Create ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CreateBody {
  pub data_source: DataSource,
  pub provenance:  Provenance,
  #[serde(default)]
  pub records:     Vec<NewRecord>,
}

#[derive(Debug, Serialize)]
pub struct Created {
  #[serde(flatten)]
  pub import:       Import,
  pub record_count: usize,
}

/// `POST /imports`: create a candidate and attach its records.
pub async fn create<S: ImportStore>(
  State(ledger): State<Arc<Ledger<S>>>,
  ApiJson(body): ApiJson<CreateBody>,
) -> Result<impl IntoResponse, ApiError> {
  let (import, records) = ledger
    .ingest(body.data_source, body.provenance, body.records)
    .await?;
  let created = Created { import, record_count: records.len() };
  Ok((StatusCode::CREATED, Json(created)))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /imports/:id`
pub async fn get_one<S: ImportStore>(
  State(ledger): State<Arc<Ledger<S>>>,
  ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Import>, ApiError> {
  Ok(Json(ledger.get_import(id).await?))
}

// ─── Records ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct KindParams {
  pub kind: Option<RecordKind>,
}

/// `GET /imports/:id/records[?kind=<kind>]`
pub async fn records<S: ImportStore>(
  State(ledger): State<Arc<Ledger<S>>>,
  ApiPath(id): ApiPath<Uuid>,
  ApiQuery(params): ApiQuery<KindParams>,
) -> Result<Json<Vec<Record>>, ApiError> {
  Ok(Json(ledger.records_for_import(id, params.kind).await?))
}

// ─── Lifecycle ────────────────────────────────────────────────────────────────

/// `GET /imports/:id/delta`
pub async fn delta<S: ImportStore>(
  State(ledger): State<Arc<Ledger<S>>>,
  ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<UploadDelta>, ApiError> {
  Ok(Json(ledger.compute_delta(id).await?))
}

/// `POST /imports/:id/promote`
pub async fn promote<S: ImportStore>(
  State(ledger): State<Arc<Ledger<S>>>,
  ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<UploadDelta>, ApiError> {
  Ok(Json(ledger.promote(id).await?))
}

/// `POST /imports/:id/cancel`
pub async fn cancel<S: ImportStore>(
  State(ledger): State<Arc<Ledger<S>>>,
  ApiPath(id): ApiPath<Uuid>,
) -> Result<Json<Import>, ApiError> {
  Ok(Json(ledger.cancel(id).await?))
}
