//! `GET /records[?kind=<kind>]`: records of every currently active import.

use std::sync::Arc;

use axum::{Json, extract::State};
use stockpile_core::{ledger::Ledger, record::Record, store::ImportStore};

use crate::{error::ApiError, extract::ApiQuery, imports::KindParams};

pub async fn handler<S: ImportStore>(
  State(ledger): State<Arc<Ledger<S>>>,
  ApiQuery(params): ApiQuery<KindParams>,
) -> Result<Json<Vec<Record>>, ApiError> {
  Ok(Json(ledger.active_records(params.kind).await?))
}
