//! JSON REST API for Stockpile.
//!
//! Exposes an axum [`Router`] backed by a [`Ledger`] over any
//! [`stockpile_core::store::ImportStore`]. Auth, TLS, and transport concerns
//! are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", stockpile_api::api_router(ledger.clone()))
//! ```

pub mod error;
pub mod extract;
pub mod imports;
pub mod records;
pub mod sources;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use stockpile_core::{ledger::Ledger, store::ImportStore};

pub use error::ApiError;

/// Build a fully-materialised API router for `ledger`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(ledger: Arc<Ledger<S>>) -> Router<()>
where
  S: ImportStore + 'static,
{
  Router::new()
    // Imports
    .route("/imports", get(imports::list::<S>).post(imports::create::<S>))
    .route("/imports/{id}", get(imports::get_one::<S>))
    .route("/imports/{id}/records", get(imports::records::<S>))
    .route("/imports/{id}/delta", get(imports::delta::<S>))
    .route("/imports/{id}/promote", post(imports::promote::<S>))
    .route("/imports/{id}/cancel", post(imports::cancel::<S>))
    // Sources
    .route("/sources/{source}/active", get(sources::active::<S>))
    .route("/sanity", get(sources::sanity::<S>))
    // Active records
    .route("/records", get(records::handler::<S>))
    .with_state(ledger)
}

// ─── Integration tests ────────────────────────────────────────────────────────
