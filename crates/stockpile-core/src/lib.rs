//! Core types and trait definitions for the Stockpile import ledger.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! All other crates depend on it; storage backends implement
//! [`store::ImportStore`] and the [`ledger::Ledger`] drives the import
//! lifecycle on top of any of them.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod delta;
pub mod error;
pub mod import;
pub mod ledger;
pub mod record;
pub mod store;

pub use error::{Error, Result};
