//! The `ImportStore` trait: persistence for the Import Registry and the
//! Record Store.
//!
//! The trait is implemented by storage backends (e.g.
//! `stockpile-store-sqlite`). The [`crate::ledger::Ledger`] depends on this
//! abstraction and layers the lifecycle rules on top of it.

use std::future::Future;

use uuid::Uuid;

use crate::{
  import::{DataSource, Import, ImportFilter, Promotion, RetentionPolicy},
  record::{NewRecord, Record, RecordKind},
};

/// Abstraction over a Stockpile storage backend.
///
/// Records are append-only. Import status changes are the only updates a
/// backend performs, and every status change is a single atomic unit.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait ImportStore: Send + Sync {
  /// Backend errors must carry the typed lifecycle failures (conflict,
  /// invalid state, not found) through to the core error.
  type Error: std::error::Error + Send + Sync + 'static + Into<crate::Error>;

  // ── Imports ───────────────────────────────────────────────────────────

  /// Persist a freshly built candidate import.
  fn insert_import(
    &self,
    import: Import,
  ) -> impl Future<Output = Result<Import, Self::Error>> + Send + '_;

  /// Retrieve an import by id. Returns `None` if not found.
  fn get_import(
    &self,
    import_id: Uuid,
  ) -> impl Future<Output = Result<Option<Import>, Self::Error>> + Send + '_;

  /// List imports matching `filter`, newest first.
  fn list_imports(
    &self,
    filter: ImportFilter,
  ) -> impl Future<Output = Result<Vec<Import>, Self::Error>> + Send + '_;

  /// The active import for `data_source`, if any.
  ///
  /// When the invariant has been broken this returns one of the actives;
  /// callers run the sanity check first.
  fn current_active(
    &self,
    data_source: DataSource,
  ) -> impl Future<Output = Result<Option<Import>, Self::Error>> + Send + '_;

  /// Number of imports with status `active`, per data source. Sources with no
  /// active import may be omitted.
  fn count_active(
    &self,
  ) -> impl Future<Output = Result<Vec<(DataSource, usize)>, Self::Error>>
  + Send
  + '_;

  // ── Records ───────────────────────────────────────────────────────────

  /// Attach records to a candidate import in one transaction.
  ///
  /// Fails with `InvalidState` if the import is not a candidate and with
  /// `ImportNotFound` if it does not exist.
  fn attach_records(
    &self,
    import_id: Uuid,
    records: Vec<NewRecord>,
  ) -> impl Future<Output = Result<Vec<Record>, Self::Error>> + Send + '_;

  /// Records owned by an import, optionally restricted to one kind.
  fn records_for_import(
    &self,
    import_id: Uuid,
    kind: Option<RecordKind>,
  ) -> impl Future<Output = Result<Vec<Record>, Self::Error>> + Send + '_;

  /// Records owned by currently active imports, optionally of one kind.
  fn active_records(
    &self,
    kind: Option<RecordKind>,
  ) -> impl Future<Output = Result<Vec<Record>, Self::Error>> + Send + '_;

  // ── Lifecycle ─────────────────────────────────────────────────────────

  /// Atomically promote `candidate_id` to active and replace the current
  /// active import of its source.
  ///
  /// `expected_previous` is the active import the caller reviewed against.
  /// If the source's active import is no longer that one the backend fails
  /// with `Conflict` and writes nothing. A non-candidate fails with
  /// `InvalidState`.
  fn commit_promotion(
    &self,
    candidate_id: Uuid,
    expected_previous: Option<Uuid>,
  ) -> impl Future<Output = Result<Promotion, Self::Error>> + Send + '_;

  /// Atomically move a candidate to `cancelled`, applying `retention` to its
  /// records. A non-candidate fails with `InvalidState`.
  fn commit_cancellation(
    &self,
    import_id: Uuid,
    retention: RetentionPolicy,
  ) -> impl Future<Output = Result<Import, Self::Error>> + Send + '_;
}
