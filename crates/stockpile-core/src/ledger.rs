//! [`Ledger`]: the import lifecycle on top of any [`ImportStore`].
//!
//! The ledger is the single entry point for ingestion, review and promotion.
//! It owns three rules the store alone cannot express:
//!
//! - the sanity check (at most one active import per source) runs before any
//!   delta or promotion, and a failure refuses the operation;
//! - only candidates can be diffed, promoted or cancelled;
//! - promotions for the same data source are mutually exclusive. A second
//!   promotion while one is in flight fails with [`Error::Conflict`], and the
//!   store's compare-and-swap rejects any promotion whose reviewed delta has
//!   gone stale.

use std::{
  collections::{BTreeMap, HashSet},
  sync::{Mutex, PoisonError},
};

use strum::IntoEnumIterator as _;
use uuid::Uuid;

use crate::{
  Error, Result,
  delta::{UploadDelta, diff_records},
  import::{
    DataSource, Import, ImportFilter, ImportStatus, Provenance,
    RetentionPolicy,
  },
  record::{NewRecord, Record, RecordKind},
  store::ImportStore,
};

// ─── Ledger ──────────────────────────────────────────────────────────────────

pub struct Ledger<S> {
  store:     S,
  retention: RetentionPolicy,
  /// Sources with a promotion currently in flight.
  promoting: Mutex<HashSet<DataSource>>,
}

/// Releases a source's promotion slot on drop.
struct PromotionSlot<'a> {
  promoting:   &'a Mutex<HashSet<DataSource>>,
  data_source: DataSource,
}

impl Drop for PromotionSlot<'_> {
  fn drop(&mut self) {
    self
      .promoting
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .remove(&self.data_source);
  }
}

impl<S: ImportStore> Ledger<S> {
  pub fn new(store: S) -> Self {
    Self {
      store,
      retention: RetentionPolicy::default(),
      promoting: Mutex::new(HashSet::new()),
    }
  }

  /// Set what happens to a candidate's records when it is cancelled.
  pub fn with_retention(mut self, retention: RetentionPolicy) -> Self {
    self.retention = retention;
    self
  }

  // ── Registry ──────────────────────────────────────────────────────────

  /// Create and persist a new candidate import with no records.
  pub async fn create_candidate(
    &self,
    data_source: DataSource,
    provenance: Provenance,
  ) -> Result<Import> {
    let import = self
      .store
      .insert_import(Import::candidate(data_source, provenance))
      .await
      .map_err(Into::<Error>::into)?;
    tracing::info!(
      import_id = %import.import_id,
      %data_source,
      file_name = %import.provenance.file_name,
      "created candidate import"
    );
    Ok(import)
  }

  /// Attach parsed records to a candidate.
  pub async fn attach_records(
    &self,
    import_id: Uuid,
    records: Vec<NewRecord>,
  ) -> Result<Vec<Record>> {
    let count = records.len();
    let records = self
      .store
      .attach_records(import_id, records)
      .await
      .map_err(Into::<Error>::into)?;
    tracing::debug!(%import_id, count, "attached records");
    Ok(records)
  }

  /// Create a candidate and attach `records` to it.
  pub async fn ingest(
    &self,
    data_source: DataSource,
    provenance: Provenance,
    records: Vec<NewRecord>,
  ) -> Result<(Import, Vec<Record>)> {
    let import = self.create_candidate(data_source, provenance).await?;
    let records = self.attach_records(import.import_id, records).await?;
    Ok((import, records))
  }

  /// Active import counts for every known data source, zeros included.
  pub async fn active_counts(&self) -> Result<BTreeMap<DataSource, usize>> {
    let mut counts: BTreeMap<DataSource, usize> =
      DataSource::iter().map(|s| (s, 0)).collect();
    let active = self.store.count_active().await.map_err(Into::<Error>::into)?;
    for (source, count) in active {
      counts.insert(source, count);
    }
    Ok(counts)
  }

  /// `true` if no data source has more than one active import.
  pub async fn sanity_check(&self) -> Result<bool> {
    match self.ensure_sane().await {
      Ok(()) => Ok(true),
      Err(Error::DomainInvariantViolation { .. }) => Ok(false),
      Err(e) => Err(e),
    }
  }

  /// Like [`Self::sanity_check`] but fails with the offending source.
  pub async fn ensure_sane(&self) -> Result<()> {
    for (data_source, active) in self.active_counts().await? {
      if active > 1 {
        tracing::warn!(
          %data_source,
          active,
          "more than one active import; refusing lifecycle operations"
        );
        return Err(Error::DomainInvariantViolation { data_source, active });
      }
    }
    Ok(())
  }

  pub async fn current_active(
    &self,
    data_source: DataSource,
  ) -> Result<Option<Import>> {
    self.store.current_active(data_source).await.map_err(Into::into)
  }

  pub async fn get_import(&self, import_id: Uuid) -> Result<Import> {
    self
      .store
      .get_import(import_id)
      .await
      .map_err(Into::<Error>::into)?
      .ok_or(Error::ImportNotFound(import_id))
  }

  pub async fn list_imports(&self, filter: ImportFilter) -> Result<Vec<Import>> {
    self.store.list_imports(filter).await.map_err(Into::into)
  }

  /// Records owned by an existing import.
  pub async fn records_for_import(
    &self,
    import_id: Uuid,
    kind: Option<RecordKind>,
  ) -> Result<Vec<Record>> {
    self.get_import(import_id).await?;
    self.store.records_for_import(import_id, kind).await.map_err(Into::into)
  }

  /// Records belonging to currently active imports.
  pub async fn active_records(
    &self,
    kind: Option<RecordKind>,
  ) -> Result<Vec<Record>> {
    self.store.active_records(kind).await.map_err(Into::into)
  }

  // ── Delta engine ──────────────────────────────────────────────────────

  /// Diff a candidate against its source's active import.
  ///
  /// Read-only. Fails if the sanity check fails or the import is not a
  /// candidate.
  pub async fn compute_delta(&self, import_id: Uuid) -> Result<UploadDelta> {
    self.ensure_sane().await?;
    let candidate = self.get_import(import_id).await?;
    require_transition(&candidate, ImportStatus::Active, "compute a delta for")?;

    let previous = self.current_active(candidate.data_source).await?;
    let active_records = match &previous {
      Some(active) => {
        self
          .store
          .records_for_import(active.import_id, None)
          .await
          .map_err(Into::<Error>::into)?
      }
      None => Vec::new(),
    };
    let candidate_records = self
      .store
      .records_for_import(import_id, None)
      .await
      .map_err(Into::<Error>::into)?;

    let delta =
      diff_records(active_records, candidate_records).into_delta(previous, candidate);
    tracing::debug!(
      %import_id,
      previous = ?delta.previous.as_ref().map(|p| p.import_id),
      new_objects = delta.new_object_count(),
      "computed upload delta"
    );
    Ok(delta)
  }

  // ── Lifecycle controller ──────────────────────────────────────────────

  /// Promote a candidate to active, replacing the source's previous active
  /// import. Returns the delta that was computed before the commit.
  pub async fn promote(&self, import_id: Uuid) -> Result<UploadDelta> {
    self.ensure_sane().await?;
    let candidate = self.get_import(import_id).await?;
    require_transition(&candidate, ImportStatus::Active, "promote")?;

    let data_source = candidate.data_source;
    let _slot = self.claim_promotion(data_source)?;

    let delta = self.compute_delta(import_id).await?;
    let expected_previous = delta.previous.as_ref().map(|p| p.import_id);

    let promotion = self
      .store
      .commit_promotion(import_id, expected_previous)
      .await
      .map_err(Into::<Error>::into)
      .inspect_err(|e| {
        if e.is_retryable() {
          tracing::warn!(%import_id, %data_source, "promotion lost a race");
        }
      })?;

    tracing::info!(
      %import_id,
      %data_source,
      replaced = ?promotion.replaced.as_ref().map(|i| i.import_id),
      new_objects = delta.new_object_count(),
      "promoted import"
    );
    Ok(delta)
  }

  /// Cancel a candidate. Its records are kept or purged per the retention
  /// policy.
  pub async fn cancel(&self, import_id: Uuid) -> Result<Import> {
    let import = self
      .store
      .commit_cancellation(import_id, self.retention)
      .await
      .map_err(Into::<Error>::into)?;
    tracing::info!(
      %import_id,
      data_source = %import.data_source,
      retention = ?self.retention,
      "cancelled import"
    );
    Ok(import)
  }

  fn claim_promotion(&self, data_source: DataSource) -> Result<PromotionSlot<'_>> {
    let mut promoting = self
      .promoting
      .lock()
      .unwrap_or_else(PoisonError::into_inner);
    if !promoting.insert(data_source) {
      tracing::warn!(%data_source, "promotion already in flight");
      return Err(Error::Conflict { data_source });
    }
    Ok(PromotionSlot { promoting: &self.promoting, data_source })
  }
}

/// Fail with `InvalidState` unless `import` may move to `next`.
fn require_transition(
  import: &Import,
  next: ImportStatus,
  operation: &'static str,
) -> Result<()> {
  if import.status.can_transition_to(next) {
    Ok(())
  } else {
    Err(Error::InvalidState {
      import_id: import.import_id,
      status: import.status,
      operation,
    })
  }
}
