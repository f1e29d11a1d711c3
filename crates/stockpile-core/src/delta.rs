//! Delta computation between a candidate import and the active one.
//!
//! The report is never stored; it is derived on demand and handed to the
//! operator before promotion.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::{
  import::Import,
  record::{Record, RecordKey, RecordKind},
};

/// Per-kind record counts.
pub type KindStats = BTreeMap<RecordKind, usize>;

/// The difference between a candidate and its source's active import.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadDelta {
  /// The active import compared against; `None` for a source's first import.
  pub previous:        Option<Import>,
  pub candidate:       Import,
  pub active_stats:    KindStats,
  pub candidate_stats: KindStats,
  /// Records in the candidate whose key is absent from the active side.
  pub new_objects:     BTreeMap<RecordKind, Vec<Record>>,
}

impl UploadDelta {
  /// True when every kind's new-object set is empty.
  pub fn is_unchanged(&self) -> bool {
    self.new_objects.values().all(Vec::is_empty)
  }

  /// Total number of new objects across all kinds.
  pub fn new_object_count(&self) -> usize {
    self.new_objects.values().map(Vec::len).sum()
  }
}

/// The parts of an [`UploadDelta`] that depend only on the two record sets.
#[derive(Debug, Clone, Default)]
pub struct RecordDiff {
  pub active_stats:    KindStats,
  pub candidate_stats: KindStats,
  pub new_objects:     BTreeMap<RecordKind, Vec<Record>>,
}

impl RecordDiff {
  pub fn into_delta(self, previous: Option<Import>, candidate: Import) -> UploadDelta {
    UploadDelta {
      previous,
      candidate,
      active_stats: self.active_stats,
      candidate_stats: self.candidate_stats,
      new_objects: self.new_objects,
    }
  }
}

/// Group records by kind, preserving input order within a kind.
pub fn group_by_kind(records: Vec<Record>) -> BTreeMap<RecordKind, Vec<Record>> {
  let mut grouped: BTreeMap<RecordKind, Vec<Record>> = BTreeMap::new();
  for record in records {
    grouped.entry(record.kind()).or_default().push(record);
  }
  grouped
}

fn stats(grouped: &BTreeMap<RecordKind, Vec<Record>>) -> KindStats {
  grouped.iter().map(|(kind, recs)| (*kind, recs.len())).collect()
}

/// Compute per-kind stats for each side and the candidate-minus-active set
/// difference by record key.
///
/// Every kind present on either side gets a `new_objects` entry, possibly
/// empty. Candidate records sharing a key collapse to the first occurrence.
pub fn diff_records(active: Vec<Record>, candidate: Vec<Record>) -> RecordDiff {
  let active = group_by_kind(active);
  let candidate = group_by_kind(candidate);

  let active_stats = stats(&active);
  let candidate_stats = stats(&candidate);

  let kinds: BTreeSet<RecordKind> =
    active.keys().chain(candidate.keys()).copied().collect();

  let mut candidate = candidate;
  let mut new_objects = BTreeMap::new();
  for kind in kinds {
    let known: BTreeSet<&RecordKey> = active
      .get(&kind)
      .map(|recs| recs.iter().map(|r| &r.record_key).collect())
      .unwrap_or_default();

    let mut seen: BTreeSet<RecordKey> = BTreeSet::new();
    let fresh: Vec<Record> = candidate
      .remove(&kind)
      .unwrap_or_default()
      .into_iter()
      .filter(|r| !known.contains(&r.record_key))
      .filter(|r| seen.insert(r.record_key.clone()))
      .collect();

    new_objects.insert(kind, fresh);
  }

  RecordDiff { active_stats, candidate_stats, new_objects }
}
