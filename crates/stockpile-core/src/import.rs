//! Imports: versioned snapshots of one upstream data source.
//!
//! An import owns its records. Its status moves along a small state machine:
//! it is created as a candidate, then becomes either active (on promotion) or
//! cancelled. An active import becomes replaced when a later candidate for the
//! same source is promoted. At most one import per source is active.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoStaticStr};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Data source ─────────────────────────────────────────────────────────────

/// The upstream feed an import was ingested from. Closed set.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumIter,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DataSource {
  EdcPpe,
  EdcMake,
  Inventory,
  DcasDailySourcing,
  FacilityDeliveries,
}

impl DataSource {
  /// Parse the snake_case name used in storage, URLs and the CLI.
  pub fn parse(s: &str) -> Result<Self> {
    Self::from_str(s).map_err(|_| Error::UnknownDiscriminant {
      kind:  "data source",
      value: s.to_owned(),
    })
  }
}

// ─── Status ──────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumIter,
  EnumString,
  IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ImportStatus {
  /// Awaiting review; does not count toward the single-active invariant.
  Candidate,
  /// The currently trusted snapshot for its source.
  Active,
  /// Formerly active, superseded by a later promotion. Terminal.
  Replaced,
  /// Discarded without ever becoming active. Terminal.
  Cancelled,
}

impl ImportStatus {
  /// Whether the lifecycle permits moving from `self` to `next`.
  pub fn can_transition_to(self, next: ImportStatus) -> bool {
    matches!(
      (self, next),
      (Self::Candidate, Self::Active)
        | (Self::Candidate, Self::Cancelled)
        | (Self::Active, Self::Replaced)
    )
  }
}

// ─── Provenance ──────────────────────────────────────────────────────────────

/// Where the uploaded file came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
  #[serde(default)]
  pub uploaded_by:   Option<String>,
  pub file_name:     String,
  /// Checksum of the uploaded file's bytes, as supplied by ingestion.
  pub file_checksum: String,
}

// ─── Import ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Import {
  pub import_id:         Uuid,
  pub data_source:       DataSource,
  pub status:            ImportStatus,
  /// Server-assigned creation timestamp.
  pub imported_at:       DateTime<Utc>,
  pub status_changed_at: DateTime<Utc>,
  pub provenance:        Provenance,
  /// The import whose promotion replaced this one, once replaced.
  pub replaced_by:       Option<Uuid>,
}

impl Import {
  /// Build a fresh candidate. The store persists it.
  pub fn candidate(data_source: DataSource, provenance: Provenance) -> Self {
    let now = Utc::now();
    Self {
      import_id: Uuid::new_v4(),
      data_source,
      status: ImportStatus::Candidate,
      imported_at: now,
      status_changed_at: now,
      provenance,
      replaced_by: None,
    }
  }

  pub fn is_candidate(&self) -> bool { self.status == ImportStatus::Candidate }
}

/// Filter for [`crate::store::ImportStore::list_imports`].
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct ImportFilter {
  pub data_source: Option<DataSource>,
  pub status:      Option<ImportStatus>,
}

// ─── Promotion ───────────────────────────────────────────────────────────────

/// The outcome of an atomic promotion commit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Promotion {
  pub promoted: Import,
  /// The previously active import, now replaced.
  pub replaced: Option<Import>,
}

/// What to do with a candidate's records when it is cancelled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetentionPolicy {
  /// Keep records for audit.
  #[default]
  Retain,
  /// Delete the cancelled candidate's records in the same transaction.
  PurgeCancelled,
}
