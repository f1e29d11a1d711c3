//! [`SqliteStore`]: the SQLite implementation of [`ImportStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::{OptionalExtension as _, TransactionBehavior};
use strum::IntoEnumIterator as _;
use uuid::Uuid;

use stockpile_core::{
  import::{DataSource, Import, ImportFilter, ImportStatus, Promotion, RetentionPolicy},
  record::{NewRecord, Record, RecordKind},
  store::ImportStore,
};

use crate::{
  encode::{
    IMPORT_COLUMNS, RawImport, RawRecord, decode_source, decode_status,
    encode_dt, encode_source, encode_status, encode_uuid, table_for,
  },
  schema::SCHEMA,
  Error, Result,
};

const CANDIDATE: &str = "candidate";
const ACTIVE: &str = "active";

// ─── Guarded writes ──────────────────────────────────────────────────────────

/// Result of a read-check-mutate closure run inside one transaction. Every
/// variant but `Done` means the transaction was rolled back.
enum Guarded<T> {
  Done(T),
  Missing,
  WrongStatus(String),
  /// The source's active import is not the one the caller expected.
  Stale { data_source: String },
  /// The source already has more than one active import.
  Broken { data_source: String, active: usize },
}

impl<T> Guarded<T> {
  fn into_result(self, import_id: Uuid, operation: &'static str) -> Result<T> {
    let core = match self {
      Guarded::Done(v) => return Ok(v),
      Guarded::Missing => stockpile_core::Error::ImportNotFound(import_id),
      Guarded::WrongStatus(status) => stockpile_core::Error::InvalidState {
        import_id,
        status: decode_status(&status)?,
        operation,
      },
      Guarded::Stale { data_source } => stockpile_core::Error::Conflict {
        data_source: decode_source(&data_source)?,
      },
      Guarded::Broken { data_source, active } => {
        stockpile_core::Error::DomainInvariantViolation {
          data_source: decode_source(&data_source)?,
          active,
        }
      }
    };
    Err(core.into())
  }
}

/// Read an import row on an open connection or transaction.
fn query_import(
  conn: &rusqlite::Connection,
  id: &str,
) -> rusqlite::Result<Option<RawImport>> {
  conn
    .query_row(
      &format!("SELECT {IMPORT_COLUMNS} FROM imports WHERE import_id = ?1"),
      rusqlite::params![id],
      RawImport::from_row,
    )
    .optional()
}

/// `(data_source, status)` of an import, if it exists.
fn query_source_status(
  conn: &rusqlite::Connection,
  id: &str,
) -> rusqlite::Result<Option<(String, String)>> {
  conn
    .query_row(
      "SELECT data_source, status FROM imports WHERE import_id = ?1",
      rusqlite::params![id],
      |r| Ok((r.get(0)?, r.get(1)?)),
    )
    .optional()
}

/// Read every record of the given kinds from their tables, with an optional
/// SQL condition over the record alias `r` and imports alias `i`.
fn query_records(
  conn: &rusqlite::Connection,
  kinds: &[RecordKind],
  condition: &str,
  params: &[&dyn rusqlite::ToSql],
) -> rusqlite::Result<Vec<RawRecord>> {
  let mut out = Vec::new();
  for kind in kinds {
    let kind_str = kind.to_string();
    let sql = format!(
      "SELECT r.record_id, r.import_id, r.record_key, r.value_json,
              r.raw_data, r.created_at
       FROM {table} r
       JOIN imports i ON i.import_id = r.import_id
       WHERE {condition}
       ORDER BY r.rowid",
      table = table_for(*kind),
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
      .query_map(params, |row| {
        Ok(RawRecord {
          kind:       kind_str.clone(),
          record_id:  row.get(0)?,
          import_id:  row.get(1)?,
          record_key: row.get(2)?,
          value_json: row.get(3)?,
          raw_data:   row.get(4)?,
          created_at: row.get(5)?,
        })
      })?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    out.extend(rows);
  }
  Ok(out)
}

fn kinds(kind: Option<RecordKind>) -> Vec<RecordKind> {
  match kind {
    Some(k) => vec![k],
    None => RecordKind::iter().collect(),
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Stockpile import store backed by a single SQLite file.
///
/// Cloning is cheap: the inner connection is reference-counted, and every
/// clone talks to the same database thread.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── ImportStore impl ────────────────────────────────────────────────────────

impl ImportStore for SqliteStore {
  type Error = Error;

  // ── Imports ───────────────────────────────────────────────────────────────

  async fn insert_import(&self, import: Import) -> Result<Import> {
    let raw = RawImport::encode(&import);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          &format!(
            "INSERT INTO imports ({IMPORT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
          ),
          rusqlite::params![
            raw.import_id,
            raw.data_source,
            raw.status,
            raw.imported_at,
            raw.status_changed_at,
            raw.uploaded_by,
            raw.file_name,
            raw.file_checksum,
            raw.replaced_by,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(import)
  }

  async fn get_import(&self, import_id: Uuid) -> Result<Option<Import>> {
    let id_str = encode_uuid(import_id);

    let raw = self
      .conn
      .call(move |conn| Ok(query_import(conn, &id_str)?))
      .await?;

    raw.map(RawImport::into_import).transpose()
  }

  async fn list_imports(&self, filter: ImportFilter) -> Result<Vec<Import>> {
    let source_str = filter.data_source.map(encode_source);
    let status_str = filter.status.map(encode_status);

    let raws: Vec<RawImport> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {IMPORT_COLUMNS} FROM imports
           WHERE (?1 IS NULL OR data_source = ?1)
             AND (?2 IS NULL OR status = ?2)
           ORDER BY imported_at DESC, rowid DESC"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![source_str, status_str],
            RawImport::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawImport::into_import).collect()
  }

  async fn current_active(&self, data_source: DataSource) -> Result<Option<Import>> {
    let source_str = encode_source(data_source);

    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {IMPORT_COLUMNS} FROM imports
                 WHERE data_source = ?1 AND status = ?2
                 ORDER BY status_changed_at DESC
                 LIMIT 1"
              ),
              rusqlite::params![source_str, ACTIVE],
              RawImport::from_row,
            )
            .optional()?,
        )
      })
      .await?;

    raw.map(RawImport::into_import).transpose()
  }

  async fn count_active(&self) -> Result<Vec<(DataSource, usize)>> {
    let rows: Vec<(String, i64)> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT data_source, COUNT(*) FROM imports
           WHERE status = ?1
           GROUP BY data_source",
        )?;
        let rows = stmt
          .query_map(rusqlite::params![ACTIVE], |r| Ok((r.get(0)?, r.get(1)?)))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    rows
      .into_iter()
      .map(|(source, count)| Ok((decode_source(&source)?, count as usize)))
      .collect()
  }

  // ── Records ───────────────────────────────────────────────────────────────

  async fn attach_records(
    &self,
    import_id: Uuid,
    records: Vec<NewRecord>,
  ) -> Result<Vec<Record>> {
    let records: Vec<Record> = records
      .into_iter()
      .map(|r| r.into_record(import_id))
      .collect::<stockpile_core::Result<_>>()?;
    let rows: Vec<(&'static str, RawRecord)> = records
      .iter()
      .map(|r| Ok((table_for(r.kind()), RawRecord::encode(r)?)))
      .collect::<Result<_>>()?;
    let id_str = encode_uuid(import_id);

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some((_, status)) = query_source_status(&tx, &id_str)? else {
          return Ok(Guarded::Missing);
        };
        if status != CANDIDATE {
          return Ok(Guarded::WrongStatus(status));
        }

        for (table, raw) in &rows {
          tx.execute(
            &format!(
              "INSERT INTO {table} (record_id, import_id, record_key, value_json,
                                    raw_data, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
            ),
            rusqlite::params![
              raw.record_id,
              raw.import_id,
              raw.record_key,
              raw.value_json,
              raw.raw_data,
              raw.created_at,
            ],
          )?;
        }

        tx.commit()?;
        Ok(Guarded::Done(()))
      })
      .await?;

    outcome.into_result(import_id, "attach records to")?;
    Ok(records)
  }

  async fn records_for_import(
    &self,
    import_id: Uuid,
    kind: Option<RecordKind>,
  ) -> Result<Vec<Record>> {
    let id_str = encode_uuid(import_id);
    let kinds = kinds(kind);

    let raws = self
      .conn
      .call(move |conn| {
        Ok(query_records(
          conn,
          &kinds,
          "r.import_id = ?1",
          rusqlite::params![id_str],
        )?)
      })
      .await?;

    raws.into_iter().map(RawRecord::into_record).collect()
  }

  async fn active_records(&self, kind: Option<RecordKind>) -> Result<Vec<Record>> {
    let kinds = kinds(kind);

    let raws = self
      .conn
      .call(move |conn| {
        Ok(query_records(conn, &kinds, "i.status = ?1", rusqlite::params![ACTIVE])?)
      })
      .await?;

    raws.into_iter().map(RawRecord::into_record).collect()
  }

  // ── Lifecycle ─────────────────────────────────────────────────────────────

  async fn commit_promotion(
    &self,
    candidate_id: Uuid,
    expected_previous: Option<Uuid>,
  ) -> Result<Promotion> {
    let id_str = encode_uuid(candidate_id);
    let expected_str = expected_previous.map(encode_uuid);
    let now_str = encode_dt(Utc::now());

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some((data_source, status)) = query_source_status(&tx, &id_str)? else {
          return Ok(Guarded::Missing);
        };
        if status != CANDIDATE {
          return Ok(Guarded::WrongStatus(status));
        }

        let actives: Vec<String> = {
          let mut stmt = tx.prepare(
            "SELECT import_id FROM imports WHERE data_source = ?1 AND status = ?2",
          )?;
          stmt
            .query_map(rusqlite::params![data_source, ACTIVE], |r| r.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        if actives.len() > 1 {
          return Ok(Guarded::Broken { data_source, active: actives.len() });
        }
        let previous = actives.into_iter().next();
        if previous != expected_str {
          return Ok(Guarded::Stale { data_source });
        }

        // Demote first so the partial unique index never sees two actives.
        if let Some(prev) = &previous {
          tx.execute(
            "UPDATE imports
             SET status = 'replaced', status_changed_at = ?2, replaced_by = ?3
             WHERE import_id = ?1",
            rusqlite::params![prev, now_str, id_str],
          )?;
        }
        tx.execute(
          "UPDATE imports SET status = ?2, status_changed_at = ?3
           WHERE import_id = ?1",
          rusqlite::params![id_str, ACTIVE, now_str],
        )?;

        let promoted = query_import(&tx, &id_str)?;
        let replaced = match &previous {
          Some(prev) => query_import(&tx, prev)?,
          None => None,
        };

        tx.commit()?;
        Ok(Guarded::Done((promoted, replaced)))
      })
      .await?;

    let (promoted, replaced) = outcome.into_result(candidate_id, "promote")?;
    let promoted = promoted
      .ok_or(stockpile_core::Error::ImportNotFound(candidate_id))?
      .into_import()?;
    let replaced = replaced.map(RawImport::into_import).transpose()?;

    Ok(Promotion { promoted, replaced })
  }

  async fn commit_cancellation(
    &self,
    import_id: Uuid,
    retention: RetentionPolicy,
  ) -> Result<Import> {
    let id_str = encode_uuid(import_id);
    let now_str = encode_dt(Utc::now());
    let cancelled = encode_status(ImportStatus::Cancelled);

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let Some((_, status)) = query_source_status(&tx, &id_str)? else {
          return Ok(Guarded::Missing);
        };
        if status != CANDIDATE {
          return Ok(Guarded::WrongStatus(status));
        }

        tx.execute(
          "UPDATE imports SET status = ?2, status_changed_at = ?3
           WHERE import_id = ?1",
          rusqlite::params![id_str, cancelled, now_str],
        )?;

        if retention == RetentionPolicy::PurgeCancelled {
          for kind in RecordKind::iter() {
            tx.execute(
              &format!("DELETE FROM {} WHERE import_id = ?1", table_for(kind)),
              rusqlite::params![id_str],
            )?;
          }
        }

        let import = query_import(&tx, &id_str)?;
        tx.commit()?;
        Ok(Guarded::Done(import))
      })
      .await?;

    outcome
      .into_result(import_id, "cancel")?
      .ok_or(stockpile_core::Error::ImportNotFound(import_id))?
      .into_import()
  }
}
