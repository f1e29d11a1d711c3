//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! All timestamps are stored as RFC 3339 strings. Enums are stored as their
//! snake_case names. Record payloads are stored as compact JSON without the
//! kind tag; the kind is implied by the table. UUIDs are stored as hyphenated
//! lowercase strings.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use stockpile_core::{
  import::{DataSource, Import, ImportStatus, Provenance},
  record::{Record, RecordKey, RecordKind, RecordValue},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Enums ───────────────────────────────────────────────────────────────────

pub fn encode_source(s: DataSource) -> &'static str { s.into() }

pub fn decode_source(s: &str) -> Result<DataSource> {
  DataSource::from_str(s).map_err(|_| Error::Decode {
    kind:  "data source",
    value: s.to_owned(),
  })
}

pub fn encode_status(s: ImportStatus) -> &'static str { s.into() }

pub fn decode_status(s: &str) -> Result<ImportStatus> {
  ImportStatus::from_str(s).map_err(|_| Error::Decode {
    kind:  "import status",
    value: s.to_owned(),
  })
}

pub fn decode_kind(s: &str) -> Result<RecordKind> {
  RecordKind::from_str(s).map_err(|_| Error::Decode {
    kind:  "record kind",
    value: s.to_owned(),
  })
}

/// The table holding records of `kind`.
pub fn table_for(kind: RecordKind) -> &'static str {
  match kind {
    RecordKind::Purchase => "purchases",
    RecordKind::Inventory => "inventory",
    RecordKind::ScheduledDelivery => "scheduled_deliveries",
    RecordKind::Receipt => "receipts",
    RecordKind::FacilityDelivery => "facility_deliveries",
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawImport::from_row`].
pub const IMPORT_COLUMNS: &str = "import_id, data_source, status, imported_at,
  status_changed_at, uploaded_by, file_name, file_checksum, replaced_by";

/// Raw strings read directly from an `imports` row.
pub struct RawImport {
  pub import_id:         String,
  pub data_source:       String,
  pub status:            String,
  pub imported_at:       String,
  pub status_changed_at: String,
  pub uploaded_by:       Option<String>,
  pub file_name:         String,
  pub file_checksum:     String,
  pub replaced_by:       Option<String>,
}

impl RawImport {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      import_id:         row.get(0)?,
      data_source:       row.get(1)?,
      status:            row.get(2)?,
      imported_at:       row.get(3)?,
      status_changed_at: row.get(4)?,
      uploaded_by:       row.get(5)?,
      file_name:         row.get(6)?,
      file_checksum:     row.get(7)?,
      replaced_by:       row.get(8)?,
    })
  }

  pub fn encode(import: &Import) -> Self {
    Self {
      import_id:         encode_uuid(import.import_id),
      data_source:       encode_source(import.data_source).to_owned(),
      status:            encode_status(import.status).to_owned(),
      imported_at:       encode_dt(import.imported_at),
      status_changed_at: encode_dt(import.status_changed_at),
      uploaded_by:       import.provenance.uploaded_by.clone(),
      file_name:         import.provenance.file_name.clone(),
      file_checksum:     import.provenance.file_checksum.clone(),
      replaced_by:       import.replaced_by.map(encode_uuid),
    }
  }

  pub fn into_import(self) -> Result<Import> {
    Ok(Import {
      import_id:         decode_uuid(&self.import_id)?,
      data_source:       decode_source(&self.data_source)?,
      status:            decode_status(&self.status)?,
      imported_at:       decode_dt(&self.imported_at)?,
      status_changed_at: decode_dt(&self.status_changed_at)?,
      provenance:        Provenance {
        uploaded_by:   self.uploaded_by,
        file_name:     self.file_name,
        file_checksum: self.file_checksum,
      },
      replaced_by:       self.replaced_by.as_deref().map(decode_uuid).transpose()?,
    })
  }
}

/// Raw strings read from one of the record tables, tagged with the table's
/// kind.
pub struct RawRecord {
  pub kind:       String,
  pub record_id:  String,
  pub import_id:  String,
  pub record_key: String,
  pub value_json: String,
  pub raw_data:   Option<String>,
  pub created_at: String,
}

impl RawRecord {
  pub fn encode(record: &Record) -> Result<Self> {
    Ok(Self {
      kind:       record.kind().to_string(),
      record_id:  encode_uuid(record.record_id),
      import_id:  encode_uuid(record.import_id),
      record_key: record.record_key.as_str().to_owned(),
      value_json: record.value.to_json()?.to_string(),
      raw_data:   record.raw_data.as_ref().map(|v| v.to_string()),
      created_at: encode_dt(record.created_at),
    })
  }

  pub fn into_record(self) -> Result<Record> {
    let kind = decode_kind(&self.kind)?;
    let data: serde_json::Value = serde_json::from_str(&self.value_json)?;
    let raw_data = self
      .raw_data
      .as_deref()
      .map(serde_json::from_str)
      .transpose()?;

    Ok(Record {
      record_id: decode_uuid(&self.record_id)?,
      import_id: decode_uuid(&self.import_id)?,
      record_key: RecordKey::from_stored(self.record_key),
      value: RecordValue::from_parts(kind, data)?,
      raw_data,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}
