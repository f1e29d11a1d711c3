//! SQL schema for the Stockpile SQLite store.
//!
//! Executed once at connection startup. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS imports (
    import_id         TEXT PRIMARY KEY,
    data_source       TEXT NOT NULL,
    status            TEXT NOT NULL,   -- 'candidate' | 'active' | 'replaced' | 'cancelled'
    imported_at       TEXT NOT NULL,   -- ISO 8601 UTC; server-assigned
    status_changed_at TEXT NOT NULL,
    uploaded_by       TEXT,
    file_name         TEXT NOT NULL,
    file_checksum     TEXT NOT NULL,
    replaced_by       TEXT REFERENCES imports(import_id)
);

-- At most one active import per data source.
CREATE UNIQUE INDEX IF NOT EXISTS imports_one_active_idx
    ON imports(data_source) WHERE status = 'active';
CREATE INDEX IF NOT EXISTS imports_source_idx   ON imports(data_source, status);
CREATE INDEX IF NOT EXISTS imports_imported_idx ON imports(imported_at);

-- Record tables are append-only; rows are only deleted by the
-- purge-cancelled retention policy.
CREATE TABLE IF NOT EXISTS purchases (
    record_id   TEXT PRIMARY KEY,
    import_id   TEXT NOT NULL REFERENCES imports(import_id),
    record_key  TEXT NOT NULL,   -- SHA-256 hex of kind + payload
    value_json  TEXT NOT NULL,
    raw_data    TEXT,
    created_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS purchases_import_idx ON purchases(import_id);

CREATE TABLE IF NOT EXISTS inventory (
    record_id   TEXT PRIMARY KEY,
    import_id   TEXT NOT NULL REFERENCES imports(import_id),
    record_key  TEXT NOT NULL,
    value_json  TEXT NOT NULL,
    raw_data    TEXT,
    created_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS inventory_import_idx ON inventory(import_id);

CREATE TABLE IF NOT EXISTS scheduled_deliveries (
    record_id   TEXT PRIMARY KEY,
    import_id   TEXT NOT NULL REFERENCES imports(import_id),
    record_key  TEXT NOT NULL,
    value_json  TEXT NOT NULL,
    raw_data    TEXT,
    created_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS scheduled_deliveries_import_idx
    ON scheduled_deliveries(import_id);

CREATE TABLE IF NOT EXISTS receipts (
    record_id   TEXT PRIMARY KEY,
    import_id   TEXT NOT NULL REFERENCES imports(import_id),
    record_key  TEXT NOT NULL,
    value_json  TEXT NOT NULL,
    raw_data    TEXT,
    created_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS receipts_import_idx ON receipts(import_id);

CREATE TABLE IF NOT EXISTS facility_deliveries (
    record_id   TEXT PRIMARY KEY,
    import_id   TEXT NOT NULL REFERENCES imports(import_id),
    record_key  TEXT NOT NULL,
    value_json  TEXT NOT NULL,
    raw_data    TEXT,
    created_at  TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS facility_deliveries_import_idx
    ON facility_deliveries(import_id);

PRAGMA user_version = 1;
";
