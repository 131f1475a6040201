//! Canonical SQLite schema for the taxdesk store.
//!
//! - `professionals` and `clients` back the two read-only directories
//! - `filings` holds one row per (client, tax year, filing type); the unique
//!   index on that triple is the authority for duplicate detection
//! - `filing_status_history` records every applied status change
//! - `store_meta` tracks the schema version next to `PRAGMA user_version`

/// Migration v1: core tables and the uniqueness guarantee.
pub const MIGRATION_V1_SQL: &str = r"
CREATE TABLE IF NOT EXISTS professionals (
    user_id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    role TEXT NOT NULL CHECK (role IN ('customer', 'ca', 'admin')),
    is_active INTEGER NOT NULL DEFAULT 1 CHECK (is_active IN (0, 1)),
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS clients (
    client_id INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    default_ca_id INTEGER REFERENCES professionals(user_id) ON DELETE SET NULL,
    created_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS filings (
    filing_id INTEGER PRIMARY KEY AUTOINCREMENT,
    client_id INTEGER NOT NULL REFERENCES clients(client_id),
    tax_year TEXT NOT NULL CHECK (
        tax_year GLOB '[0-9][0-9][0-9][0-9]-[0-9][0-9][0-9][0-9]'
        AND CAST(substr(tax_year, 6, 4) AS INTEGER) = CAST(substr(tax_year, 1, 4) AS INTEGER) + 1
    ),
    filing_type TEXT NOT NULL CHECK (filing_type IN ('individual', 'business', 'capital_gains')),
    status TEXT NOT NULL DEFAULT 'draft'
        CHECK (status IN ('draft', 'in_progress', 'under_review', 'completed', 'rejected')),
    priority TEXT NOT NULL DEFAULT 'medium'
        CHECK (priority IN ('low', 'medium', 'high', 'urgent')),
    assigned_ca_id INTEGER REFERENCES professionals(user_id),
    due_date TEXT CHECK (due_date IS NULL OR date(due_date) = due_date),
    income_json TEXT,
    deductions_json TEXT,
    summary_json TEXT,
    notes TEXT,
    created_at_us INTEGER NOT NULL,
    updated_at_us INTEGER NOT NULL
);

CREATE UNIQUE INDEX IF NOT EXISTS ux_filings_client_year_type
    ON filings(client_id, tax_year, filing_type);

CREATE TABLE IF NOT EXISTS filing_status_history (
    history_id INTEGER PRIMARY KEY AUTOINCREMENT,
    filing_id INTEGER NOT NULL REFERENCES filings(filing_id) ON DELETE CASCADE,
    from_status TEXT NOT NULL,
    to_status TEXT NOT NULL,
    note TEXT,
    changed_at_us INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS store_meta (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    schema_version INTEGER NOT NULL,
    created_at_us INTEGER NOT NULL DEFAULT 0
);

INSERT OR IGNORE INTO store_meta (id, schema_version, created_at_us)
VALUES (1, 1, 0);
";

/// Migration v2: read-path indexes for listing, statistics and deadlines.
pub const MIGRATION_V2_SQL: &str = r"
CREATE INDEX IF NOT EXISTS idx_filings_status_created
    ON filings(status, created_at_us DESC);

CREATE INDEX IF NOT EXISTS idx_filings_ca_status
    ON filings(assigned_ca_id, status);

CREATE INDEX IF NOT EXISTS idx_filings_client_created
    ON filings(client_id, created_at_us DESC);

CREATE INDEX IF NOT EXISTS idx_filings_due_date
    ON filings(due_date)
    WHERE due_date IS NOT NULL;

CREATE INDEX IF NOT EXISTS idx_filing_status_history_filing
    ON filing_status_history(filing_id, history_id);

UPDATE store_meta
SET schema_version = 2
WHERE id = 1;
";

/// Indexes expected by list/filter/statistics query paths.
pub const REQUIRED_INDEXES: &[&str] = &[
    "ux_filings_client_year_type",
    "idx_filings_status_created",
    "idx_filings_ca_status",
    "idx_filings_client_created",
    "idx_filings_due_date",
    "idx_filing_status_history_filing",
];
