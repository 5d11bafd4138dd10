//! SQL schema for the hema SQLite store.
//!
//! Executed once at connection startup. Both [`crate::SqliteMarket`] and
//! [`crate::LocalIdentity`] run the full batch; every statement is
//! idempotent, so sharing one database file is safe.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS accounts (
    subject_id    TEXT PRIMARY KEY,
    email         TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,    -- argon2 PHC string
    created_at    TEXT NOT NULL
);

-- Custom token claims. Written by external administrative tooling only;
-- the application reads them at session resolution.
CREATE TABLE IF NOT EXISTS claims (
    subject_id  TEXT PRIMARY KEY REFERENCES accounts(subject_id) ON DELETE CASCADE,
    claims_json TEXT NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS profiles (
    subject_id   TEXT PRIMARY KEY,
    display_name TEXT NOT NULL,
    email        TEXT NOT NULL,
    phone        TEXT,
    raw_role     TEXT,              -- self-reported; normalized at resolution
    created_at   TEXT NOT NULL
);

-- 'status' is the sole stored source of truth for approval.
CREATE TABLE IF NOT EXISTS facilities (
    subject_id     TEXT PRIMARY KEY,
    name           TEXT NOT NULL,
    license_no     TEXT NOT NULL,
    contact_phone  TEXT,
    address        TEXT,
    price_per_unit INTEGER NOT NULL,
    status         TEXT NOT NULL DEFAULT 'pending',
    approved_at    TEXT,
    rejected_at    TEXT,
    created_at     TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS inventory (
    facility_id TEXT NOT NULL REFERENCES facilities(subject_id) ON DELETE CASCADE,
    blood_group TEXT NOT NULL,
    units       INTEGER NOT NULL,
    PRIMARY KEY (facility_id, blood_group)
);

CREATE TABLE IF NOT EXISTS requests (
    request_id   TEXT PRIMARY KEY,
    facility_id  TEXT NOT NULL,
    requester_id TEXT NOT NULL,
    blood_group  TEXT NOT NULL,
    units        INTEGER NOT NULL,
    total_cost   INTEGER NOT NULL,
    status       TEXT NOT NULL DEFAULT 'pending',
    created_at   TEXT NOT NULL,
    completed_at TEXT
);

CREATE TABLE IF NOT EXISTS donations (
    donation_id    TEXT PRIMARY KEY,
    donor_id       TEXT NOT NULL,
    facility_id    TEXT NOT NULL,
    blood_group    TEXT NOT NULL,
    preferred_date TEXT NOT NULL,   -- ISO calendar date
    status         TEXT NOT NULL DEFAULT 'pending',
    created_at     TEXT NOT NULL,
    completed_at   TEXT
);

-- One aggregate row per facility, mutated only by the fulfillment
-- workflow through an atomic upsert-increment.
CREATE TABLE IF NOT EXISTS ledgers (
    facility_id            TEXT PRIMARY KEY,
    total_revenue          INTEGER NOT NULL DEFAULT 0,
    monthly_revenue        INTEGER NOT NULL DEFAULT 0,
    weekly_revenue         INTEGER NOT NULL DEFAULT 0,
    completed_transactions INTEGER NOT NULL DEFAULT 0,
    updated_at             TEXT NOT NULL
);

-- Transactions are strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS transactions (
    transaction_id TEXT PRIMARY KEY,
    facility_id    TEXT NOT NULL,
    request_id     TEXT NOT NULL,
    blood_group    TEXT NOT NULL,
    amount         INTEGER NOT NULL,
    recorded_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS requests_facility_idx     ON requests(facility_id);
CREATE INDEX IF NOT EXISTS donations_donor_idx       ON donations(donor_id);
CREATE INDEX IF NOT EXISTS donations_facility_idx    ON donations(facility_id);
CREATE INDEX IF NOT EXISTS transactions_facility_idx ON transactions(facility_id);

PRAGMA user_version = 1;
";
