//! SQL schema for the secmaster SQLite store.
//!
//! Executed once at connection startup via `PRAGMA user_version`. Future
//! migrations will be gated on that version number.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;
PRAGMA foreign_keys = ON;

-- Events are strictly append-only.
-- No UPDATE or DELETE is ever issued against this table.
CREATE TABLE IF NOT EXISTS events (
    sequence_id   INTEGER PRIMARY KEY AUTOINCREMENT,
    entity_id     INTEGER NOT NULL,
    ticker        TEXT    NOT NULL,
    display_name  TEXT    NOT NULL,
    scenario      TEXT    NOT NULL,   -- discriminant of Scenario variant
    detail_json   TEXT    NOT NULL,   -- JSON payload (inner data only)
    is_active     INTEGER NOT NULL,
    observed_at   TEXT    NOT NULL,   -- fixed-width RFC 3339 UTC
    cycle_id      TEXT    NOT NULL
);

-- Materialised projection: the latest event per entity.
-- Written in the same transaction as the event it points at.
CREATE TABLE IF NOT EXISTS current_state (
    entity_id     INTEGER PRIMARY KEY,
    sequence_id   INTEGER NOT NULL REFERENCES events(sequence_id),
    observed_at   TEXT    NOT NULL
);

-- Per-entity extraction results; replaced on every refresh.
CREATE TABLE IF NOT EXISTS derived_facts (
    entity_id     INTEGER PRIMARY KEY,
    facts_json    TEXT    NOT NULL,
    refreshed_at  TEXT    NOT NULL
);

CREATE TABLE IF NOT EXISTS cycles (
    cycle_id      TEXT    PRIMARY KEY,
    observed_at   TEXT    NOT NULL,
    bootstrap     INTEGER NOT NULL,
    started_at    TEXT    NOT NULL,
    completed_at  TEXT,
    emitted       INTEGER NOT NULL DEFAULT 0,
    skipped       INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS events_entity_idx   ON events(entity_id, observed_at, sequence_id);
CREATE INDEX IF NOT EXISTS events_scenario_idx ON events(scenario);
CREATE INDEX IF NOT EXISTS cycles_completed_idx ON cycles(completed_at);

PRAGMA user_version = 1;
";
