//! SQLite schema.
//!
//! Timestamps are RFC 3339 text with nanoseconds; lists, maps and analysis
//! results are JSON text.

use rusqlite::Connection;

use super::PersistenceError;

/// Schema version recorded in `PRAGMA user_version`
pub const SCHEMA_VERSION: i32 = 1;

/// Executed with `IF NOT EXISTS`, safe to replay on an existing database
pub const SCHEMA_STATEMENTS: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS space_law_documents (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        source_url TEXT NOT NULL,
        law_type TEXT NOT NULL,
        jurisdiction TEXT NOT NULL,
        date_published TEXT,
        date_collected TEXT NOT NULL,
        keywords TEXT NOT NULL DEFAULT '[]',
        summary TEXT,
        status TEXT NOT NULL DEFAULT 'pending',
        metadata TEXT NOT NULL DEFAULT '{}'
    );",
    "CREATE TABLE IF NOT EXISTS space_events (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        description TEXT NOT NULL,
        event_type TEXT NOT NULL,
        date_occurred TEXT NOT NULL,
        participants TEXT NOT NULL DEFAULT '[]',
        location TEXT,
        legal_implications TEXT,
        metadata TEXT NOT NULL DEFAULT '{}'
    );",
    "CREATE TABLE IF NOT EXISTS legal_analyses (
        id TEXT PRIMARY KEY,
        document_id TEXT NOT NULL REFERENCES space_law_documents(id) ON DELETE CASCADE,
        analysis_type TEXT NOT NULL,
        results TEXT NOT NULL,
        confidence_score REAL NOT NULL CHECK (confidence_score >= 0.0 AND confidence_score <= 1.0),
        methodology TEXT NOT NULL,
        analyst_notes TEXT,
        date_analyzed TEXT NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS jurisdictional_boundaries (
        id TEXT PRIMARY KEY,
        jurisdiction TEXT NOT NULL,
        boundary_type TEXT NOT NULL,
        description TEXT NOT NULL,
        legal_basis TEXT NOT NULL DEFAULT '[]',
        conflicts TEXT NOT NULL DEFAULT '[]',
        confidence_score REAL NOT NULL CHECK (confidence_score >= 0.0 AND confidence_score <= 1.0),
        date_analyzed TEXT NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS jus_cogens_recommendations (
        id TEXT PRIMARY KEY,
        principle TEXT NOT NULL,
        description TEXT NOT NULL,
        legal_basis TEXT NOT NULL DEFAULT '[]',
        supporting_documents TEXT NOT NULL DEFAULT '[]',
        opposition_arguments TEXT NOT NULL DEFAULT '[]',
        recommendation_strength REAL NOT NULL
            CHECK (recommendation_strength >= 0.0 AND recommendation_strength <= 1.0),
        implementation_guidance TEXT NOT NULL DEFAULT '',
        date_generated TEXT NOT NULL
    );",
    "CREATE INDEX IF NOT EXISTS idx_documents_jurisdiction ON space_law_documents(jurisdiction);",
    "CREATE INDEX IF NOT EXISTS idx_analyses_document ON legal_analyses(document_id, analysis_type, date_analyzed);",
    "CREATE INDEX IF NOT EXISTS idx_events_date ON space_events(date_occurred);",
];

/// Create tables and record the schema version
pub fn initialize(conn: &Connection) -> Result<(), PersistenceError> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;

    let version: i32 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    if version > SCHEMA_VERSION {
        return Err(PersistenceError::Unavailable(format!(
            "database schema version {} is newer than supported version {}",
            version, SCHEMA_VERSION
        )));
    }

    for statement in SCHEMA_STATEMENTS {
        conn.execute_batch(statement)?;
    }
    conn.execute_batch(&format!("PRAGMA user_version = {};", SCHEMA_VERSION))?;
    Ok(())
}
