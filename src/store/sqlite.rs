//! SQLite store.
//!
//! One connection behind a mutex; every call runs on the tokio blocking pool
//! so a slow disk never stalls the runtime's worker threads.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row, ToSql};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use super::{schema, DocumentFilter, Page, PersistenceError, Store};
use crate::domain::{
    AnalysisType, Document, DocumentUpdate, JurisdictionalBoundary, JusCogensRecommendation,
    LegalAnalysis, SpaceEvent, UnknownVariant,
};

const DOCUMENT_COLUMNS: &str = "id, title, content, source_url, law_type, jurisdiction, \
     date_published, date_collected, keywords, summary, status, metadata";

const EVENT_COLUMNS: &str = "id, title, description, event_type, date_occurred, participants, \
     location, legal_implications, metadata";

const ANALYSIS_COLUMNS: &str = "id, document_id, analysis_type, results, confidence_score, \
     methodology, analyst_notes, date_analyzed";

const BOUNDARY_COLUMNS: &str = "id, jurisdiction, boundary_type, description, legal_basis, \
     conflicts, confidence_score, date_analyzed";

const RECOMMENDATION_COLUMNS: &str = "id, principle, description, legal_basis, \
     supporting_documents, opposition_arguments, recommendation_strength, \
     implementation_guidance, date_generated";

/// SQLite-backed [`Store`]
#[derive(Clone)]
pub struct SqliteStore {
    path: Option<PathBuf>,
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStore").field("path", &self.path).finish()
    }
}

impl SqliteStore {
    /// Open (creating if needed) a database file and apply the schema
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    PersistenceError::Unavailable(format!("{}: {}", parent.display(), e))
                })?;
            }
        }

        let conn = Connection::open(&path)?;
        schema::initialize(&conn)?;
        debug!(path = %path.display(), "Opened SQLite store");

        Ok(Self {
            path: Some(path),
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// In-memory database, mostly for tests
    pub fn open_in_memory() -> Result<Self, PersistenceError> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self {
            path: None,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T, PersistenceError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, PersistenceError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = conn
                .lock()
                .map_err(|_| PersistenceError::Unavailable("connection lock poisoned".to_string()))?;
            f(&guard)
        })
        .await
        .map_err(|e| PersistenceError::Unavailable(format!("blocking task failed: {}", e)))?
    }
}

fn timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String, PersistenceError> {
    Ok(serde_json::to_string(value)?)
}

fn sql_limit(page: Page) -> (i64, i64) {
    (
        i64::try_from(page.limit).unwrap_or(-1),
        i64::try_from(page.offset).unwrap_or(i64::MAX),
    )
}

/// Constraint failures become conflicts naming the record
fn write_error(error: rusqlite::Error, what: String) -> PersistenceError {
    match &error {
        rusqlite::Error::SqliteFailure(failure, _) if failure.code == ErrorCode::ConstraintViolation => {
            PersistenceError::Conflict(format!("{}: {}", what, error))
        }
        _ => PersistenceError::Sqlite(error),
    }
}

/// Undecodable columns become corrupt-record errors
fn read_error(error: rusqlite::Error) -> PersistenceError {
    match error {
        rusqlite::Error::FromSqlConversionFailure(index, _, source) => {
            PersistenceError::Corrupt(format!("column {}: {}", index, source))
        }
        other => PersistenceError::Sqlite(other),
    }
}

fn conversion_error(
    index: usize,
    source: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(source))
}

fn column_json<T: DeserializeOwned>(row: &Row<'_>, index: usize) -> rusqlite::Result<T> {
    let text: String = row.get(index)?;
    serde_json::from_str(&text).map_err(|e| conversion_error(index, e))
}

fn column_enum<T: FromStr<Err = UnknownVariant>>(row: &Row<'_>, index: usize) -> rusqlite::Result<T> {
    let text: String = row.get(index)?;
    text.parse().map_err(|e| conversion_error(index, e))
}

fn column_timestamp(row: &Row<'_>, index: usize) -> rusqlite::Result<DateTime<Utc>> {
    let text: String = row.get(index)?;
    DateTime::parse_from_rfc3339(&text)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(index, e))
}

fn column_opt_timestamp(row: &Row<'_>, index: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    match row.get::<_, Option<String>>(index)? {
        None => Ok(None),
        Some(_) => column_timestamp(row, index).map(Some),
    }
}

fn decode_document(row: &Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        id: row.get(0)?,
        title: row.get(1)?,
        content: row.get(2)?,
        source_url: row.get(3)?,
        law_type: column_enum(row, 4)?,
        jurisdiction: column_enum(row, 5)?,
        date_published: column_opt_timestamp(row, 6)?,
        date_collected: column_timestamp(row, 7)?,
        keywords: column_json(row, 8)?,
        summary: row.get(9)?,
        status: column_enum(row, 10)?,
        metadata: column_json(row, 11)?,
    })
}

fn decode_event(row: &Row<'_>) -> rusqlite::Result<SpaceEvent> {
    Ok(SpaceEvent {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        event_type: row.get(3)?,
        date_occurred: column_timestamp(row, 4)?,
        participants: column_json(row, 5)?,
        location: row.get(6)?,
        legal_implications: row.get(7)?,
        metadata: column_json(row, 8)?,
    })
}

fn decode_analysis(row: &Row<'_>) -> rusqlite::Result<LegalAnalysis> {
    Ok(LegalAnalysis {
        id: row.get(0)?,
        document_id: row.get(1)?,
        analysis_type: column_enum(row, 2)?,
        results: column_json(row, 3)?,
        confidence_score: row.get(4)?,
        methodology: row.get(5)?,
        analyst_notes: row.get(6)?,
        date_analyzed: column_timestamp(row, 7)?,
    })
}

fn decode_boundary(row: &Row<'_>) -> rusqlite::Result<JurisdictionalBoundary> {
    Ok(JurisdictionalBoundary {
        id: row.get(0)?,
        jurisdiction: column_enum(row, 1)?,
        boundary_type: column_enum(row, 2)?,
        description: row.get(3)?,
        legal_basis: column_json(row, 4)?,
        conflicts: column_json(row, 5)?,
        confidence_score: row.get(6)?,
        date_analyzed: column_timestamp(row, 7)?,
    })
}

fn decode_recommendation(row: &Row<'_>) -> rusqlite::Result<JusCogensRecommendation> {
    Ok(JusCogensRecommendation {
        id: row.get(0)?,
        principle: row.get(1)?,
        description: row.get(2)?,
        legal_basis: column_json(row, 3)?,
        supporting_documents: column_json(row, 4)?,
        opposition_arguments: column_json(row, 5)?,
        recommendation_strength: row.get(6)?,
        implementation_guidance: row.get(7)?,
        date_generated: column_timestamp(row, 8)?,
    })
}

type Decoder<T> = fn(&Row<'_>) -> rusqlite::Result<T>;

fn query_all<T>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
    decode: Decoder<T>,
) -> Result<Vec<T>, PersistenceError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, decode)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(read_error)?;
    Ok(rows)
}

fn query_one<T>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
    decode: Decoder<T>,
) -> Result<Option<T>, PersistenceError> {
    conn.query_row(sql, params, decode).optional().map_err(read_error)
}

#[async_trait]
impl Store for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn insert_document(&self, document: &Document) -> Result<(), PersistenceError> {
        let d = document.clone();
        self.with_conn(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO space_law_documents ({}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                    DOCUMENT_COLUMNS
                ),
                params![
                    d.id,
                    d.title,
                    d.content,
                    d.source_url,
                    d.law_type.as_str(),
                    d.jurisdiction.as_str(),
                    d.date_published.as_ref().map(timestamp),
                    timestamp(&d.date_collected),
                    to_json(&d.keywords)?,
                    d.summary,
                    d.status.as_str(),
                    to_json(&d.metadata)?,
                ],
            )
            .map_err(|e| write_error(e, format!("document {}", d.id)))?;
            Ok(())
        })
        .await
    }

    async fn get_document(&self, id: &str) -> Result<Option<Document>, PersistenceError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            query_one(
                conn,
                &format!("SELECT {} FROM space_law_documents WHERE id = ?1", DOCUMENT_COLUMNS),
                &[&id],
                decode_document,
            )
        })
        .await
    }

    async fn update_document(&self, update: &DocumentUpdate) -> Result<bool, PersistenceError> {
        let u = update.clone();
        self.with_conn(move |conn| {
            let changed = conn.execute(
                "UPDATE space_law_documents SET status = ?2, \
                 law_type = COALESCE(?3, law_type), summary = COALESCE(?4, summary) \
                 WHERE id = ?1",
                params![
                    u.document_id,
                    u.status.as_str(),
                    u.law_type.map(|l| l.as_str()),
                    u.summary,
                ],
            )?;
            Ok(changed > 0)
        })
        .await
    }

    async fn list_documents(
        &self,
        filter: &DocumentFilter,
        page: Page,
    ) -> Result<Vec<Document>, PersistenceError> {
        let filter = filter.clone();
        self.with_conn(move |conn| {
            let (limit, offset) = sql_limit(page);
            let jurisdiction = filter.jurisdiction.map(|j| j.as_str());
            let law_type = filter.law_type.map(|l| l.as_str());
            let status = filter.status.map(|s| s.as_str());
            query_all(
                conn,
                &format!(
                    "SELECT {} FROM space_law_documents \
                     WHERE (?1 IS NULL OR jurisdiction = ?1) \
                       AND (?2 IS NULL OR law_type = ?2) \
                       AND (?3 IS NULL OR status = ?3) \
                     ORDER BY id LIMIT ?4 OFFSET ?5",
                    DOCUMENT_COLUMNS
                ),
                &[&jurisdiction, &law_type, &status, &limit, &offset],
                decode_document,
            )
        })
        .await
    }

    async fn delete_document(&self, id: &str) -> Result<bool, PersistenceError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            let deleted = conn.execute("DELETE FROM space_law_documents WHERE id = ?1", params![id])?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn insert_event(&self, event: &SpaceEvent) -> Result<(), PersistenceError> {
        let e = event.clone();
        self.with_conn(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO space_events ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    EVENT_COLUMNS
                ),
                params![
                    e.id,
                    e.title,
                    e.description,
                    e.event_type,
                    timestamp(&e.date_occurred),
                    to_json(&e.participants)?,
                    e.location,
                    e.legal_implications,
                    to_json(&e.metadata)?,
                ],
            )
            .map_err(|err| write_error(err, format!("event {}", e.id)))?;
            Ok(())
        })
        .await
    }

    async fn list_events(&self, page: Page) -> Result<Vec<SpaceEvent>, PersistenceError> {
        self.with_conn(move |conn| {
            let (limit, offset) = sql_limit(page);
            query_all(
                conn,
                &format!(
                    "SELECT {} FROM space_events ORDER BY date_occurred, id LIMIT ?1 OFFSET ?2",
                    EVENT_COLUMNS
                ),
                &[&limit, &offset],
                decode_event,
            )
        })
        .await
    }

    async fn insert_analysis(&self, analysis: &LegalAnalysis) -> Result<(), PersistenceError> {
        let a = analysis.clone();
        self.with_conn(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO legal_analyses ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    ANALYSIS_COLUMNS
                ),
                params![
                    a.id,
                    a.document_id,
                    a.analysis_type.as_str(),
                    to_json(&a.results)?,
                    a.confidence_score,
                    a.methodology,
                    a.analyst_notes,
                    timestamp(&a.date_analyzed),
                ],
            )
            .map_err(|e| write_error(e, format!("analysis {} for document {}", a.id, a.document_id)))?;
            Ok(())
        })
        .await
    }

    async fn get_analysis(&self, id: &str) -> Result<Option<LegalAnalysis>, PersistenceError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            query_one(
                conn,
                &format!("SELECT {} FROM legal_analyses WHERE id = ?1", ANALYSIS_COLUMNS),
                &[&id],
                decode_analysis,
            )
        })
        .await
    }

    async fn list_analyses(
        &self,
        document_id: Option<&str>,
        page: Page,
    ) -> Result<Vec<LegalAnalysis>, PersistenceError> {
        let document_id = document_id.map(str::to_string);
        self.with_conn(move |conn| {
            let (limit, offset) = sql_limit(page);
            query_all(
                conn,
                &format!(
                    "SELECT {} FROM legal_analyses WHERE (?1 IS NULL OR document_id = ?1) \
                     ORDER BY rowid LIMIT ?2 OFFSET ?3",
                    ANALYSIS_COLUMNS
                ),
                &[&document_id, &limit, &offset],
                decode_analysis,
            )
        })
        .await
    }

    async fn latest_analysis(
        &self,
        document_id: &str,
        analysis_type: AnalysisType,
        methodology: Option<&str>,
    ) -> Result<Option<LegalAnalysis>, PersistenceError> {
        let document_id = document_id.to_string();
        let methodology = methodology.map(str::to_string);
        self.with_conn(move |conn| {
            query_one(
                conn,
                &format!(
                    "SELECT {} FROM legal_analyses \
                     WHERE document_id = ?1 AND analysis_type = ?2 \
                       AND (?3 IS NULL OR methodology = ?3) \
                     ORDER BY date_analyzed DESC, rowid DESC LIMIT 1",
                    ANALYSIS_COLUMNS
                ),
                &[&document_id, &analysis_type.as_str(), &methodology],
                decode_analysis,
            )
        })
        .await
    }

    async fn insert_boundary(&self, boundary: &JurisdictionalBoundary) -> Result<(), PersistenceError> {
        let b = boundary.clone();
        self.with_conn(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO jurisdictional_boundaries ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    BOUNDARY_COLUMNS
                ),
                params![
                    b.id,
                    b.jurisdiction.as_str(),
                    b.boundary_type.as_str(),
                    b.description,
                    to_json(&b.legal_basis)?,
                    to_json(&b.conflicts)?,
                    b.confidence_score,
                    timestamp(&b.date_analyzed),
                ],
            )
            .map_err(|e| write_error(e, format!("boundary {}", b.id)))?;
            Ok(())
        })
        .await
    }

    async fn get_boundary(&self, id: &str) -> Result<Option<JurisdictionalBoundary>, PersistenceError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            query_one(
                conn,
                &format!("SELECT {} FROM jurisdictional_boundaries WHERE id = ?1", BOUNDARY_COLUMNS),
                &[&id],
                decode_boundary,
            )
        })
        .await
    }

    async fn list_boundaries(&self, page: Page) -> Result<Vec<JurisdictionalBoundary>, PersistenceError> {
        self.with_conn(move |conn| {
            let (limit, offset) = sql_limit(page);
            query_all(
                conn,
                &format!(
                    "SELECT {} FROM jurisdictional_boundaries ORDER BY rowid LIMIT ?1 OFFSET ?2",
                    BOUNDARY_COLUMNS
                ),
                &[&limit, &offset],
                decode_boundary,
            )
        })
        .await
    }

    async fn insert_recommendation(
        &self,
        recommendation: &JusCogensRecommendation,
    ) -> Result<(), PersistenceError> {
        let r = recommendation.clone();
        self.with_conn(move |conn| {
            conn.execute(
                &format!(
                    "INSERT INTO jus_cogens_recommendations ({}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    RECOMMENDATION_COLUMNS
                ),
                params![
                    r.id,
                    r.principle,
                    r.description,
                    to_json(&r.legal_basis)?,
                    to_json(&r.supporting_documents)?,
                    to_json(&r.opposition_arguments)?,
                    r.recommendation_strength,
                    r.implementation_guidance,
                    timestamp(&r.date_generated),
                ],
            )
            .map_err(|e| write_error(e, format!("recommendation {}", r.id)))?;
            Ok(())
        })
        .await
    }

    async fn get_recommendation(
        &self,
        id: &str,
    ) -> Result<Option<JusCogensRecommendation>, PersistenceError> {
        let id = id.to_string();
        self.with_conn(move |conn| {
            query_one(
                conn,
                &format!(
                    "SELECT {} FROM jus_cogens_recommendations WHERE id = ?1",
                    RECOMMENDATION_COLUMNS
                ),
                &[&id],
                decode_recommendation,
            )
        })
        .await
    }

    async fn list_recommendations(
        &self,
        page: Page,
    ) -> Result<Vec<JusCogensRecommendation>, PersistenceError> {
        self.with_conn(move |conn| {
            let (limit, offset) = sql_limit(page);
            query_all(
                conn,
                &format!(
                    "SELECT {} FROM jus_cogens_recommendations ORDER BY rowid LIMIT ?1 OFFSET ?2",
                    RECOMMENDATION_COLUMNS
                ),
                &[&limit, &offset],
                decode_recommendation,
            )
        })
        .await
    }
}
