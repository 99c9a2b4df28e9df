//! SQLite-backed record store for assignments and graded submissions.
//!
//! The store keeps rubric JSON exactly as handed to it; every write that goes
//! through [`save_rubric`] is already canonical. Concurrent writers race with
//! last-write-wins semantics.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::grading::{GradeOutcome, GradedHit};
use crate::rubric::{assess, normalize, Rubric, RubricStatus};

// =============================================================================
// Types
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("store lock poisoned")]
    Poisoned,
    #[error("task join error: {0}")]
    Join(String),
    #[error("serialization error: {0}")]
    Serde(String),
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentRecord {
    pub id: String,
    pub title: String,
    pub total_points: u64,
    pub rubric: Option<Value>,
    pub rubric_valid: bool,
    pub rubric_points: u64,
    pub updated_at: i64,
}

impl AssignmentRecord {
    pub fn new(id: impl Into<String>, title: impl Into<String>, total_points: u64) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            total_points,
            rubric: None,
            rubric_valid: false,
            rubric_points: 0,
            updated_at: 0,
        }
    }

    /// The stored rubric in canonical form, whatever shape it was saved in.
    pub fn canonical_rubric(&self) -> Rubric {
        normalize(self.rubric.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionRecord {
    pub id: String,
    pub assignment_id: String,
    pub total_score: Option<u64>,
    pub feedback: Vec<GradedHit>,
    pub graded_at: Option<i64>,
}

impl SubmissionRecord {
    pub fn new(id: impl Into<String>, assignment_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            assignment_id: assignment_id.into(),
            total_score: None,
            feedback: Vec::new(),
            graded_at: None,
        }
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn load_assignment(&self, id: &str) -> Result<Option<AssignmentRecord>, StoreError>;
    async fn save_assignment(&self, record: &AssignmentRecord) -> Result<(), StoreError>;
    async fn load_submission(&self, id: &str) -> Result<Option<SubmissionRecord>, StoreError>;
    async fn save_submission(&self, record: &SubmissionRecord) -> Result<(), StoreError>;
}

// =============================================================================
// SQLite implementation
// =============================================================================

#[derive(Clone)]
pub struct SqliteRecordStore {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&path)?;
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; \
             PRAGMA synchronous=NORMAL; \
             CREATE TABLE IF NOT EXISTS assignments ( \
               id TEXT PRIMARY KEY, \
               title TEXT NOT NULL, \
               total_points INTEGER NOT NULL, \
               rubric TEXT, \
               rubric_valid INTEGER NOT NULL DEFAULT 0, \
               rubric_points INTEGER NOT NULL DEFAULT 0, \
               updated_at INTEGER NOT NULL \
             ); \
             CREATE TABLE IF NOT EXISTS submissions ( \
               id TEXT PRIMARY KEY, \
               assignment_id TEXT NOT NULL, \
               total_score INTEGER, \
               feedback TEXT NOT NULL DEFAULT '[]', \
               graded_at INTEGER \
             ); \
             CREATE INDEX IF NOT EXISTS idx_submissions_assignment ON submissions(assignment_id);",
        )?;

        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// `RUBRIC_STORE_PATH`, or `.rubric_store.sqlite` in the working directory.
    pub fn default_path() -> PathBuf {
        if let Ok(path) = std::env::var("RUBRIC_STORE_PATH") {
            return PathBuf::from(path);
        }
        PathBuf::from(crate::config::DEFAULT_STORE_PATH)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn with_conn<F, R>(&self, f: F) -> Result<R, StoreError>
    where
        F: FnOnce(&Connection) -> Result<R, StoreError>,
    {
        let guard = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        f(&guard)
    }

    /// All submissions for an assignment, ordered by id.
    pub async fn submissions_for(&self, assignment_id: &str) -> Result<Vec<SubmissionRecord>, StoreError> {
        let assignment_id = assignment_id.to_string();
        let store = self.clone();
        tokio::task::spawn_blocking(move || {
            store.with_conn(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, assignment_id, total_score, feedback, graded_at \
                     FROM submissions WHERE assignment_id = ?1 ORDER BY id",
                )?;
                let mut rows = stmt.query(params![assignment_id])?;
                let mut out = Vec::new();
                while let Some(row) = rows.next()? {
                    out.push(submission_from_row(row)?);
                }
                Ok(out)
            })
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }
}

/// SQLite integers are signed; points beyond `i64::MAX` cannot be stored.
fn to_sql_points(field: &str, value: u64) -> Result<i64, StoreError> {
    i64::try_from(value).map_err(|_| StoreError::Serde(format!("{field} out of range: {value}")))
}

fn from_sql_points(field: &str, value: i64) -> Result<u64, StoreError> {
    u64::try_from(value).map_err(|_| StoreError::Serde(format!("{field} out of range: {value}")))
}

fn assignment_from_row(row: &Row<'_>) -> Result<AssignmentRecord, StoreError> {
    let rubric: Option<String> = row.get(3)?;
    let rubric = rubric
        .map(|text| serde_json::from_str(&text))
        .transpose()
        .map_err(|e| StoreError::Serde(e.to_string()))?;
    Ok(AssignmentRecord {
        id: row.get(0)?,
        title: row.get(1)?,
        total_points: from_sql_points("total_points", row.get(2)?)?,
        rubric,
        rubric_valid: row.get::<_, i64>(4)? != 0,
        rubric_points: from_sql_points("rubric_points", row.get(5)?)?,
        updated_at: row.get(6)?,
    })
}

fn submission_from_row(row: &Row<'_>) -> Result<SubmissionRecord, StoreError> {
    let feedback: String = row.get(3)?;
    let feedback = serde_json::from_str(&feedback).map_err(|e| StoreError::Serde(e.to_string()))?;
    Ok(SubmissionRecord {
        id: row.get(0)?,
        assignment_id: row.get(1)?,
        total_score: row
            .get::<_, Option<i64>>(2)?
            .map(|s| from_sql_points("total_score", s))
            .transpose()?,
        feedback,
        graded_at: row.get(4)?,
    })
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn load_assignment(&self, id: &str) -> Result<Option<AssignmentRecord>, StoreError> {
        let id = id.to_string();
        let store = self.clone();
        tokio::task::spawn_blocking(move || {
            store.with_conn(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, title, total_points, rubric, rubric_valid, rubric_points, updated_at \
                     FROM assignments WHERE id = ?1",
                )?;
                let mut rows = stmt.query(params![id])?;
                let record = match rows.next()? {
                    Some(row) => Some(assignment_from_row(row)?),
                    None => None,
                };
                Ok(record)
            })
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }

    async fn save_assignment(&self, record: &AssignmentRecord) -> Result<(), StoreError> {
        let record = record.clone();
        let rubric = record
            .rubric
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| StoreError::Serde(e.to_string()))?;
        let total_points = to_sql_points("total_points", record.total_points)?;
        let rubric_points = to_sql_points("rubric_points", record.rubric_points)?;
        let store = self.clone();
        tokio::task::spawn_blocking(move || {
            store.with_conn(|conn| {
                conn.execute(
                    "INSERT INTO assignments ( \
                        id, title, total_points, rubric, rubric_valid, rubric_points, updated_at \
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
                     ON CONFLICT(id) DO UPDATE SET \
                        title = excluded.title, \
                        total_points = excluded.total_points, \
                        rubric = excluded.rubric, \
                        rubric_valid = excluded.rubric_valid, \
                        rubric_points = excluded.rubric_points, \
                        updated_at = excluded.updated_at",
                    params![
                        record.id,
                        record.title,
                        total_points,
                        rubric,
                        record.rubric_valid as i64,
                        rubric_points,
                        now_epoch(),
                    ],
                )?;
                Ok(())
            })
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }

    async fn load_submission(&self, id: &str) -> Result<Option<SubmissionRecord>, StoreError> {
        let id = id.to_string();
        let store = self.clone();
        tokio::task::spawn_blocking(move || {
            store.with_conn(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, assignment_id, total_score, feedback, graded_at \
                     FROM submissions WHERE id = ?1",
                )?;
                let mut rows = stmt.query(params![id])?;
                let record = match rows.next()? {
                    Some(row) => Some(submission_from_row(row)?),
                    None => None,
                };
                Ok(record)
            })
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }

    async fn save_submission(&self, record: &SubmissionRecord) -> Result<(), StoreError> {
        let record = record.clone();
        let feedback =
            serde_json::to_string(&record.feedback).map_err(|e| StoreError::Serde(e.to_string()))?;
        let total_score = record
            .total_score
            .map(|s| to_sql_points("total_score", s))
            .transpose()?;
        let store = self.clone();
        tokio::task::spawn_blocking(move || {
            store.with_conn(|conn| {
                conn.execute(
                    "INSERT INTO submissions (id, assignment_id, total_score, feedback, graded_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5) \
                     ON CONFLICT(id) DO UPDATE SET \
                        assignment_id = excluded.assignment_id, \
                        total_score = excluded.total_score, \
                        feedback = excluded.feedback, \
                        graded_at = excluded.graded_at",
                    params![
                        record.id,
                        record.assignment_id,
                        total_score,
                        feedback,
                        record.graded_at,
                    ],
                )?;
                Ok(())
            })
        })
        .await
        .map_err(|e| StoreError::Join(e.to_string()))?
    }
}

// =============================================================================
// Record operations
// =============================================================================

/// Normalize, assess and persist a rubric on an existing assignment.
///
/// The stored rubric is always canonical and the stored validity pair always
/// matches it.
pub async fn save_rubric(
    store: &dyn RecordStore,
    assignment_id: &str,
    raw: Option<&Value>,
) -> Result<(Rubric, RubricStatus), StoreError> {
    let mut record = store
        .load_assignment(assignment_id)
        .await?
        .ok_or_else(|| StoreError::NotFound {
            kind: "assignment",
            id: assignment_id.to_string(),
        })?;

    let rubric = normalize(raw);
    let status = assess(&rubric, record.total_points);
    record.rubric =
        Some(serde_json::to_value(&rubric).map_err(|e| StoreError::Serde(e.to_string()))?);
    record.rubric_valid = status.rubric_valid;
    record.rubric_points = status.rubric_points;
    store.save_assignment(&record).await?;

    debug!(
        assignment = assignment_id,
        items = rubric.item_count(),
        fingerprint = %rubric.fingerprint(),
        rubric_points = status.rubric_points,
        rubric_valid = status.rubric_valid,
        "rubric saved"
    );
    Ok((rubric, status))
}

/// Persist a grading outcome as the submission's score and feedback.
pub async fn record_grade(
    store: &dyn RecordStore,
    submission_id: &str,
    outcome: &GradeOutcome,
) -> Result<SubmissionRecord, StoreError> {
    let mut record = store
        .load_submission(submission_id)
        .await?
        .ok_or_else(|| StoreError::NotFound {
            kind: "submission",
            id: submission_id.to_string(),
        })?;

    record.total_score = Some(outcome.total);
    record.feedback = outcome.hits.clone();
    record.graded_at = Some(now_epoch());
    store.save_submission(&record).await?;
    Ok(record)
}

fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn store_with_assignment(total: u64) -> (tempfile::TempDir, SqliteRecordStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteRecordStore::new(dir.path().join("records.sqlite")).unwrap();
        store
            .save_assignment(&AssignmentRecord::new("a1", "Midterm", total))
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn save_rubric_persists_canonical_form_and_status() {
        let (_dir, store) = store_with_assignment(5).await;
        let raw = json!({"sections": [{"title": "S", "criteria": [
            {"text": "a", "points": 2},
            {"text": "b", "points": 3}
        ]}]});

        let (rubric, status) = save_rubric(&store, "a1", Some(&raw)).await.unwrap();
        assert!(status.rubric_valid);
        assert_eq!(status.rubric_points, 5);

        let stored = store.load_assignment("a1").await.unwrap().unwrap();
        assert!(stored.rubric_valid);
        assert_eq!(stored.rubric_points, 5);
        assert_eq!(stored.canonical_rubric(), rubric);
        assert!(stored.rubric.unwrap()["sections"][0].get("criteria").is_none());
    }

    #[tokio::test]
    async fn save_rubric_requires_assignment() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteRecordStore::new(dir.path().join("records.sqlite")).unwrap();
        let err = save_rubric(&store, "missing", None).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { kind: "assignment", .. }));
    }

    #[tokio::test]
    async fn record_grade_overwrites_previous_outcome() {
        let (_dir, store) = store_with_assignment(5).await;
        store
            .save_submission(&SubmissionRecord::new("s1", "a1"))
            .await
            .unwrap();

        record_grade(&store, "s1", &GradeOutcome::full_credit(5))
            .await
            .unwrap();
        let outcome = GradeOutcome {
            total: 2,
            hits: vec![GradedHit {
                section: "S".into(),
                criterion: "a".into(),
                item_id: Some("item-0-0".into()),
                points: 2,
                comment: "ok".into(),
            }],
        };
        record_grade(&store, "s1", &outcome).await.unwrap();

        let stored = store.load_submission("s1").await.unwrap().unwrap();
        assert_eq!(stored.total_score, Some(2));
        assert_eq!(stored.feedback, outcome.hits);
        assert!(stored.graded_at.is_some());
        assert_eq!(store.submissions_for("a1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn points_beyond_sqlite_range_are_rejected_not_wrapped() {
        let (_dir, store) = store_with_assignment(5).await;
        store
            .save_submission(&SubmissionRecord::new("s1", "a1"))
            .await
            .unwrap();

        let max = i64::MAX as u64;
        record_grade(&store, "s1", &GradeOutcome::full_credit(max))
            .await
            .unwrap();
        let stored = store.load_submission("s1").await.unwrap().unwrap();
        assert_eq!(stored.total_score, Some(max));

        let err = record_grade(&store, "s1", &GradeOutcome::full_credit(u64::MAX))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Serde(_)));
        let stored = store.load_submission("s1").await.unwrap().unwrap();
        assert_eq!(stored.total_score, Some(max));

        let mut assignment = store.load_assignment("a1").await.unwrap().unwrap();
        assignment.rubric_points = u64::MAX;
        assert!(matches!(
            store.save_assignment(&assignment).await,
            Err(StoreError::Serde(_))
        ));
    }
}
