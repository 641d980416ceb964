//! Processing-run ledger repository. Rows are created when a batch
//! starts, counters appended per file, and sealed exactly once.

use rusqlite::{params, Row};

use crate::model::{ProcessingRun, RunStatus};

use super::{Database, DatabaseError};

pub fn create(db: &Database, run: &ProcessingRun) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO processing_runs (request_guid, started_at, completed_at,
             files_count, pages_count, ok_count, error_count, review_count,
             skipped_count, status)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                run.request_guid,
                run.started_at.to_rfc3339(),
                run.completed_at.map(|t| t.to_rfc3339()),
                run.files_count,
                run.pages_count,
                run.ok_count,
                run.error_count,
                run.review_count,
                run.skipped_count,
                run.status.as_str(),
            ],
        )?;
        Ok(())
    })
}

/// Appends one file's contribution to the run counters.
pub fn bump(
    db: &Database,
    request_guid: &str,
    pages: u32,
    ok: u32,
    errors: u32,
    review: u32,
    skipped: u32,
) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE processing_runs SET
                 pages_count = pages_count + ?2,
                 ok_count = ok_count + ?3,
                 error_count = error_count + ?4,
                 review_count = review_count + ?5,
                 skipped_count = skipped_count + ?6
             WHERE request_guid = ?1",
            params![request_guid, pages, ok, errors, review, skipped],
        )?;
        Ok(())
    })
}

/// Seals the run: sets final status and completion time.
pub fn seal(db: &Database, run: &ProcessingRun) -> Result<(), DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "UPDATE processing_runs SET completed_at = ?2, status = ?3
             WHERE request_guid = ?1",
            params![
                run.request_guid,
                run.completed_at.map(|t| t.to_rfc3339()),
                run.status.as_str(),
            ],
        )?;
        Ok(())
    })
}

fn from_row(row: &Row<'_>) -> Result<ProcessingRun, rusqlite::Error> {
    let started: String = row.get("started_at")?;
    let completed: Option<String> = row.get("completed_at")?;
    let status: String = row.get("status")?;

    let started_at = started.parse().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })?;

    Ok(ProcessingRun {
        request_guid: row.get("request_guid")?,
        started_at,
        completed_at: completed.and_then(|t| t.parse().ok()),
        files_count: row.get("files_count")?,
        pages_count: row.get("pages_count")?,
        ok_count: row.get("ok_count")?,
        error_count: row.get("error_count")?,
        review_count: row.get("review_count")?,
        skipped_count: row.get("skipped_count")?,
        status: RunStatus::from_str(&status).unwrap_or(RunStatus::Failed),
    })
}

pub fn find(db: &Database, request_guid: &str) -> Result<Option<ProcessingRun>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM processing_runs WHERE request_guid = ?1")?;
        let mut rows = stmt.query_map(params![request_guid], from_row)?;
        match rows.next() {
            Some(Ok(r)) => Ok(Some(r)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}
