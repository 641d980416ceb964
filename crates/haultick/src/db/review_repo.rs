//! Review-queue repository. Problems and detected fields are stored as
//! JSON columns; the provisional ticket rides along as an attachment.

use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::Utc;
use rusqlite::{params, Row};

use crate::model::{PageRef, Problem, ReviewQueueEntry, Severity, TruckTicket};

use super::{Database, DatabaseError};

pub fn insert(db: &Database, entry: &ReviewQueueEntry) -> Result<i64, DatabaseError> {
    let problems = serde_json::to_string(&entry.problems).map_err(|e| {
        DatabaseError::CorruptJson {
            column: "problems",
            source: e,
        }
    })?;
    let detected = serde_json::to_string(&entry.detected_fields).map_err(|e| {
        DatabaseError::CorruptJson {
            column: "detected_fields",
            source: e,
        }
    })?;
    let ticket_json = entry
        .ticket
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| DatabaseError::CorruptJson {
            column: "ticket_json",
            source: e,
        })?;

    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO review_queue (file_id, file_page, severity, problems,
             detected_fields, suggested_fix, ticket_json, resolved, resolved_by,
             resolved_at, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                entry.page.file_id.to_string_lossy(),
                entry.page.page_number,
                entry.severity.as_str(),
                problems,
                detected,
                entry.suggested_fix,
                ticket_json,
                entry.resolved,
                entry.resolved_by,
                entry.resolved_at.map(|t| t.to_rfc3339()),
                entry.created_at.to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

fn from_row(row: &Row<'_>) -> Result<ReviewQueueEntry, rusqlite::Error> {
    let severity: String = row.get("severity")?;
    let problems: String = row.get("problems")?;
    let detected: String = row.get("detected_fields")?;
    let ticket_json: Option<String> = row.get("ticket_json")?;
    let file_id: String = row.get("file_id")?;
    let resolved_at: Option<String> = row.get("resolved_at")?;
    let created_at: String = row.get("created_at")?;

    Ok(ReviewQueueEntry {
        id: Some(row.get("id")?),
        page: PageRef {
            file_id: PathBuf::from(file_id),
            page_number: row.get("file_page")?,
        },
        problems: serde_json::from_str::<Vec<Problem>>(&problems).unwrap_or_default(),
        severity: Severity::from_str(&severity).unwrap_or(Severity::Critical),
        detected_fields: serde_json::from_str::<BTreeMap<String, String>>(&detected)
            .unwrap_or_default(),
        suggested_fix: row.get("suggested_fix")?,
        ticket: ticket_json.and_then(|j| serde_json::from_str::<TruckTicket>(&j).ok()),
        resolved: row.get("resolved")?,
        resolved_by: row.get("resolved_by")?,
        resolved_at: resolved_at.and_then(|t| t.parse().ok()),
        created_at: created_at.parse().unwrap_or_default(),
    })
}

pub fn find_by_id(db: &Database, id: i64) -> Result<Option<ReviewQueueEntry>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM review_queue WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], from_row)?;
        match rows.next() {
            Some(Ok(e)) => Ok(Some(e)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Unresolved entries, worst severity first, oldest first within a tier.
pub fn list_unresolved(db: &Database) -> Result<Vec<ReviewQueueEntry>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM review_queue WHERE resolved = 0
             ORDER BY CASE severity
                 WHEN 'CRITICAL' THEN 0
                 WHEN 'WARNING' THEN 1
                 ELSE 2 END,
             created_at ASC",
        )?;
        let rows = stmt.query_map([], from_row)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    })
}

/// Marks an entry resolved by an operator. Terminal state.
pub fn resolve(db: &Database, id: i64, resolved_by: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let changed = conn.execute(
            "UPDATE review_queue SET resolved = 1, resolved_by = ?2, resolved_at = ?3
             WHERE id = ?1 AND resolved = 0",
            params![id, resolved_by, Utc::now().to_rfc3339()],
        )?;
        Ok(changed > 0)
    })
}
