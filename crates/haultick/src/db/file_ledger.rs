//! Ledger of files already processed, keyed by content hash. A hash hit
//! short-circuits a batch job without touching the OCR engine.

use chrono::Utc;
use rusqlite::{params, OptionalExtension};

use super::{Database, DatabaseError};

/// What a previous run produced for this file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub file_id: String,
    pub ticket_ids: Vec<i64>,
}

pub fn find_by_hash(db: &Database, file_hash: &str) -> Result<Option<LedgerEntry>, DatabaseError> {
    db.with_conn(|conn| {
        let row: Option<(String, String)> = conn
            .query_row(
                "SELECT file_id, ticket_ids FROM processed_files WHERE file_hash = ?1",
                params![file_hash],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((file_id, ids_json)) => {
                let ticket_ids: Vec<i64> = serde_json::from_str(&ids_json)
                    .map_err(|e| DatabaseError::CorruptJson {
                        column: "ticket_ids",
                        source: e,
                    })?;
                Ok(Some(LedgerEntry { file_id, ticket_ids }))
            }
        }
    })
}

/// Records a completed file. Re-recording the same hash replaces the
/// entry, so a reprocessed file points at its newest tickets.
pub fn record(
    db: &Database,
    file_hash: &str,
    file_id: &str,
    ticket_ids: &[i64],
) -> Result<(), DatabaseError> {
    let ids_json = serde_json::to_string(ticket_ids).map_err(|e| DatabaseError::CorruptJson {
        column: "ticket_ids",
        source: e,
    })?;

    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO processed_files (file_hash, file_id, ticket_ids, processed_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(file_hash) DO UPDATE SET
                 file_id = excluded.file_id,
                 ticket_ids = excluded.ticket_ids,
                 processed_at = excluded.processed_at",
            params![file_hash, file_id, ids_json, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    })
}
