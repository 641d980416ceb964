//! Ticket repository — the system of record for committed tickets.

use std::path::PathBuf;

use chrono::NaiveDate;
use rusqlite::{params, Row};

use crate::model::{QuantityUnit, TicketType, TruckTicket};

use super::{Database, DatabaseError};

/// Result of attempting to commit a ticket.
#[derive(Debug)]
pub enum InsertOutcome {
    Inserted(i64),
    /// Another worker committed the same (ticket_number, vendor_id,
    /// ticket_date) first; the caller re-runs the duplicate path.
    DuplicateRace,
}

fn from_row(row: &Row<'_>) -> Result<TruckTicket, rusqlite::Error> {
    let date_str: String = row.get("ticket_date")?;
    let created_str: String = row.get("created_at")?;
    let unit_str: Option<String> = row.get("quantity_unit")?;
    let type_str: String = row.get("ticket_type")?;
    let file_id: String = row.get("file_id")?;

    Ok(TruckTicket {
        id: Some(row.get("id")?),
        ticket_number: row.get("ticket_number")?,
        ticket_date: date_str.parse().unwrap_or_default(),
        quantity: row.get("quantity")?,
        quantity_unit: unit_str.as_deref().and_then(QuantityUnit::from_str),
        job_id: row.get("job_id")?,
        material_id: row.get("material_id")?,
        source_id: row.get("source_id")?,
        destination_id: row.get("destination_id")?,
        vendor_id: row.get("vendor_id")?,
        ticket_type: TicketType::from_str(&type_str).unwrap_or(TicketType::Import),
        manifest_number: row.get("manifest_number")?,
        truck_number: row.get("truck_number")?,
        file_id: PathBuf::from(file_id),
        file_page: row.get("file_page")?,
        file_hash: row.get("file_hash")?,
        duplicate_of: row.get("duplicate_of")?,
        review_required: row.get("review_required")?,
        confidence: row.get("confidence")?,
        created_at: created_str.parse().unwrap_or_default(),
    })
}

/// Commits a ticket. A UNIQUE violation on the dedup index is not an
/// error here — it is reported as [`InsertOutcome::DuplicateRace`].
pub fn insert(db: &Database, ticket: &TruckTicket) -> Result<InsertOutcome, DatabaseError> {
    let result = db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO tickets (ticket_number, ticket_date, quantity, quantity_unit,
             job_id, material_id, source_id, destination_id, vendor_id, ticket_type,
             manifest_number, truck_number, file_id, file_page, file_hash,
             duplicate_of, review_required, confidence, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
             ?16, ?17, ?18, ?19)",
            params![
                ticket.ticket_number,
                ticket.ticket_date.to_string(),
                ticket.quantity,
                ticket.quantity_unit.map(|u| u.as_str()),
                ticket.job_id,
                ticket.material_id,
                ticket.source_id,
                ticket.destination_id,
                ticket.vendor_id,
                ticket.ticket_type.as_str(),
                ticket.manifest_number,
                ticket.truck_number,
                ticket.file_id.to_string_lossy(),
                ticket.file_page,
                ticket.file_hash,
                ticket.duplicate_of,
                ticket.review_required,
                ticket.confidence,
                ticket.created_at.to_rfc3339(),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    });

    match result {
        Ok(id) => Ok(InsertOutcome::Inserted(id)),
        Err(e) if e.is_unique_violation() => Ok(InsertOutcome::DuplicateRace),
        Err(e) => Err(e),
    }
}

pub fn find_by_id(db: &Database, id: i64) -> Result<Option<TruckTicket>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM tickets WHERE id = ?1")?;
        let mut rows = stmt.query_map(params![id], from_row)?;
        match rows.next() {
            Some(Ok(t)) => Ok(Some(t)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// The windowed duplicate lookup: the earliest committed ticket with the
/// same (ticket_number, vendor_id) dated within `window_days` before the
/// candidate date, inclusive of the same day. Look-back only — tickets
/// dated after the candidate are never prior duplicates.
pub fn find_prior_in_window(
    db: &Database,
    ticket_number: &str,
    vendor_id: i64,
    candidate_date: NaiveDate,
    window_days: i64,
) -> Result<Option<TruckTicket>, DatabaseError> {
    let window_start = candidate_date - chrono::Duration::days(window_days);
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT * FROM tickets
             WHERE ticket_number = ?1 AND vendor_id = ?2
               AND ticket_date >= ?3 AND ticket_date <= ?4
             ORDER BY ticket_date ASC, id ASC
             LIMIT 1",
        )?;
        let mut rows = stmt.query_map(
            params![
                ticket_number,
                vendor_id,
                window_start.to_string(),
                candidate_date.to_string()
            ],
            from_row,
        )?;
        match rows.next() {
            Some(Ok(t)) => Ok(Some(t)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Non-blocking manifest-reuse check: has this manifest number already
/// been used by the same vendor on the same date?
pub fn manifest_reused(
    db: &Database,
    vendor_id: i64,
    ticket_date: NaiveDate,
    manifest_number: &str,
) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM tickets
             WHERE vendor_id = ?1 AND ticket_date = ?2 AND manifest_number = ?3",
            params![vendor_id, ticket_date.to_string(), manifest_number],
            |r| r.get(0),
        )?;
        Ok(count > 0)
    })
}

/// Rolls back partially-committed tickets for a failed file. Runs in a
/// single transaction so a file rollback is all-or-nothing.
pub fn delete_many(db: &Database, ids: &[i64]) -> Result<usize, DatabaseError> {
    if ids.is_empty() {
        return Ok(0);
    }
    db.with_conn(|conn| {
        // Dropping the transaction on an early `?` return rolls it back,
        // so a failed delete cannot leave the shared connection stuck
        // inside an open transaction.
        let tx = conn.unchecked_transaction()?;
        let mut deleted = 0;
        for id in ids {
            deleted += tx.execute("DELETE FROM tickets WHERE id = ?1", params![id])?;
        }
        tx.commit()?;
        Ok(deleted)
    })
}
