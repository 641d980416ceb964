//! Database migration system.
//!
//! Tracks applied migrations in a `_migrations` table and applies
//! pending ones in order.

use rusqlite::Connection;

use super::error::DatabaseError;

struct Migration {
    version: u32,
    description: &'static str,
    sql: &'static str,
}

/// All migrations in order. Each is applied at most once.
const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "create_ref_entities",
        sql: "CREATE TABLE ref_entities (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                category TEXT NOT NULL,
                canonical_name TEXT NOT NULL,
                requires_manifest INTEGER NOT NULL DEFAULT 0,
                UNIQUE (category, canonical_name)
            );",
    },
    Migration {
        version: 2,
        description: "create_tickets",
        sql: "CREATE TABLE tickets (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ticket_number TEXT NOT NULL,
                ticket_date TEXT NOT NULL,
                quantity REAL,
                quantity_unit TEXT,
                job_id INTEGER NOT NULL REFERENCES ref_entities(id),
                material_id INTEGER NOT NULL REFERENCES ref_entities(id),
                source_id INTEGER REFERENCES ref_entities(id),
                destination_id INTEGER REFERENCES ref_entities(id),
                vendor_id INTEGER REFERENCES ref_entities(id),
                ticket_type TEXT NOT NULL,
                manifest_number TEXT,
                truck_number TEXT,
                file_id TEXT NOT NULL,
                file_page INTEGER NOT NULL,
                file_hash TEXT NOT NULL,
                duplicate_of INTEGER REFERENCES tickets(id),
                review_required INTEGER NOT NULL DEFAULT 0,
                confidence REAL NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            );
            -- Two workers racing to insert the same ticket from duplicate
            -- pages: the loser hits this constraint and is redirected to
            -- the duplicate-handling path.
            CREATE UNIQUE INDEX idx_tickets_dedup
                ON tickets (ticket_number, vendor_id, ticket_date);
            CREATE INDEX idx_tickets_number_vendor
                ON tickets (ticket_number, vendor_id);
            CREATE INDEX idx_tickets_manifest
                ON tickets (vendor_id, ticket_date, manifest_number);",
    },
    Migration {
        version: 3,
        description: "create_review_queue",
        sql: "CREATE TABLE review_queue (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                file_id TEXT NOT NULL,
                file_page INTEGER NOT NULL,
                severity TEXT NOT NULL,
                problems TEXT NOT NULL,
                detected_fields TEXT NOT NULL,
                suggested_fix TEXT,
                ticket_json TEXT,
                resolved INTEGER NOT NULL DEFAULT 0,
                resolved_by TEXT,
                resolved_at TEXT,
                created_at TEXT NOT NULL
            );
            CREATE INDEX idx_review_unresolved ON review_queue (resolved, severity);",
    },
    Migration {
        version: 4,
        description: "create_processing_runs",
        sql: "CREATE TABLE processing_runs (
                request_guid TEXT PRIMARY KEY,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                files_count INTEGER NOT NULL DEFAULT 0,
                pages_count INTEGER NOT NULL DEFAULT 0,
                ok_count INTEGER NOT NULL DEFAULT 0,
                error_count INTEGER NOT NULL DEFAULT 0,
                review_count INTEGER NOT NULL DEFAULT 0,
                skipped_count INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL
            );",
    },
    Migration {
        version: 5,
        description: "create_processed_files",
        sql: "CREATE TABLE processed_files (
                file_hash TEXT PRIMARY KEY,
                file_id TEXT NOT NULL,
                ticket_ids TEXT NOT NULL,
                processed_at TEXT NOT NULL
            );",
    },
];

/// Runs all pending migrations on the given connection.
pub fn run_all(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            description TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )?;

    let current_version: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM _migrations",
        [],
        |r| r.get(0),
    )?;

    for migration in MIGRATIONS {
        if migration.version <= current_version {
            continue;
        }

        log::info!(
            "Running migration v{}: {}",
            migration.version,
            migration.description
        );

        conn.execute_batch(migration.sql)
            .map_err(|e| DatabaseError::Migration {
                version: migration.version,
                reason: e.to_string(),
            })?;

        conn.execute(
            "INSERT INTO _migrations (version, description) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.description],
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_all_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        run_all(&conn).unwrap();
        run_all(&conn).unwrap();

        let applied: u32 = conn
            .query_row("SELECT MAX(version) FROM _migrations", [], |r| r.get(0))
            .unwrap();
        assert_eq!(applied as usize, MIGRATIONS.len());
    }

    #[test]
    fn test_dedup_index_rejects_same_key() {
        let conn = Connection::open_in_memory().unwrap();
        run_all(&conn).unwrap();

        conn.execute(
            "INSERT INTO ref_entities (category, canonical_name) VALUES ('job', 'J1'),
             ('material', 'M1'), ('vendor', 'V1')",
            [],
        )
        .unwrap();

        let insert = "INSERT INTO tickets (ticket_number, ticket_date, job_id, material_id,
             vendor_id, ticket_type, file_id, file_page, file_hash, created_at)
             VALUES ('111', '2024-10-17', 1, 2, 3, 'IMPORT', 'a.json', 1, 'h', 'now')";
        conn.execute(insert, []).unwrap();
        let err = conn.execute(insert, []).unwrap_err();
        assert!(err.to_string().contains("UNIQUE"));
    }
}
