//! Reference-data repository. Seeded at setup time, read-mostly after.

use rusqlite::params;

use crate::model::{RefCategory, ReferenceEntity};

use super::{Database, DatabaseError};

/// Inserts a reference entity, returning its id. Canonical names are
/// unique within a category.
pub fn insert(
    db: &Database,
    category: RefCategory,
    canonical_name: &str,
    requires_manifest: bool,
) -> Result<i64, DatabaseError> {
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO ref_entities (category, canonical_name, requires_manifest)
             VALUES (?1, ?2, ?3)",
            params![category.as_str(), canonical_name, requires_manifest],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Looks up a single entity by category + canonical name.
pub fn find(
    db: &Database,
    category: RefCategory,
    canonical_name: &str,
) -> Result<Option<ReferenceEntity>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, category, canonical_name, requires_manifest
             FROM ref_entities WHERE category = ?1 AND canonical_name = ?2",
        )?;
        let mut rows = stmt.query_map(params![category.as_str(), canonical_name], |row| {
            let cat: String = row.get("category")?;
            Ok(ReferenceEntity {
                id: row.get("id")?,
                category: RefCategory::from_str(&cat).unwrap_or(category),
                canonical_name: row.get("canonical_name")?,
                requires_manifest: row.get("requires_manifest")?,
            })
        })?;
        match rows.next() {
            Some(Ok(e)) => Ok(Some(e)),
            Some(Err(e)) => Err(DatabaseError::Sqlite(e)),
            None => Ok(None),
        }
    })
}

/// Loads the entire reference table, for eager cache preloading.
pub fn list_all(db: &Database) -> Result<Vec<ReferenceEntity>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, category, canonical_name, requires_manifest FROM ref_entities",
        )?;
        let rows = stmt.query_map([], |row| {
            let cat: String = row.get("category")?;
            Ok((
                row.get::<_, i64>("id")?,
                cat,
                row.get::<_, String>("canonical_name")?,
                row.get::<_, bool>("requires_manifest")?,
            ))
        })?;

        let mut entities = Vec::new();
        for row in rows {
            let (id, cat, canonical_name, requires_manifest) = row?;
            if let Some(category) = RefCategory::from_str(&cat) {
                entities.push(ReferenceEntity {
                    id,
                    category,
                    canonical_name,
                    requires_manifest,
                });
            }
        }
        Ok(entities)
    })
}

/// Whether the material with this id requires a manifest number.
pub fn material_requires_manifest(db: &Database, material_id: i64) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let flag: bool = conn.query_row(
            "SELECT requires_manifest FROM ref_entities WHERE id = ?1",
            params![material_id],
            |r| r.get(0),
        )?;
        Ok(flag)
    })
}
