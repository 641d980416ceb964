//! In-memory cache over the reference-entity table.
//!
//! Extraction resolves dozens of names per page; hitting SQLite for each
//! one would serialize the worker pool on the connection mutex. The cache
//! is preloaded once per batch and shared read-mostly across workers.

use std::collections::HashMap;
use std::sync::RwLock;

use thiserror::Error;

use crate::db::{self, Database, DatabaseError};
use crate::model::RefCategory;

#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("No {category} entity named '{name}'")]
    NotFound { category: RefCategory, name: String },

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("Reference cache lock poisoned")]
    LockPoisoned,
}

/// Maps (category, canonical name) to entity id. Lookups are
/// case-insensitive; names are keyed lowercased.
pub struct ReferenceCache {
    by_name: RwLock<HashMap<(RefCategory, String), i64>>,
    manifest_flags: RwLock<HashMap<i64, bool>>,
}

impl ReferenceCache {
    pub fn new() -> Self {
        Self {
            by_name: RwLock::new(HashMap::new()),
            manifest_flags: RwLock::new(HashMap::new()),
        }
    }

    /// Loads every reference entity up front. Called once before the
    /// worker pool starts so workers never block on the database here.
    pub fn preload(db: &Database) -> Result<Self, ResolveError> {
        let cache = Self::new();
        {
            let mut by_name = cache.by_name.write().map_err(|_| ResolveError::LockPoisoned)?;
            let mut flags = cache
                .manifest_flags
                .write()
                .map_err(|_| ResolveError::LockPoisoned)?;
            for entity in db::ref_repo::list_all(db)? {
                by_name.insert(
                    (entity.category, entity.canonical_name.to_lowercase()),
                    entity.id,
                );
                flags.insert(entity.id, entity.requires_manifest);
            }
        }
        Ok(cache)
    }

    /// Resolves a canonical name to its entity id, falling back to the
    /// database for entities added after preload.
    pub fn resolve(
        &self,
        db: &Database,
        category: RefCategory,
        name: &str,
    ) -> Result<i64, ResolveError> {
        let key = (category, name.to_lowercase());

        {
            let by_name = self.by_name.read().map_err(|_| ResolveError::LockPoisoned)?;
            if let Some(&id) = by_name.get(&key) {
                return Ok(id);
            }
        }

        match db::ref_repo::find(db, category, name)? {
            Some(entity) => {
                let mut by_name =
                    self.by_name.write().map_err(|_| ResolveError::LockPoisoned)?;
                by_name.insert(key, entity.id);
                self.manifest_flags
                    .write()
                    .map_err(|_| ResolveError::LockPoisoned)?
                    .insert(entity.id, entity.requires_manifest);
                Ok(entity.id)
            }
            None => Err(ResolveError::NotFound {
                category,
                name: name.to_string(),
            }),
        }
    }

    /// Whether a material entity requires a manifest number on its tickets.
    pub fn requires_manifest(&self, db: &Database, material_id: i64) -> Result<bool, ResolveError> {
        {
            let flags = self
                .manifest_flags
                .read()
                .map_err(|_| ResolveError::LockPoisoned)?;
            if let Some(&flag) = flags.get(&material_id) {
                return Ok(flag);
            }
        }

        let flag = db::ref_repo::material_requires_manifest(db, material_id)?;
        self.manifest_flags
            .write()
            .map_err(|_| ResolveError::LockPoisoned)?
            .insert(material_id, flag);
        Ok(flag)
    }
}

impl Default for ReferenceCache {
    fn default() -> Self {
        Self::new()
    }
}
