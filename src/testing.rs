//! Test utilities for database setup.
//!
//! Provides helpers that reuse the authoritative schema initialization,
//! so tests never carry their own copy of the tables.

use std::path::Path;
use tempfile::TempDir;

use crate::db::{self, DbPool, SqliteStateStore};
use crate::domain::Card;

/// On-disk study database in a temporary directory.
///
/// The directory and database file are removed when dropped.
pub struct TestEnv {
    /// Temporary directory (kept alive for database file persistence)
    pub temp: TempDir,
    pub pool: DbPool,
    pub store: SqliteStateStore,
}

impl TestEnv {
    /// Create a test environment with a migrated `study.db`
    pub fn new() -> rusqlite::Result<Self> {
        let temp =
            TempDir::new().map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;

        let pool = db::init_db(&temp.path().join("study.db"))?;
        let store = SqliteStateStore::new(pool.clone());

        Ok(Self { temp, pool, store })
    }

    /// Insert `fronts.len()` cards into `set_id`, returned in position order
    pub fn seed_set(&self, set_id: &str, fronts: &[&str]) -> rusqlite::Result<Vec<Card>> {
        let conn = db::try_lock(&self.pool)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        fronts
            .iter()
            .map(|front| db::add_card_to_set(&conn, set_id, front, &front.to_uppercase()))
            .collect()
    }

    /// Get the temporary directory path for creating test files.
    pub fn path(&self) -> &Path {
        self.temp.path()
    }
}
