//! SQLite store for quests and completions
//!
//! One database file holds both tables. The engine only ever reads quests;
//! completions are append-only with a `UNIQUE(quest_id, completed_date)`
//! constraint so a duplicate insert - e.g. the scheduled check racing a
//! manual one across processes - degrades to a no-op instead of a second
//! row or an error.

pub mod completions;
pub mod quests;
pub mod schema;

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use chrono::NaiveDate;
use rusqlite::Connection;
use tracing::{debug, info};

use crate::quest::{Completion, NewCompletion, Quest};
use crate::types::{Result, VigilError};

pub use completions::streak_from_dates;

/// Shared handle to the quest + completion database.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open or create the database at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        info!("Opening SQLite store at {:?}", path);

        let conn = Connection::open(path)?;

        // WAL for concurrent readers; foreign keys so quest deletion
        // cascades to completions.
        conn.execute_batch(
            "PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL; PRAGMA foreign_keys=ON;",
        )?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.with_conn(schema::init_schema)?;

        Ok(store)
    }

    /// In-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        debug!("Opening in-memory SQLite store");

        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys=ON;")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        store.with_conn(schema::init_schema)?;

        Ok(store)
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| VigilError::Internal(format!("store lock poisoned: {e}")))?;
        f(&conn)
    }

    // ---- quests ----------------------------------------------------------

    pub fn insert_quest(&self, quest: &Quest) -> Result<()> {
        self.with_conn(|conn| quests::insert_quest(conn, quest))
    }

    pub fn get_quest(&self, id: &str) -> Result<Option<Quest>> {
        self.with_conn(|conn| quests::get_quest(conn, id))
    }

    pub fn list_quests(&self) -> Result<Vec<Quest>> {
        self.with_conn(quests::list_quests)
    }

    /// Quests the scheduled verification loop should look at.
    pub fn list_auto_verifiable(&self) -> Result<Vec<Quest>> {
        self.with_conn(quests::list_auto_verifiable)
    }

    /// Delete a quest; its completions cascade. Returns whether it existed.
    pub fn delete_quest(&self, id: &str) -> Result<bool> {
        self.with_conn(|conn| quests::delete_quest(conn, id))
    }

    // ---- completions -----------------------------------------------------

    pub fn completed_dates(&self, quest_id: &str) -> Result<HashSet<NaiveDate>> {
        self.with_conn(|conn| completions::completed_dates(conn, quest_id))
    }

    /// Insert a batch of completions, ignoring duplicates. Returns the
    /// number actually inserted.
    pub fn insert_completions(&self, batch: &[NewCompletion]) -> Result<usize> {
        self.with_conn(|conn| completions::insert_completions(conn, batch))
    }

    pub fn list_completions(&self, quest_id: &str) -> Result<Vec<Completion>> {
        self.with_conn(|conn| completions::list_completions(conn, quest_id))
    }

    /// Consecutive completed days ending at `today` (or yesterday, when
    /// today is not yet complete).
    pub fn current_streak(&self, quest_id: &str, today: NaiveDate) -> Result<u32> {
        let dates = self.completed_dates(quest_id)?;
        Ok(streak_from_dates(&dates, today))
    }
}
