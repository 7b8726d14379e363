//! Database schema definitions

use rusqlite::Connection;
use tracing::info;

use crate::types::Result;

/// Current schema version for migrations
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
pub fn init_schema(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version == 0 {
        info!("Creating new database schema v{}", SCHEMA_VERSION);
        conn.execute_batch(QUEST_SCHEMA)?;
        set_schema_version(conn, SCHEMA_VERSION)?;
    } else if current_version < SCHEMA_VERSION {
        info!(
            "Migrating schema from v{} to v{}",
            current_version, SCHEMA_VERSION
        );
        migrate_schema(conn, current_version)?;
    }

    Ok(())
}

/// Get current schema version (0 if not initialized)
fn get_schema_version(conn: &Connection) -> Result<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)",
        [],
    )?;

    let version: i32 = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .unwrap_or(0);

    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?)", [version])?;
    Ok(())
}

/// Migrate schema from older version
fn migrate_schema(conn: &Connection, from_version: i32) -> Result<()> {
    match from_version {
        // 1 -> 2 migrations go here as the schema evolves
        _ => {}
    }

    set_schema_version(conn, SCHEMA_VERSION)?;
    Ok(())
}

/// Quest and completion tables
///
/// Wallet lists and custom identifier sets are JSON columns: they are
/// opaque to SQL and only ever read back whole.
const QUEST_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS quests (
    id TEXT PRIMARY KEY NOT NULL,
    owner TEXT NOT NULL,
    title TEXT NOT NULL,
    kind TEXT NOT NULL,
    wallets_json TEXT NOT NULL DEFAULT '[]',
    source_wallet TEXT,
    token TEXT NOT NULL DEFAULT 'EITHER',
    min_amount REAL NOT NULL DEFAULT 0,
    protocol TEXT,
    custom_identifiers_json TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- One row per (quest, UTC day). The unique constraint is the cross-process
-- idempotence guarantee: concurrent checks for the same quest cannot both
-- record the same day.
CREATE TABLE IF NOT EXISTS quest_completions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    quest_id TEXT NOT NULL,
    completed_date TEXT NOT NULL,
    auto_verified INTEGER NOT NULL DEFAULT 0,
    tx_signature TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    UNIQUE (quest_id, completed_date),
    FOREIGN KEY (quest_id) REFERENCES quests(id) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_completions_quest ON quest_completions(quest_id);
"#;
