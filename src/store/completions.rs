//! Completion records
//!
//! Append-only: a completion is never mutated, only deleted by quest
//! cascade. Duplicate inserts on (quest_id, completed_date) are resolved
//! with INSERT OR IGNORE - the unique constraint turns a racing insert into
//! a no-op, logged at debug level only, per the error-handling policy.

use std::collections::HashSet;

use chrono::NaiveDate;
use rusqlite::{params, Connection};
use tracing::debug;

use crate::quest::{Completion, NewCompletion};
use crate::types::{Result, VigilError};

const DATE_FORMAT: &str = "%Y-%m-%d";

fn parse_date(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, DATE_FORMAT)
        .map_err(|e| VigilError::Internal(format!("bad date in store: {s}: {e}")))
}

/// All recorded completion dates for a quest.
pub fn completed_dates(conn: &Connection, quest_id: &str) -> Result<HashSet<NaiveDate>> {
    let mut stmt =
        conn.prepare("SELECT completed_date FROM quest_completions WHERE quest_id = ?1")?;
    let mut rows = stmt.query(params![quest_id])?;

    let mut dates = HashSet::new();
    while let Some(row) = rows.next()? {
        let date_str: String = row.get(0)?;
        dates.insert(parse_date(&date_str)?);
    }
    Ok(dates)
}

/// Insert a batch, ignoring rows whose (quest_id, date) already exists.
/// Returns how many rows were actually inserted.
pub fn insert_completions(conn: &Connection, batch: &[NewCompletion]) -> Result<usize> {
    let mut inserted = 0;

    for completion in batch {
        let date_str = completion.date.format(DATE_FORMAT).to_string();
        let changed = conn.execute(
            "INSERT OR IGNORE INTO quest_completions
                (quest_id, completed_date, auto_verified, tx_signature)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                completion.quest_id,
                date_str,
                completion.auto_verified,
                completion.tx_signature,
            ],
        )?;

        if changed > 0 {
            inserted += 1;
        } else {
            debug!(
                quest_id = %completion.quest_id,
                date = %date_str,
                "Completion already recorded; insert ignored"
            );
        }
    }

    Ok(inserted)
}

/// Completions for a quest, newest first.
pub fn list_completions(conn: &Connection, quest_id: &str) -> Result<Vec<Completion>> {
    let mut stmt = conn.prepare(
        "SELECT quest_id, completed_date, auto_verified, tx_signature, created_at
         FROM quest_completions
         WHERE quest_id = ?1
         ORDER BY completed_date DESC",
    )?;
    let mut rows = stmt.query(params![quest_id])?;

    let mut completions = Vec::new();
    while let Some(row) = rows.next()? {
        let date_str: String = row.get(1)?;
        completions.push(Completion {
            quest_id: row.get(0)?,
            completed_date: parse_date(&date_str)?,
            auto_verified: row.get(2)?,
            tx_signature: row.get(3)?,
            created_at: row.get(4)?,
        });
    }
    Ok(completions)
}

/// Consecutive completed days ending at `today`.
///
/// The streak survives one pending day: if today has no completion yet but
/// yesterday does, the chain counts from yesterday. Two idle days break it.
pub fn streak_from_dates(dates: &HashSet<NaiveDate>, today: NaiveDate) -> u32 {
    let mut sorted: Vec<NaiveDate> = dates.iter().copied().collect();
    sorted.sort_unstable_by(|a, b| b.cmp(a));

    let Some(&newest) = sorted.first() else {
        return 0;
    };

    let yesterday = today - chrono::Days::new(1);
    if newest != today && newest != yesterday {
        return 0;
    }

    let mut streak = 0;
    let mut expected = newest;
    for date in sorted {
        if date == expected {
            streak += 1;
            expected = expected - chrono::Days::new(1);
        } else if date < expected {
            break;
        }
    }

    streak
}
