//! Quest CRUD operations
//!
//! The verification engine only reads quests; create/delete exist for the
//! management CLI and for seeding test fixtures.

use rusqlite::{params, Connection, Row};
use tracing::debug;

use crate::quest::{Quest, TokenSelector, VerificationKind};
use crate::registry::ProtocolIdentifierSet;
use crate::types::{Result, VigilError};

fn quest_from_row(row: &Row) -> Result<Quest> {
    let kind_str: String = row.get("kind")?;
    let kind = VerificationKind::parse(&kind_str)
        .ok_or_else(|| VigilError::Internal(format!("unknown quest kind in store: {kind_str}")))?;

    let token_str: String = row.get("token")?;
    let token = TokenSelector::parse(&token_str)
        .ok_or_else(|| VigilError::Internal(format!("unknown token selector in store: {token_str}")))?;

    let wallets_json: String = row.get("wallets_json")?;
    let wallets: Vec<String> = serde_json::from_str(&wallets_json)?;

    let custom_json: Option<String> = row.get("custom_identifiers_json")?;
    let custom_identifiers: Option<ProtocolIdentifierSet> = custom_json
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?;

    Ok(Quest {
        id: row.get("id")?,
        owner: row.get("owner")?,
        title: row.get("title")?,
        kind,
        wallets,
        source_wallet: row.get("source_wallet")?,
        token,
        min_amount: row.get("min_amount")?,
        protocol: row.get("protocol")?,
        custom_identifiers,
        created_at: row.get("created_at")?,
    })
}

pub fn insert_quest(conn: &Connection, quest: &Quest) -> Result<()> {
    quest.validate()?;

    let wallets_json = serde_json::to_string(&quest.wallets)?;
    let custom_json = quest
        .custom_identifiers
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;

    conn.execute(
        "INSERT INTO quests
            (id, owner, title, kind, wallets_json, source_wallet, token,
             min_amount, protocol, custom_identifiers_json, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            quest.id,
            quest.owner,
            quest.title,
            quest.kind.as_str(),
            wallets_json,
            quest.source_wallet,
            quest.token.as_str(),
            quest.min_amount,
            quest.protocol,
            custom_json,
            quest.created_at,
        ],
    )?;

    debug!(quest_id = %quest.id, kind = quest.kind.as_str(), "Inserted quest");
    Ok(())
}

pub fn get_quest(conn: &Connection, id: &str) -> Result<Option<Quest>> {
    let mut stmt = conn.prepare("SELECT * FROM quests WHERE id = ?1")?;
    let mut rows = stmt.query(params![id])?;

    match rows.next()? {
        Some(row) => Ok(Some(quest_from_row(row)?)),
        None => Ok(None),
    }
}

pub fn list_quests(conn: &Connection) -> Result<Vec<Quest>> {
    collect_quests(conn, "SELECT * FROM quests ORDER BY created_at")
}

pub fn list_auto_verifiable(conn: &Connection) -> Result<Vec<Quest>> {
    collect_quests(
        conn,
        "SELECT * FROM quests WHERE kind != 'manual' ORDER BY created_at",
    )
}

fn collect_quests(conn: &Connection, sql: &str) -> Result<Vec<Quest>> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query([])?;

    let mut quests = Vec::new();
    while let Some(row) = rows.next()? {
        quests.push(quest_from_row(row)?);
    }
    Ok(quests)
}

pub fn delete_quest(conn: &Connection, id: &str) -> Result<bool> {
    let deleted = conn.execute("DELETE FROM quests WHERE id = ?1", params![id])?;
    Ok(deleted > 0)
}
