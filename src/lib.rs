//! Vigil - Quest verification engine
//!
//! Vigil watches a Solana wallet ledger and auto-verifies daily quests:
//! transfers into a savings wallet, or interactions with a named DeFi
//! protocol. Evidence is read straight from the public transaction ledger,
//! so quests verify themselves instead of relying on manual check-off.
//!
//! ## Pipeline
//!
//! Ledger Client -> Transaction Classifier -> Day-Window Aggregator ->
//! Completion Reconciler -> persisted Completion records
//!
//! The [`engine::VerifyEngine`] drives this pipeline per quest in two modes:
//! "check today" (current UTC day, low latency) and "backfill" (historical
//! reconciliation over the fetched signature window). At most one completion
//! is ever recorded per (quest, UTC day).

pub mod aggregate;
pub mod classify;
pub mod config;
pub mod engine;
pub mod ledger;
pub mod quest;
pub mod reconcile;
pub mod registry;
pub mod scheduler;
pub mod store;
pub mod types;

pub use config::Args;
pub use engine::VerifyEngine;
pub use types::{Result, VigilError};
