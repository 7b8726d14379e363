//! Configuration for Vigil
//!
//! CLI arguments and environment variable handling using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::engine::EngineConfig;
use crate::ledger::LedgerClientConfig;

/// Vigil - quest verification engine
///
/// Watches a Solana wallet ledger and auto-verifies daily quests.
#[derive(Parser, Debug, Clone)]
#[command(name = "vigil")]
#[command(about = "Quest verification engine for a Solana wallet ledger")]
pub struct Args {
    /// Ledger JSON-RPC endpoint
    #[arg(
        long,
        env = "RPC_URL",
        default_value = "https://api.mainnet-beta.solana.com"
    )]
    pub rpc_url: String,

    /// Path to the SQLite quest database
    #[arg(long, env = "VIGIL_DB", default_value = "vigil.db")]
    pub db_path: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// RPC request timeout in seconds
    #[arg(long, env = "RPC_TIMEOUT_SECS", default_value = "30")]
    pub rpc_timeout_secs: u64,

    /// Attempts per RPC call before the affected wallet/day is skipped
    #[arg(long, env = "RPC_MAX_ATTEMPTS", default_value = "3")]
    pub rpc_max_attempts: u32,

    /// Base backoff after a rate-limit response, in milliseconds
    #[arg(long, env = "RATE_LIMIT_BACKOFF_MS", default_value = "1000")]
    pub rate_limit_backoff_ms: u64,

    /// Signature page size per address (the upstream enforces its own cap)
    #[arg(long, env = "SIGNATURE_LIMIT", default_value = "200")]
    pub signature_limit: usize,

    /// Concurrent transaction-detail fetches per check invocation
    #[arg(long, env = "FETCH_CONCURRENCY", default_value = "5")]
    pub fetch_concurrency: usize,

    /// Backfill cap on detail fetches per day for protocol quests
    #[arg(long, env = "BACKFILL_TX_PER_DAY", default_value = "10")]
    pub backfill_tx_per_day: usize,

    /// Seconds between scheduled verification sweeps in `run` mode
    #[arg(long, env = "CHECK_INTERVAL_SECS", default_value = "900")]
    pub check_interval_secs: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the verification daemon (scheduled "check today" sweeps)
    Run,

    /// Check one quest against today's ledger activity
    Check {
        /// Quest id
        quest_id: String,
    },

    /// Reconcile a quest's full fetched signature history
    Backfill {
        /// Quest id
        quest_id: String,
    },

    /// Show a wallet's SOL and USDC balances
    Balance {
        /// Wallet address
        wallet: String,
    },

    /// Manage quests
    #[command(subcommand)]
    Quest(QuestCommand),
}

#[derive(Subcommand, Debug, Clone)]
pub enum QuestCommand {
    /// Add a quest
    Add {
        #[arg(long)]
        owner: String,

        #[arg(long)]
        title: String,

        /// Verification kind: manual, savings-transfer, protocol-interaction
        #[arg(long)]
        kind: String,

        /// Comma-separated candidate wallets. For savings quests the first
        /// entry is the destination (savings) wallet.
        #[arg(long, default_value = "")]
        wallets: String,

        /// Sender constraint for savings quests
        #[arg(long)]
        source_wallet: Option<String>,

        /// Token selector: SOL, USDC, EITHER
        #[arg(long, default_value = "EITHER")]
        token: String,

        /// Minimum aggregate amount per day (0 = any positive amount)
        #[arg(long, default_value = "0")]
        min_amount: f64,

        /// Protocol name for protocol-interaction quests
        #[arg(long)]
        protocol: Option<String>,
    },

    /// List quests with completion stats
    List,

    /// Delete a quest and its completions
    Remove {
        /// Quest id
        quest_id: String,
    },
}

impl Args {
    pub fn ledger_config(&self) -> LedgerClientConfig {
        LedgerClientConfig {
            rpc_url: self.rpc_url.clone(),
            request_timeout: Duration::from_secs(self.rpc_timeout_secs),
            max_attempts: self.rpc_max_attempts,
            rate_limit_backoff: Duration::from_millis(self.rate_limit_backoff_ms),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            signature_limit: self.signature_limit,
            fetch_concurrency: self.fetch_concurrency,
            backfill_tx_per_day: self.backfill_tx_per_day,
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.rpc_url.trim().is_empty() {
            return Err("RPC_URL must not be empty".to_string());
        }
        if self.rpc_max_attempts == 0 {
            return Err("RPC_MAX_ATTEMPTS must be at least 1".to_string());
        }
        if self.signature_limit == 0 {
            return Err("SIGNATURE_LIMIT must be at least 1".to_string());
        }
        if self.fetch_concurrency == 0 {
            return Err("FETCH_CONCURRENCY must be at least 1".to_string());
        }
        if self.check_interval_secs < 30 {
            return Err("CHECK_INTERVAL_SECS must be at least 30".to_string());
        }
        Ok(())
    }
}

/// Split a comma-separated wallet list, dropping empty entries.
pub fn parse_wallet_list(wallets: &str) -> Vec<String> {
    wallets
        .split(',')
        .map(|w| w.trim().to_string())
        .filter(|w| !w.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_wallet_list() {
        assert_eq!(
            parse_wallet_list("a, b ,,c"),
            vec!["a".to_string(), "b".to_string(), "c".to_string()]
        );
        assert!(parse_wallet_list("").is_empty());
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let args = Args::parse_from(["vigil", "--fetch-concurrency", "0", "run"]);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_defaults_are_valid() {
        let args = Args::parse_from(["vigil", "run"]);
        assert!(args.validate().is_ok());
        assert_eq!(args.signature_limit, 200);
        assert_eq!(args.fetch_concurrency, 5);
    }
}
