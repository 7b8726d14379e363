//! Error types for vigil

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VigilError {
    /// Network-level failure talking to the ledger RPC (retried, bounded).
    #[error("ledger unreachable: {0}")]
    Unreachable(String),

    /// The ledger RPC asked us to slow down (HTTP 429).
    #[error("ledger rate limited: {0}")]
    RateLimited(String),

    /// Response arrived but was missing expected fields or was not JSON.
    #[error("malformed ledger response: {0}")]
    Malformed(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("quest is not auto-verifiable: {0}")]
    NotAutoVerifiable(String),

    #[error("invalid quest: {0}")]
    InvalidQuest(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl VigilError {
    /// Whether a fresh attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, VigilError::Unreachable(_) | VigilError::RateLimited(_))
    }
}

pub type Result<T> = std::result::Result<T, VigilError>;
