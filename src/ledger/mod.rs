//! Ledger access - Solana JSON-RPC client and wire types
//!
//! A thin, retrying wrapper over the external ledger RPC. The engine only
//! needs two calls ("list signatures for address", "get transaction") plus
//! the balance lookups used by the CLI; everything else about the chain is
//! deliberately out of scope - RPC responses are trusted as ground truth.

pub mod client;
pub mod types;

pub use client::{LedgerApi, LedgerClient, LedgerClientConfig};
pub use types::{
    AccountKey, Instruction, LedgerTransaction, SignatureInfo, TokenAmount, TokenBalance,
    TransferInfo, LAMPORTS_PER_SOL, USDC_MINT, USDC_UNITS_PER_TOKEN,
};
