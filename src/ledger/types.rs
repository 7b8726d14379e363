//! Wire types for the ledger RPC (jsonParsed encoding)
//!
//! These mirror the subset of the RPC's `getTransaction` response the
//! classifier needs. Every field the upstream may omit is optional with a
//! default - a missing field degrades to "no signal", never to a parse
//! error for the whole transaction.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// USDC token mint address on mainnet.
pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

/// Native token decimals: 1 SOL = 10^9 lamports.
pub const LAMPORTS_PER_SOL: f64 = 1_000_000_000.0;

/// USDC decimals: 1 USDC = 10^6 raw units.
pub const USDC_UNITS_PER_TOKEN: f64 = 1_000_000.0;

/// One entry from `getSignaturesForAddress`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignatureInfo {
    pub signature: String,
    /// Unix seconds; the upstream omits this for very fresh or pruned
    /// entries, and such entries cannot be bucketed into a day.
    #[serde(default)]
    pub block_time: Option<i64>,
}

/// An account referenced by a transaction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountKey {
    pub pubkey: String,
    #[serde(default)]
    pub signer: bool,
}

/// Token amount as reported by the RPC, pre-scaled and raw.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TokenAmount {
    pub ui_amount: Option<f64>,
    pub amount: Option<String>,
    pub decimals: Option<u8>,
}

impl TokenAmount {
    /// Prefer the RPC's pre-scaled amount; fall back to scaling the raw
    /// string with the given divisor.
    pub fn scaled(&self, units_per_token: f64) -> Option<f64> {
        if let Some(ui) = self.ui_amount {
            return Some(ui);
        }
        self.amount
            .as_deref()
            .and_then(|raw| raw.parse::<f64>().ok())
            .map(|raw| raw / units_per_token)
    }
}

/// Pre/post token balance entry from transaction meta.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TokenBalance {
    pub owner: Option<String>,
    pub mint: Option<String>,
    pub ui_token_amount: Option<TokenAmount>,
}

/// The `parsed.info` payload of a transfer instruction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransferInfo {
    pub source: Option<String>,
    pub destination: Option<String>,
    pub lamports: Option<u64>,
    pub mint: Option<String>,
    /// Raw token units as a decimal string (SPL `transfer`).
    pub amount: Option<String>,
    /// Scaled amount (SPL `transferChecked`).
    pub token_amount: Option<TokenAmount>,
    /// Owner/delegate that authorized an SPL transfer.
    pub authority: Option<String>,
}

/// One instruction, top-level or inner, reduced to what the classifier reads.
#[derive(Debug, Clone, Default)]
pub struct Instruction {
    /// Program name for parsed instructions ("system", "spl-token").
    pub program: Option<String>,
    pub program_id: Option<String>,
    /// Parsed instruction type ("transfer", "transferChecked").
    pub parsed_type: Option<String>,
    pub transfer: Option<TransferInfo>,
}

impl Instruction {
    pub fn is_system_transfer(&self) -> bool {
        self.program.as_deref() == Some("system")
            && self.parsed_type.as_deref() == Some("transfer")
    }

    pub fn is_token_transfer(&self) -> bool {
        self.program.as_deref() == Some("spl-token")
            && matches!(
                self.parsed_type.as_deref(),
                Some("transfer") | Some("transferChecked")
            )
    }
}

/// One fetched transaction, consumed once by the classifier then discarded.
#[derive(Debug, Clone, Default)]
pub struct LedgerTransaction {
    pub signature: String,
    pub block_time: Option<i64>,
    pub account_keys: Vec<AccountKey>,
    pub instructions: Vec<Instruction>,
    /// Inner (CPI) instructions, flattened across all levels.
    pub inner_instructions: Vec<Instruction>,
    pub log_messages: Vec<String>,
    pub pre_token_balances: Vec<TokenBalance>,
    pub post_token_balances: Vec<TokenBalance>,
}

impl LedgerTransaction {
    /// Top-level followed by inner instructions.
    pub fn all_instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter().chain(self.inner_instructions.iter())
    }

    /// Pubkeys that signed this transaction.
    pub fn signers(&self) -> impl Iterator<Item = &str> {
        self.account_keys
            .iter()
            .filter(|k| k.signer)
            .map(|k| k.pubkey.as_str())
    }

    /// USDC balance delta for a wallet across this transaction, from the
    /// pre/post token balance meta. Positive means the wallet received.
    pub fn usdc_delta_for(&self, owner: &str) -> f64 {
        let post = self.token_balance_of(&self.post_token_balances, owner);
        let pre = self.token_balance_of(&self.pre_token_balances, owner);
        match (post, pre) {
            (Some(post), Some(pre)) => post - pre,
            (Some(post), None) => post,
            _ => 0.0,
        }
    }

    fn token_balance_of(&self, balances: &[TokenBalance], owner: &str) -> Option<f64> {
        balances
            .iter()
            .filter(|b| {
                b.owner.as_deref() == Some(owner) && b.mint.as_deref() == Some(USDC_MINT)
            })
            .filter_map(|b| b.ui_token_amount.as_ref())
            .filter_map(|amount| amount.scaled(USDC_UNITS_PER_TOKEN))
            .next()
    }

    /// Build from a `getTransaction` result value (jsonParsed encoding).
    ///
    /// Returns `None` when the response has no parseable message - the
    /// caller treats that single signature as not-found and moves on.
    pub fn from_rpc(signature: &str, result: &Value) -> Option<Self> {
        let raw: RawTransaction = serde_json::from_value(result.clone()).ok()?;
        let message = raw.transaction?.message?;

        let account_keys = message
            .account_keys
            .into_iter()
            .map(|key| match key {
                RawAccountKey::Detailed { pubkey, signer } => AccountKey { pubkey, signer },
                RawAccountKey::Plain(pubkey) => AccountKey {
                    pubkey,
                    signer: false,
                },
            })
            .collect();

        let instructions = message
            .instructions
            .into_iter()
            .map(Instruction::from_raw)
            .collect();

        let meta = raw.meta.unwrap_or_default();
        let inner_instructions = meta
            .inner_instructions
            .into_iter()
            .flat_map(|inner| inner.instructions)
            .map(Instruction::from_raw)
            .collect();

        Some(Self {
            signature: signature.to_string(),
            block_time: raw.block_time,
            account_keys,
            instructions,
            inner_instructions,
            log_messages: meta.log_messages,
            pre_token_balances: meta.pre_token_balances,
            post_token_balances: meta.post_token_balances,
        })
    }
}

impl Instruction {
    fn from_raw(raw: RawInstruction) -> Self {
        // `parsed` is an object {type, info} for parsed programs, a bare
        // string for some others (memo), or absent for opaque instructions.
        let (parsed_type, transfer) = match raw.parsed {
            Some(Value::Object(ref map)) => {
                let kind = map.get("type").and_then(Value::as_str).map(String::from);
                let info = map
                    .get("info")
                    .cloned()
                    .and_then(|info| serde_json::from_value::<TransferInfo>(info).ok());
                (kind, info)
            }
            _ => (None, None),
        };

        Self {
            program: raw.program,
            program_id: raw.program_id,
            parsed_type,
            transfer,
        }
    }
}

// Raw mirrors of the RPC response shape. Kept private: the rest of the
// crate only sees the reduced types above.

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawTransaction {
    block_time: Option<i64>,
    transaction: Option<RawTransactionBody>,
    meta: Option<RawMeta>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawTransactionBody {
    message: Option<RawMessage>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawMessage {
    account_keys: Vec<RawAccountKey>,
    instructions: Vec<RawInstruction>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawAccountKey {
    Detailed {
        pubkey: String,
        #[serde(default)]
        signer: bool,
    },
    Plain(String),
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawInstruction {
    program: Option<String>,
    program_id: Option<String>,
    parsed: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawMeta {
    inner_instructions: Vec<RawInnerInstructions>,
    log_messages: Vec<String>,
    pre_token_balances: Vec<TokenBalance>,
    post_token_balances: Vec<TokenBalance>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawInnerInstructions {
    instructions: Vec<RawInstruction>,
}
