//! Transaction classifier
//!
//! Pure predicates over one fetched [`LedgerTransaction`]: no I/O, no
//! clocks. The engine feeds these into the day-window aggregator.
//!
//! Two rule families exist, selected by the quest's verification kind:
//! savings transfers (amount-bearing) and protocol interactions (boolean).

use crate::ledger::{
    LedgerTransaction, LAMPORTS_PER_SOL, USDC_MINT, USDC_UNITS_PER_TOKEN,
};
use crate::quest::TokenSelector;
use crate::registry::ProtocolIdentifierSet;

/// What one transaction contributed to a quest.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TxMatch {
    /// Matched SOL amount (sum over all matching transfers in the tx).
    pub sol: f64,
    /// Matched USDC amount.
    pub usdc: f64,
    /// Number of matching transfers / interactions.
    pub hits: u32,
}

impl TxMatch {
    pub fn is_match(&self) -> bool {
        self.hits > 0
    }
}

/// Savings-transfer rule for one quest.
#[derive(Debug, Clone, Copy)]
pub struct SavingsRule<'a> {
    /// The savings wallet transfers must land on.
    pub destination: &'a str,
    /// The wallet's USDC token account, when known. SPL transfers name the
    /// token account as their destination, not the owning wallet.
    pub destination_token_account: Option<&'a str>,
    /// Optional sender constraint.
    pub source: Option<&'a str>,
    pub token: TokenSelector,
}

/// Verification rule for one quest, borrowed from quest + registry state.
#[derive(Debug, Clone, Copy)]
pub enum QuestRule<'a> {
    Savings(SavingsRule<'a>),
    Protocol(&'a ProtocolIdentifierSet),
}

/// Classify one transaction against a quest rule.
pub fn classify(tx: &LedgerTransaction, rule: &QuestRule) -> TxMatch {
    match rule {
        QuestRule::Savings(rule) => classify_savings(tx, rule),
        QuestRule::Protocol(idents) => {
            if matches_protocol(tx, idents) {
                TxMatch {
                    hits: 1,
                    ..Default::default()
                }
            } else {
                TxMatch::default()
            }
        }
    }
}

/// Savings-transfer predicate.
///
/// Scans all native and token transfer instructions, top-level and inner. A
/// single transaction may contribute several matched amounts (batched
/// transfers); all of them are summed. USDC received is taken from the
/// pre/post token balance delta when the meta carries one - that is the
/// authoritative "did the savings wallet actually receive" signal - with
/// the instruction scan as fallback for responses without balance meta.
pub fn classify_savings(tx: &LedgerTransaction, rule: &SavingsRule) -> TxMatch {
    let mut matched = TxMatch::default();

    if rule.token.counts_sol() {
        for ix in tx.all_instructions().filter(|ix| ix.is_system_transfer()) {
            let Some(transfer) = ix.transfer.as_ref() else {
                continue;
            };
            if transfer.destination.as_deref() != Some(rule.destination) {
                continue;
            }
            if !native_source_ok(tx, transfer.source.as_deref(), rule.source) {
                continue;
            }
            let lamports = transfer.lamports.unwrap_or(0);
            if lamports == 0 {
                continue;
            }
            matched.sol += lamports as f64 / LAMPORTS_PER_SOL;
            matched.hits += 1;
        }
    }

    if rule.token.counts_usdc() {
        let delta = tx.usdc_delta_for(rule.destination);
        if delta > 0.0 {
            if spl_source_ok(tx, rule.source) {
                matched.usdc += delta;
                matched.hits += 1;
            }
        } else {
            matched = scan_token_transfers(tx, rule, matched);
        }
    }

    matched
}

/// Instruction-level USDC scan, used when the transaction meta carries no
/// usable balance delta for the destination wallet.
fn scan_token_transfers(tx: &LedgerTransaction, rule: &SavingsRule, mut matched: TxMatch) -> TxMatch {
    for ix in tx.all_instructions().filter(|ix| ix.is_token_transfer()) {
        let Some(transfer) = ix.transfer.as_ref() else {
            continue;
        };

        // transferChecked names the mint; anything that is not USDC is out.
        if let Some(mint) = transfer.mint.as_deref() {
            if mint != USDC_MINT {
                continue;
            }
        }

        let destination = transfer.destination.as_deref();
        let hits_wallet = destination == Some(rule.destination);
        let hits_token_account = rule
            .destination_token_account
            .map_or(false, |account| destination == Some(account));
        if !hits_wallet && !hits_token_account {
            continue;
        }

        if !spl_instruction_source_ok(tx, transfer.authority.as_deref(), transfer.source.as_deref(), rule.source) {
            continue;
        }

        let amount = transfer
            .token_amount
            .as_ref()
            .and_then(|a| a.scaled(USDC_UNITS_PER_TOKEN))
            .or_else(|| {
                transfer
                    .amount
                    .as_deref()
                    .and_then(|raw| raw.parse::<f64>().ok())
                    .map(|raw| raw / USDC_UNITS_PER_TOKEN)
            })
            .unwrap_or(0.0);

        if amount <= 0.0 {
            continue;
        }

        matched.usdc += amount;
        matched.hits += 1;
    }

    matched
}

/// Source check for native transfers: declared source matches, or the
/// constraint wallet signed the transaction. The signer fallback exists
/// because some wallets route transfers through an intermediate account
/// whose "source" field is not the owning wallet.
fn native_source_ok(
    tx: &LedgerTransaction,
    declared_source: Option<&str>,
    constraint: Option<&str>,
) -> bool {
    let Some(constraint) = constraint else {
        return true;
    };
    if declared_source == Some(constraint) {
        return true;
    }
    tx.signers().any(|signer| signer == constraint)
}

/// Source check for delta-based USDC matches: the constraint wallet held
/// USDC going in, authorized one of the transfers, or signed.
fn spl_source_ok(tx: &LedgerTransaction, constraint: Option<&str>) -> bool {
    let Some(constraint) = constraint else {
        return true;
    };

    let held_usdc = tx.pre_token_balances.iter().any(|balance| {
        balance.owner.as_deref() == Some(constraint)
            && balance.mint.as_deref() == Some(USDC_MINT)
    });
    if held_usdc {
        return true;
    }

    let authorized = tx
        .all_instructions()
        .filter(|ix| ix.is_token_transfer())
        .filter_map(|ix| ix.transfer.as_ref())
        .any(|t| t.authority.as_deref() == Some(constraint));
    if authorized {
        return true;
    }

    tx.signers().any(|signer| signer == constraint)
}

fn spl_instruction_source_ok(
    tx: &LedgerTransaction,
    authority: Option<&str>,
    declared_source: Option<&str>,
    constraint: Option<&str>,
) -> bool {
    let Some(constraint) = constraint else {
        return true;
    };
    if authority == Some(constraint) || declared_source == Some(constraint) {
        return true;
    }
    tx.signers().any(|signer| signer == constraint)
}

/// Protocol-interaction predicate.
///
/// A transaction matches when any account key, any instruction's program
/// reference, or any log line contains a match identifier as a substring -
/// unless that same key or line also contains one of the protocol's exclude
/// identifiers. Exclusion wins: that is how two protocols sharing a router
/// address or log vocabulary get told apart. Log comparison is
/// case-insensitive; account keys are compared case-sensitively (base58 is
/// case-significant).
pub fn matches_protocol(tx: &LedgerTransaction, idents: &ProtocolIdentifierSet) -> bool {
    if idents.matches.is_empty() {
        return false;
    }

    let keys = tx.account_keys.iter().map(|key| key.pubkey.as_str());
    let program_refs = tx
        .all_instructions()
        .filter_map(|ix| ix.program_id.as_deref());

    for candidate in keys.chain(program_refs) {
        if candidate_matches(candidate, idents, false) {
            return true;
        }
    }

    tx.log_messages
        .iter()
        .any(|log| candidate_matches(log, idents, true))
}

fn candidate_matches(candidate: &str, idents: &ProtocolIdentifierSet, fold_case: bool) -> bool {
    let haystack = if fold_case {
        candidate.to_lowercase()
    } else {
        candidate.to_string()
    };

    let contains = |needle: &str| -> bool {
        if fold_case {
            haystack.contains(&needle.to_lowercase())
        } else {
            haystack.contains(needle)
        }
    };

    if idents.excludes.iter().any(|ex| contains(ex)) {
        return false;
    }

    idents.matches.iter().any(|m| contains(m))
}
