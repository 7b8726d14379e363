//! End-to-end engine tests against a fake ledger
//!
//! The whole pipeline runs for real - fetch, classify, aggregate,
//! reconcile, persist - with only the RPC boundary faked.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;

use vigil::aggregate::{day_bounds, today_utc};
use vigil::engine::{EngineConfig, VerifyEngine};
use vigil::ledger::{
    AccountKey, Instruction, LedgerApi, LedgerTransaction, SignatureInfo, TransferInfo,
};
use vigil::quest::{NewCompletion, Quest, TokenSelector, VerificationKind};
use vigil::registry::ProtocolRegistry;
use vigil::store::Store;
use vigil::types::{Result, VigilError};

const SAVINGS: &str = "SavingsWallet11111111111111111111";
const SENDER: &str = "SenderWallet111111111111111111111";
const JUPITER_PROGRAM: &str = "JUP6LkbZbjS1jKKwapdHNy74zcZ3tLUZoi5QNyVTaV4";

/// Canned ledger: address -> signature page, signature -> transaction.
#[derive(Default)]
struct FakeLedger {
    pages: HashMap<String, Vec<SignatureInfo>>,
    transactions: HashMap<String, LedgerTransaction>,
    failing_addresses: HashSet<String>,
}

impl FakeLedger {
    fn add_tx(&mut self, address: &str, tx: LedgerTransaction) {
        self.pages
            .entry(address.to_string())
            .or_default()
            .push(SignatureInfo {
                signature: tx.signature.clone(),
                block_time: tx.block_time,
            });
        self.transactions.insert(tx.signature.clone(), tx);
    }

    fn fail_address(&mut self, address: &str) {
        self.failing_addresses.insert(address.to_string());
    }
}

#[async_trait]
impl LedgerApi for FakeLedger {
    async fn list_signatures(&self, address: &str, limit: usize) -> Result<Vec<SignatureInfo>> {
        if self.failing_addresses.contains(address) {
            return Err(VigilError::Unreachable(format!("fake outage for {address}")));
        }
        let mut page = self.pages.get(address).cloned().unwrap_or_default();
        // Newest first, like the real upstream.
        page.sort_by_key(|sig| std::cmp::Reverse(sig.block_time));
        page.truncate(limit);
        Ok(page)
    }

    async fn get_transaction(&self, signature: &str) -> Result<Option<LedgerTransaction>> {
        Ok(self.transactions.get(signature).cloned())
    }

    async fn get_balance(&self, _address: &str) -> Result<f64> {
        Ok(0.0)
    }

    async fn usdc_token_account(&self, _owner: &str) -> Result<Option<String>> {
        Ok(None)
    }

    async fn usdc_balance(&self, _owner: &str) -> Result<f64> {
        Ok(0.0)
    }
}

fn sol_tx(signature: &str, block_time: i64, destination: &str, lamports: u64) -> LedgerTransaction {
    LedgerTransaction {
        signature: signature.to_string(),
        block_time: Some(block_time),
        account_keys: vec![AccountKey {
            pubkey: SENDER.to_string(),
            signer: true,
        }],
        instructions: vec![Instruction {
            program: Some("system".to_string()),
            program_id: Some("11111111111111111111111111111111".to_string()),
            parsed_type: Some("transfer".to_string()),
            transfer: Some(TransferInfo {
                source: Some(SENDER.to_string()),
                destination: Some(destination.to_string()),
                lamports: Some(lamports),
                ..Default::default()
            }),
        }],
        ..Default::default()
    }
}

fn jupiter_tx(signature: &str, block_time: i64) -> LedgerTransaction {
    LedgerTransaction {
        signature: signature.to_string(),
        block_time: Some(block_time),
        account_keys: vec![
            AccountKey {
                pubkey: SENDER.to_string(),
                signer: true,
            },
            AccountKey {
                pubkey: JUPITER_PROGRAM.to_string(),
                signer: false,
            },
        ],
        ..Default::default()
    }
}

fn plain_tx(signature: &str, block_time: i64) -> LedgerTransaction {
    LedgerTransaction {
        signature: signature.to_string(),
        block_time: Some(block_time),
        account_keys: vec![AccountKey {
            pubkey: SENDER.to_string(),
            signer: true,
        }],
        ..Default::default()
    }
}

fn savings_quest(store: &Store, min_amount: f64) -> Quest {
    let mut quest = Quest::new("alice", "Daily savings", VerificationKind::SavingsTransfer);
    quest.wallets = vec![SAVINGS.to_string()];
    quest.token = TokenSelector::Sol;
    quest.min_amount = min_amount;
    store.insert_quest(&quest).unwrap();
    quest
}

fn jupiter_quest(store: &Store, wallets: &[&str]) -> Quest {
    let mut quest = Quest::new("bob", "Swap on Jupiter", VerificationKind::ProtocolInteraction);
    quest.wallets = wallets.iter().map(|w| w.to_string()).collect();
    quest.protocol = Some("jupiter".to_string());
    store.insert_quest(&quest).unwrap();
    quest
}

fn engine_with(ledger: FakeLedger) -> (Arc<Store>, VerifyEngine<FakeLedger>) {
    let store = Arc::new(Store::open_in_memory().unwrap());
    let engine = VerifyEngine::new(
        ledger,
        ProtocolRegistry::builtin(),
        Arc::clone(&store),
        EngineConfig::default(),
    );
    (store, engine)
}

fn noon_today() -> i64 {
    let (start, _) = day_bounds(today_utc());
    start + 12 * 3600
}

#[tokio::test]
async fn test_savings_check_records_completion_and_is_idempotent() {
    let mut ledger = FakeLedger::default();
    // 0.02 SOL into the savings wallet today.
    ledger.add_tx(SAVINGS, sol_tx("sig-1", noon_today(), SAVINGS, 20_000_000));

    let (store, engine) = engine_with(ledger);
    let quest = savings_quest(&store, 0.01);

    let report = engine.check_today(&quest).await.unwrap();
    assert!(report.verified);
    assert!(report.newly_recorded);
    assert_eq!(report.evidence_signature.as_deref(), Some("sig-1"));
    assert!((report.total_sol - 0.02).abs() < 1e-12);

    // Second identical check: zero additional completions.
    let again = engine.check_today(&quest).await.unwrap();
    assert!(again.verified);
    assert!(!again.newly_recorded);

    assert_eq!(store.completed_dates(&quest.id).unwrap().len(), 1);
}

#[tokio::test]
async fn test_savings_below_minimum_is_not_verified() {
    let mut ledger = FakeLedger::default();
    ledger.add_tx(SAVINGS, sol_tx("sig-1", noon_today(), SAVINGS, 5_000_000));

    let (store, engine) = engine_with(ledger);
    let quest = savings_quest(&store, 0.01);

    let report = engine.check_today(&quest).await.unwrap();
    assert!(!report.verified);
    assert!(store.completed_dates(&quest.id).unwrap().is_empty());
}

#[tokio::test]
async fn test_savings_amounts_aggregate_across_transfers() {
    let mut ledger = FakeLedger::default();
    // Neither transfer alone meets the 0.01 minimum; together they do.
    ledger.add_tx(SAVINGS, sol_tx("sig-1", noon_today(), SAVINGS, 4_000_000));
    ledger.add_tx(SAVINGS, sol_tx("sig-2", noon_today() + 60, SAVINGS, 8_000_000));

    let (store, engine) = engine_with(ledger);
    let quest = savings_quest(&store, 0.01);

    let report = engine.check_today(&quest).await.unwrap();
    assert!(report.verified);
    assert!((report.total_sol - 0.012).abs() < 1e-12);
    assert_eq!(store.completed_dates(&quest.id).unwrap().len(), 1);
}

#[tokio::test]
async fn test_first_satisfying_wallet_wins() {
    let wallet_a = "WalletA1111111111111111111111111";
    let wallet_b = "WalletB1111111111111111111111111";

    let mut ledger = FakeLedger::default();
    // Wallet A has unrelated activity today, wallet B touched Jupiter.
    ledger.add_tx(wallet_a, plain_tx("sig-a", noon_today()));
    ledger.add_tx(wallet_b, jupiter_tx("sig-b", noon_today()));

    let (store, engine) = engine_with(ledger);
    let quest = jupiter_quest(&store, &[wallet_a, wallet_b]);

    let report = engine.check_today(&quest).await.unwrap();
    assert!(report.verified);
    assert_eq!(report.wallet.as_deref(), Some(wallet_b));
    assert_eq!(report.evidence_signature.as_deref(), Some("sig-b"));
    assert_eq!(store.completed_dates(&quest.id).unwrap().len(), 1);
}

#[tokio::test]
async fn test_wallet_listing_failure_does_not_abort_other_wallets() {
    let wallet_a = "WalletA1111111111111111111111111";
    let wallet_b = "WalletB1111111111111111111111111";

    let mut ledger = FakeLedger::default();
    ledger.fail_address(wallet_a);
    ledger.add_tx(wallet_b, jupiter_tx("sig-b", noon_today()));

    let (store, engine) = engine_with(ledger);
    let quest = jupiter_quest(&store, &[wallet_a, wallet_b]);

    let report = engine.check_today(&quest).await.unwrap();
    assert!(report.verified);
    assert_eq!(report.wallet.as_deref(), Some(wallet_b));
    assert_eq!(store.completed_dates(&quest.id).unwrap().len(), 1);
}

#[tokio::test]
async fn test_no_match_is_neutral_not_an_error() {
    let mut ledger = FakeLedger::default();
    ledger.add_tx(SAVINGS, plain_tx("sig-1", noon_today()));

    let (store, engine) = engine_with(ledger);
    let quest = savings_quest(&store, 0.0);

    let report = engine.check_today(&quest).await.unwrap();
    assert!(!report.verified);
    assert_eq!(report.signatures_checked, 1);
    assert!(store.completed_dates(&quest.id).unwrap().is_empty());
}

#[tokio::test]
async fn test_backfill_skips_already_recorded_days() {
    let today = today_utc();
    let (today_start, _) = day_bounds(today);

    let mut ledger = FakeLedger::default();
    // Five distinct days of qualifying transfers, newest day first.
    for offset in 0..5u32 {
        let block_time = today_start - i64::from(offset) * 86_400 + 3600;
        ledger.add_tx(
            SAVINGS,
            sol_tx(&format!("sig-{offset}"), block_time, SAVINGS, 50_000_000),
        );
    }

    let (store, engine) = engine_with(ledger);
    let quest = savings_quest(&store, 0.01);

    // Two of the five days are already recorded.
    let recorded: Vec<NewCompletion> = [1u64, 3]
        .into_iter()
        .map(|offset| NewCompletion {
            quest_id: quest.id.clone(),
            date: today - chrono::Days::new(offset),
            auto_verified: true,
            tx_signature: None,
        })
        .collect();
    assert_eq!(store.insert_completions(&recorded).unwrap(), 2);

    let report = engine.backfill(&quest).await.unwrap();
    assert_eq!(report.days_found.len(), 5);
    assert_eq!(report.inserted, 3);
    assert_eq!(report.already_recorded, 2);
    assert_eq!(store.completed_dates(&quest.id).unwrap().len(), 5);
}

#[tokio::test]
async fn test_backfill_and_check_today_overlap_stays_unique() {
    let mut ledger = FakeLedger::default();
    ledger.add_tx(SAVINGS, sol_tx("sig-1", noon_today(), SAVINGS, 20_000_000));

    let (store, engine) = engine_with(ledger);
    let quest = savings_quest(&store, 0.0);

    let backfill = engine.backfill(&quest).await.unwrap();
    assert_eq!(backfill.inserted, 1);

    // Overlapping real-time check: same day, no second completion.
    let check = engine.check_today(&quest).await.unwrap();
    assert!(check.verified);
    assert!(!check.newly_recorded);

    let rerun = engine.backfill(&quest).await.unwrap();
    assert_eq!(rerun.inserted, 0);
    assert_eq!(rerun.already_recorded, 1);

    assert_eq!(store.completed_dates(&quest.id).unwrap().len(), 1);
}

#[tokio::test]
async fn test_backfill_buckets_multiple_days_for_protocol_quest() {
    let wallet = "WalletA1111111111111111111111111";
    let today = today_utc();
    let (today_start, _) = day_bounds(today);

    let mut ledger = FakeLedger::default();
    ledger.add_tx(wallet, jupiter_tx("sig-0", today_start + 600));
    ledger.add_tx(wallet, jupiter_tx("sig-1", today_start - 86_400 + 600));
    // Unrelated traffic on a third day must not produce a completion.
    ledger.add_tx(wallet, plain_tx("sig-2", today_start - 2 * 86_400 + 600));

    let (store, engine) = engine_with(ledger);
    let quest = jupiter_quest(&store, &[wallet]);

    let report = engine.backfill(&quest).await.unwrap();
    assert_eq!(report.days_found.len(), 2);
    assert_eq!(report.inserted, 2);

    let dates = store.completed_dates(&quest.id).unwrap();
    assert!(dates.contains(&today));
    assert!(dates.contains(&(today - chrono::Days::new(1))));
    assert!(!dates.contains(&(today - chrono::Days::new(2))));
}

#[tokio::test]
async fn test_manual_quest_is_rejected() {
    let (store, engine) = engine_with(FakeLedger::default());
    let quest = Quest::new("carol", "Stretch", VerificationKind::Manual);
    store.insert_quest(&quest).unwrap();

    let err = engine.check_today(&quest).await.unwrap_err();
    assert!(matches!(err, VigilError::NotAutoVerifiable(_)));
}

#[tokio::test]
async fn test_transactions_from_yesterday_do_not_count_today() {
    let (today_start, _) = day_bounds(today_utc());

    let mut ledger = FakeLedger::default();
    // One second before the UTC day boundary.
    ledger.add_tx(SAVINGS, sol_tx("sig-old", today_start - 1, SAVINGS, 50_000_000));

    let (store, engine) = engine_with(ledger);
    let quest = savings_quest(&store, 0.0);

    let report = engine.check_today(&quest).await.unwrap();
    assert!(!report.verified);
    assert!(store.completed_dates(&quest.id).unwrap().is_empty());
}
