//! Verification orchestrator
//!
//! Drives the pipeline per quest: fetch signatures, classify transaction
//! details, aggregate into UTC day buckets, reconcile against recorded
//! completions, persist. Two modes:
//!
//! - **check today**: current UTC day only, candidate wallets tried in
//!   order, first satisfying wallet wins and the rest are not probed.
//! - **backfill**: the full fetched signature window for the primary
//!   wallet, potentially many completions in one call.
//!
//! Failure containment: one transaction failing to fetch contributes
//! nothing and processing continues; a wallet whose signature listing fails
//! aborts only that wallet. Nothing is persisted until a day's full
//! aggregate is known, so an abandoned invocation leaves no partial state.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::aggregate::{bucketize, day_bounds, today_utc, DayAggregate};
use crate::classify::{classify, QuestRule, SavingsRule};
use crate::ledger::{LedgerApi, LedgerTransaction, SignatureInfo};
use crate::quest::{Quest, VerificationKind};
use crate::reconcile::reconcile;
use crate::registry::{ProtocolIdentifierSet, ProtocolRegistry};
use crate::store::Store;
use crate::types::{Result, VigilError};

/// Engine tuning knobs.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Signature page size per address (the upstream caps pages itself).
    pub signature_limit: usize,
    /// Concurrent transaction-detail fetches per invocation. Small and
    /// fixed to respect the upstream's rate limits.
    pub fetch_concurrency: usize,
    /// Backfill cap on detail fetches per day for protocol quests, where
    /// one match is enough and full-day scans waste the rate budget.
    pub backfill_tx_per_day: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            signature_limit: 200,
            fetch_concurrency: 5,
            backfill_tx_per_day: 10,
        }
    }
}

/// Pipeline phase, for tracing a check invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Fetching,
    Classifying,
    Reconciling,
    Persisted,
    Failed,
}

/// Outcome of a "check today" invocation.
#[derive(Debug, Clone)]
pub struct CheckReport {
    pub quest_id: String,
    pub date: NaiveDate,
    /// Whether the quest is satisfied for `date`.
    pub verified: bool,
    /// Whether this invocation inserted the completion (false when it was
    /// already recorded, or when not verified).
    pub newly_recorded: bool,
    /// The wallet that satisfied the quest.
    pub wallet: Option<String>,
    pub evidence_signature: Option<String>,
    pub total_sol: f64,
    pub total_usdc: f64,
    pub match_count: u32,
    pub signatures_checked: usize,
}

impl CheckReport {
    fn not_yet(quest_id: &str, date: NaiveDate) -> Self {
        Self {
            quest_id: quest_id.to_string(),
            date,
            verified: false,
            newly_recorded: false,
            wallet: None,
            evidence_signature: None,
            total_sol: 0.0,
            total_usdc: 0.0,
            match_count: 0,
            signatures_checked: 0,
        }
    }
}

/// Outcome of a backfill invocation.
#[derive(Debug, Clone)]
pub struct BackfillReport {
    pub quest_id: String,
    pub wallet: String,
    /// Days in the fetched window that satisfy the quest.
    pub days_found: Vec<NaiveDate>,
    pub inserted: usize,
    pub already_recorded: usize,
    pub signatures_checked: usize,
}

/// The verification engine. Generic over [`LedgerApi`] so tests can run the
/// whole pipeline against a fake ledger.
pub struct VerifyEngine<L: LedgerApi> {
    ledger: L,
    registry: ProtocolRegistry,
    store: Arc<Store>,
    config: EngineConfig,
}

impl<L: LedgerApi> VerifyEngine<L> {
    pub fn new(ledger: L, registry: ProtocolRegistry, store: Arc<Store>, config: EngineConfig) -> Self {
        Self {
            ledger,
            registry,
            store,
            config,
        }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Check the current UTC day for one quest.
    ///
    /// Candidate wallets are "any of these" semantics: tried in order,
    /// first satisfying wallet wins.
    pub async fn check_today(&self, quest: &Quest) -> Result<CheckReport> {
        self.require_auto_verifiable(quest)?;
        let mut phase = Phase::Idle;

        let today = today_utc();
        let (day_start, day_end) = day_bounds(today);

        let existing = self.store.completed_dates(&quest.id)?;
        if existing.contains(&today) {
            debug!(quest_id = %quest.id, date = %today, "Already completed today; skipping ledger check");
            let mut report = CheckReport::not_yet(&quest.id, today);
            report.verified = true;
            return Ok(report);
        }

        let identifiers = self.identifiers_for(quest);
        let mut best = CheckReport::not_yet(&quest.id, today);
        let mut checked_any_wallet = false;
        let mut last_listing_error = None;

        for wallet in &quest.wallets {
            if wallet.trim().is_empty() {
                continue;
            }

            advance(&mut phase, Phase::Fetching, &quest.id);
            let (window, token_account) = match self
                .today_window_for_wallet(quest, wallet, day_start, day_end)
                .await
            {
                Ok(window) => window,
                Err(e) => {
                    // Listing failed: this wallet's check is aborted, the
                    // remaining candidates still get their turn.
                    warn!(quest_id = %quest.id, wallet = %wallet, error = %e, "Signature listing failed for wallet");
                    last_listing_error = Some(e);
                    continue;
                }
            };
            checked_any_wallet = true;

            advance(&mut phase, Phase::Classifying, &quest.id);
            let transactions = self.fetch_transactions(&window).await;
            let rule = self.rule_for(quest, wallet, token_account.as_deref(), &identifiers);
            let buckets = bucketize(transactions.iter(), |tx| classify(tx, &rule));
            let aggregate = buckets.get(&today).cloned().unwrap_or_default();

            debug!(
                quest_id = %quest.id,
                wallet = %wallet,
                signatures = window.len(),
                matches = aggregate.match_count,
                sol = aggregate.total_sol,
                usdc = aggregate.total_usdc,
                "Classified today's transactions"
            );

            if self.day_satisfies(quest, &aggregate) {
                advance(&mut phase, Phase::Reconciling, &quest.id);
                let mut day_buckets = BTreeMap::new();
                day_buckets.insert(today, aggregate.clone());
                let fresh = reconcile(&quest.id, &day_buckets, &existing, |a| {
                    self.day_satisfies(quest, a)
                });
                let inserted = self.store.insert_completions(&fresh)?;
                advance(&mut phase, Phase::Persisted, &quest.id);

                info!(
                    quest_id = %quest.id,
                    wallet = %wallet,
                    date = %today,
                    inserted = inserted,
                    "Quest verified"
                );

                return Ok(CheckReport {
                    quest_id: quest.id.clone(),
                    date: today,
                    verified: true,
                    newly_recorded: inserted > 0,
                    wallet: Some(wallet.clone()),
                    evidence_signature: aggregate.first_matching_signature.clone(),
                    total_sol: aggregate.total_sol,
                    total_usdc: aggregate.total_usdc,
                    match_count: aggregate.match_count,
                    signatures_checked: window.len(),
                });
            }

            // Keep the most informative non-match for the "not yet" report.
            best.signatures_checked += window.len();
            if aggregate.match_count >= best.match_count {
                best.match_count = aggregate.match_count;
                best.total_sol = aggregate.total_sol;
                best.total_usdc = aggregate.total_usdc;
            }
        }

        // Every wallet's listing failed: that is an outage, not a "not
        // yet" - absence of evidence must come from actually looking.
        if !checked_any_wallet {
            if let Some(e) = last_listing_error {
                advance(&mut phase, Phase::Failed, &quest.id);
                return Err(e);
            }
        }

        // NoMatch is a legitimate outcome, not an error.
        Ok(best)
    }

    /// Reconcile the full fetched history for the quest's primary wallet.
    pub async fn backfill(&self, quest: &Quest) -> Result<BackfillReport> {
        self.require_auto_verifiable(quest)?;
        let mut phase = Phase::Idle;

        let wallet = quest
            .wallets
            .iter()
            .find(|w| !w.trim().is_empty())
            .cloned()
            .ok_or_else(|| VigilError::InvalidQuest("quest has no wallets".into()))?;

        advance(&mut phase, Phase::Fetching, &quest.id);
        let token_account = self.savings_token_account(quest, &wallet).await;
        let mut addresses = vec![wallet.clone()];
        addresses.extend(token_account.clone());

        let mut signatures = Vec::new();
        for address in &addresses {
            match self
                .ledger
                .list_signatures(address, self.config.signature_limit)
                .await
            {
                Ok(mut page) => signatures.append(&mut page),
                Err(e) => {
                    if addresses.len() == 1 || address == &wallet {
                        advance(&mut phase, Phase::Failed, &quest.id);
                        return Err(e);
                    }
                    // Token-account page is best-effort on top of the
                    // primary wallet's history.
                    warn!(quest_id = %quest.id, address = %address, error = %e, "Signature listing failed for auxiliary address");
                }
            }
        }

        let signatures = dedupe_signatures(signatures);
        let capped = self.cap_per_day(quest, signatures);

        advance(&mut phase, Phase::Classifying, &quest.id);
        let transactions = self.fetch_transactions(&capped).await;
        let identifiers = self.identifiers_for(quest);
        let rule = self.rule_for(quest, &wallet, token_account.as_deref(), &identifiers);
        let buckets = bucketize(transactions.iter(), |tx| classify(tx, &rule));

        let days_found: Vec<NaiveDate> = buckets
            .iter()
            .filter(|(_, aggregate)| self.day_satisfies(quest, aggregate))
            .map(|(date, _)| *date)
            .collect();

        advance(&mut phase, Phase::Reconciling, &quest.id);
        let existing = self.store.completed_dates(&quest.id)?;
        let fresh = reconcile(&quest.id, &buckets, &existing, |a| {
            self.day_satisfies(quest, a)
        });
        let inserted = self.store.insert_completions(&fresh)?;
        advance(&mut phase, Phase::Persisted, &quest.id);

        info!(
            quest_id = %quest.id,
            wallet = %wallet,
            days_found = days_found.len(),
            inserted = inserted,
            "Backfill complete"
        );

        Ok(BackfillReport {
            quest_id: quest.id.clone(),
            wallet,
            already_recorded: days_found.len().saturating_sub(fresh.len()),
            days_found,
            inserted,
            signatures_checked: capped.len(),
        })
    }

    fn require_auto_verifiable(&self, quest: &Quest) -> Result<()> {
        quest.validate()?;
        if !quest.is_auto_verifiable() {
            return Err(VigilError::NotAutoVerifiable(quest.id.clone()));
        }
        Ok(())
    }

    /// Identifier set for a protocol quest: the quest's own custom set, or
    /// the registry entry (empty for unknown names - never an error).
    fn identifiers_for(&self, quest: &Quest) -> ProtocolIdentifierSet {
        if let Some(custom) = &quest.custom_identifiers {
            return custom.clone();
        }
        quest
            .protocol
            .as_deref()
            .map(|name| self.registry.identifiers_for(name))
            .unwrap_or_default()
    }

    fn rule_for<'a>(
        &self,
        quest: &'a Quest,
        wallet: &'a str,
        token_account: Option<&'a str>,
        identifiers: &'a ProtocolIdentifierSet,
    ) -> QuestRule<'a> {
        match quest.kind {
            VerificationKind::SavingsTransfer => QuestRule::Savings(SavingsRule {
                destination: wallet,
                destination_token_account: token_account,
                source: quest.source_wallet.as_deref(),
                token: quest.token,
            }),
            _ => QuestRule::Protocol(identifiers),
        }
    }

    fn day_satisfies(&self, quest: &Quest, aggregate: &DayAggregate) -> bool {
        match quest.kind {
            VerificationKind::SavingsTransfer => {
                let min = quest.min_amount;
                let sol_ok = quest.token.counts_sol()
                    && aggregate.total_sol > 0.0
                    && aggregate.total_sol >= min;
                let usdc_ok = quest.token.counts_usdc()
                    && aggregate.total_usdc > 0.0
                    && aggregate.total_usdc >= min;
                sol_ok || usdc_ok
            }
            VerificationKind::ProtocolInteraction => {
                let required = if quest.min_amount > 1.0 {
                    quest.min_amount.ceil() as u32
                } else {
                    1
                };
                aggregate.match_count >= required
            }
            VerificationKind::Manual => false,
        }
    }

    /// The wallet's USDC token account, for savings quests that count USDC.
    /// Lookup failures degrade to "no token account" - the wallet's own
    /// signature page still gets checked.
    async fn savings_token_account(&self, quest: &Quest, wallet: &str) -> Option<String> {
        if quest.kind != VerificationKind::SavingsTransfer || !quest.token.counts_usdc() {
            return None;
        }
        match self.ledger.usdc_token_account(wallet).await {
            Ok(account) => account,
            Err(e) => {
                warn!(wallet = %wallet, error = %e, "USDC token account lookup failed");
                None
            }
        }
    }

    /// Today's signature window for one candidate wallet (plus its USDC
    /// token account for savings quests), deduped, newest first.
    async fn today_window_for_wallet(
        &self,
        quest: &Quest,
        wallet: &str,
        day_start: i64,
        day_end: i64,
    ) -> Result<(Vec<SignatureInfo>, Option<String>)> {
        let token_account = self.savings_token_account(quest, wallet).await;

        let mut window = Vec::new();
        let mut addresses = vec![wallet.to_string()];
        addresses.extend(token_account.clone());

        for (i, address) in addresses.iter().enumerate() {
            let page = match self
                .ledger
                .list_signatures(address, self.config.signature_limit)
                .await
            {
                Ok(page) => page,
                Err(e) if i > 0 => {
                    warn!(address = %address, error = %e, "Signature listing failed for auxiliary address");
                    continue;
                }
                Err(e) => return Err(e),
            };

            // Newest first: everything past the day boundary is history we
            // do not need, so stop early.
            for sig in page {
                match sig.block_time {
                    Some(t) if t < day_start => break,
                    Some(t) if t <= day_end => window.push(sig),
                    _ => {}
                }
            }
        }

        Ok((dedupe_signatures(window), token_account))
    }

    /// Fetch transaction details with a bounded, ordered concurrency
    /// window. Fetch failures and malformed responses contribute nothing.
    async fn fetch_transactions(&self, signatures: &[SignatureInfo]) -> Vec<LedgerTransaction> {
        let concurrency = self.config.fetch_concurrency.max(1);

        stream::iter(signatures.iter().cloned())
            .map(|sig| async move {
                match self.ledger.get_transaction(&sig.signature).await {
                    Ok(Some(mut tx)) => {
                        // The signature listing is the fallback clock when
                        // the detail response lacks a block time.
                        tx.block_time = tx.block_time.or(sig.block_time);
                        Some(tx)
                    }
                    Ok(None) => None,
                    Err(e) => {
                        warn!(signature = %sig.signature, error = %e, "Transaction fetch failed; skipping");
                        None
                    }
                }
            })
            .buffered(concurrency)
            .collect::<Vec<_>>()
            .await
            .into_iter()
            .flatten()
            .collect()
    }

    /// Cap detail fetches per day for protocol backfills, where one match
    /// per day suffices. Savings backfills keep every signature because
    /// daily amounts must be summed.
    fn cap_per_day(&self, quest: &Quest, signatures: Vec<SignatureInfo>) -> Vec<SignatureInfo> {
        if quest.kind != VerificationKind::ProtocolInteraction {
            return signatures;
        }

        let cap = self.config.backfill_tx_per_day.max(1);
        let mut per_day: BTreeMap<NaiveDate, usize> = BTreeMap::new();
        let mut kept = Vec::with_capacity(signatures.len());
        let mut dropped = 0usize;

        for sig in signatures {
            let Some(day) = crate::aggregate::utc_day_of(sig.block_time) else {
                continue;
            };
            let count = per_day.entry(day).or_insert(0);
            if *count < cap {
                *count += 1;
                kept.push(sig);
            } else {
                dropped += 1;
            }
        }

        if dropped > 0 {
            debug!(
                quest_id = %quest.id,
                dropped = dropped,
                cap = cap,
                "Capped backfill detail fetches per day"
            );
        }

        kept
    }
}

fn advance(phase: &mut Phase, next: Phase, quest_id: &str) {
    debug!(quest_id = %quest_id, from = ?phase, to = ?next, "Check phase");
    *phase = next;
}

/// Drop repeated signatures across address pages, keeping first occurrence
/// order.
fn dedupe_signatures(signatures: Vec<SignatureInfo>) -> Vec<SignatureInfo> {
    let mut seen = HashSet::new();
    signatures
        .into_iter()
        .filter(|sig| seen.insert(sig.signature.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedupe_keeps_first_occurrence() {
        let sigs = vec![
            SignatureInfo {
                signature: "a".to_string(),
                block_time: Some(1),
            },
            SignatureInfo {
                signature: "b".to_string(),
                block_time: Some(2),
            },
            SignatureInfo {
                signature: "a".to_string(),
                block_time: Some(3),
            },
        ];

        let deduped = dedupe_signatures(sigs);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].signature, "a");
        assert_eq!(deduped[0].block_time, Some(1));
    }

    #[test]
    fn test_engine_config_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.signature_limit, 200);
        assert_eq!(config.fetch_concurrency, 5);
        assert_eq!(config.backfill_tx_per_day, 10);
    }
}
