//! Day-window aggregation
//!
//! Completion granularity is the UTC calendar day: a transaction belongs to
//! day D when its block time falls within [D 00:00:00, D 23:59:59]
//! inclusive. Everything here is pure; the engine owns fetching.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};

use crate::classify::TxMatch;
use crate::ledger::LedgerTransaction;

/// Seconds in one UTC day.
const DAY_SECONDS: i64 = 86_400;

/// Per-day reduction of a wallet's classified transactions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DayAggregate {
    /// Matching transfers / interactions this day.
    pub match_count: u32,
    pub total_sol: f64,
    pub total_usdc: f64,
    /// Evidence: the first matching signature seen (newest first in
    /// check-today order, fetch order in backfill).
    pub first_matching_signature: Option<String>,
    /// All transactions inspected this day, matching or not.
    pub tx_count: u32,
}

impl DayAggregate {
    fn absorb(&mut self, signature: &str, matched: &TxMatch) {
        self.tx_count += 1;
        if matched.is_match() {
            self.match_count += matched.hits;
            self.total_sol += matched.sol;
            self.total_usdc += matched.usdc;
            if self.first_matching_signature.is_none() {
                self.first_matching_signature = Some(signature.to_string());
            }
        }
    }
}

/// The UTC calendar day a block time falls on. `None` when the upstream
/// omitted the block time - such transactions cannot be bucketed.
pub fn utc_day_of(block_time: Option<i64>) -> Option<NaiveDate> {
    block_time
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0))
        .map(|dt| dt.date_naive())
}

/// Inclusive [start, end] unix-second bounds of a UTC day.
pub fn day_bounds(date: NaiveDate) -> (i64, i64) {
    let start = date
        .and_hms_opt(0, 0, 0)
        .expect("midnight exists for every date")
        .and_utc()
        .timestamp();
    (start, start + DAY_SECONDS - 1)
}

/// The current UTC date.
pub fn today_utc() -> NaiveDate {
    Utc::now().date_naive()
}

/// Group classified transactions into UTC day buckets.
///
/// Transactions without a block time are discarded. The classifier runs
/// once per transaction; the per-day reduction keeps match counts, token
/// totals, and the first matching signature as evidence.
pub fn bucketize<'a, I, F>(transactions: I, mut classify: F) -> BTreeMap<NaiveDate, DayAggregate>
where
    I: IntoIterator<Item = &'a LedgerTransaction>,
    F: FnMut(&LedgerTransaction) -> TxMatch,
{
    let mut buckets: BTreeMap<NaiveDate, DayAggregate> = BTreeMap::new();

    for tx in transactions {
        let Some(day) = utc_day_of(tx.block_time) else {
            continue;
        };
        let matched = classify(tx);
        buckets
            .entry(day)
            .or_default()
            .absorb(&tx.signature, &matched);
    }

    buckets
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(signature: &str, block_time: i64) -> LedgerTransaction {
        LedgerTransaction {
            signature: signature.to_string(),
            block_time: Some(block_time),
            ..Default::default()
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_day_boundaries_are_inclusive() {
        // 2024-05-01 00:00:00Z
        let day = date(2024, 5, 1);
        let (start, end) = day_bounds(day);

        assert_eq!(utc_day_of(Some(start)), Some(day));
        assert_eq!(utc_day_of(Some(end)), Some(day));
        assert_eq!(utc_day_of(Some(end + 1)), Some(date(2024, 5, 2)));
        assert_eq!(end - start, 86_399);
    }

    #[test]
    fn test_missing_block_time_is_discarded() {
        let mut no_time = tx("sig-a", 0);
        no_time.block_time = None;

        let buckets = bucketize([&no_time], |_| TxMatch {
            hits: 1,
            ..Default::default()
        });
        assert!(buckets.is_empty());
    }

    #[test]
    fn test_bucketize_groups_by_utc_day() {
        let (start, _) = day_bounds(date(2024, 5, 1));
        let a = tx("sig-a", start);
        let b = tx("sig-b", start + 3600);
        let c = tx("sig-c", start + DAY_SECONDS); // next day

        let buckets = bucketize([&a, &b, &c], |_| TxMatch {
            sol: 0.01,
            hits: 1,
            ..Default::default()
        });

        assert_eq!(buckets.len(), 2);
        let day_one = &buckets[&date(2024, 5, 1)];
        assert_eq!(day_one.match_count, 2);
        assert!((day_one.total_sol - 0.02).abs() < 1e-12);
        assert_eq!(day_one.first_matching_signature.as_deref(), Some("sig-a"));

        let day_two = &buckets[&date(2024, 5, 2)];
        assert_eq!(day_two.match_count, 1);
    }

    #[test]
    fn test_non_matching_transactions_count_only_traffic() {
        let (start, _) = day_bounds(date(2024, 5, 1));
        let a = tx("sig-a", start);

        let buckets = bucketize([&a], |_| TxMatch::default());
        let day = &buckets[&date(2024, 5, 1)];
        assert_eq!(day.tx_count, 1);
        assert_eq!(day.match_count, 0);
        assert!(day.first_matching_signature.is_none());
    }

    #[test]
    fn test_first_matching_signature_skips_non_matches() {
        let (start, _) = day_bounds(date(2024, 5, 1));
        let a = tx("sig-a", start);
        let b = tx("sig-b", start + 60);

        let buckets = bucketize([&a, &b], |tx| {
            if tx.signature == "sig-b" {
                TxMatch {
                    usdc: 5.0,
                    hits: 1,
                    ..Default::default()
                }
            } else {
                TxMatch::default()
            }
        });

        let day = &buckets[&date(2024, 5, 1)];
        assert_eq!(day.first_matching_signature.as_deref(), Some("sig-b"));
    }
}
