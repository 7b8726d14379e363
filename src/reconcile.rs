//! Completion reconciliation
//!
//! Turns day aggregates into the minimal set of new completions: one per
//! satisfying day not already recorded. Idempotent by construction - the
//! same aggregates diffed against the same existing dates always produce
//! the same (possibly empty) set, so repeated checks and overlapping
//! backfills are safe. The store's unique constraint backs this up across
//! process boundaries.

use std::collections::{BTreeMap, HashSet};

use chrono::NaiveDate;

use crate::aggregate::DayAggregate;
use crate::quest::NewCompletion;

/// Diff satisfying days against already-recorded dates.
///
/// Emits exactly one completion per day whose aggregate satisfies
/// `threshold` and whose date is absent from `existing`. Output is sorted
/// by date (BTreeMap order) and contains no duplicates.
pub fn reconcile<F>(
    quest_id: &str,
    aggregates: &BTreeMap<NaiveDate, DayAggregate>,
    existing: &HashSet<NaiveDate>,
    threshold: F,
) -> Vec<NewCompletion>
where
    F: Fn(&DayAggregate) -> bool,
{
    aggregates
        .iter()
        .filter(|(date, aggregate)| threshold(aggregate) && !existing.contains(date))
        .map(|(date, aggregate)| NewCompletion {
            quest_id: quest_id.to_string(),
            date: *date,
            auto_verified: true,
            tx_signature: aggregate.first_matching_signature.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    fn aggregate(sol: f64, signature: &str) -> DayAggregate {
        DayAggregate {
            match_count: 1,
            total_sol: sol,
            first_matching_signature: Some(signature.to_string()),
            tx_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_existing_dates_are_skipped() {
        let mut aggregates = BTreeMap::new();
        for d in 1..=5 {
            aggregates.insert(date(d), aggregate(1.0, &format!("sig-{d}")));
        }
        let existing: HashSet<NaiveDate> = [date(2), date(4)].into_iter().collect();

        let fresh = reconcile("quest-1", &aggregates, &existing, |a| a.total_sol > 0.0);

        assert_eq!(fresh.len(), 3);
        let dates: Vec<NaiveDate> = fresh.iter().map(|c| c.date).collect();
        assert_eq!(dates, vec![date(1), date(3), date(5)]);
        assert!(fresh.iter().all(|c| c.auto_verified));
    }

    #[test]
    fn test_threshold_filters_days() {
        let mut aggregates = BTreeMap::new();
        aggregates.insert(date(1), aggregate(0.005, "sig-1"));
        aggregates.insert(date(2), aggregate(0.02, "sig-2"));

        let fresh = reconcile("quest-1", &aggregates, &HashSet::new(), |a| {
            a.total_sol >= 0.01
        });

        assert_eq!(fresh.len(), 1);
        assert_eq!(fresh[0].date, date(2));
        assert_eq!(fresh[0].tx_signature.as_deref(), Some("sig-2"));
    }

    #[test]
    fn test_empty_aggregates_produce_nothing() {
        let fresh = reconcile("quest-1", &BTreeMap::new(), &HashSet::new(), |_| true);
        assert!(fresh.is_empty());
    }

    #[test]
    fn test_reconcile_is_idempotent_against_its_own_output() {
        let mut aggregates = BTreeMap::new();
        aggregates.insert(date(1), aggregate(1.0, "sig-1"));

        let first = reconcile("quest-1", &aggregates, &HashSet::new(), |_| true);
        let recorded: HashSet<NaiveDate> = first.iter().map(|c| c.date).collect();
        let second = reconcile("quest-1", &aggregates, &recorded, |_| true);

        assert_eq!(first.len(), 1);
        assert!(second.is_empty());
    }
}
