//! Scheduled verification sweeps
//!
//! The daemon loop behind `vigil run`: every interval, check today for
//! every auto-verifiable quest. Quests already completed today are a cheap
//! store lookup inside the engine, so repeated sweeps within one UTC day
//! cost almost nothing. Per-quest failures are logged and never abort the
//! sweep - the next interval retries naturally.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::engine::VerifyEngine;
use crate::ledger::LedgerApi;

/// Run verification sweeps forever. The first sweep starts immediately.
pub async fn run_verify_loop<L: LedgerApi>(engine: Arc<VerifyEngine<L>>, interval_secs: u64) {
    let interval = Duration::from_secs(interval_secs.max(30));

    info!(
        interval_secs = interval.as_secs(),
        "Starting verification loop"
    );

    loop {
        sweep(&engine).await;
        tokio::time::sleep(interval).await;
    }
}

/// One pass over every auto-verifiable quest.
pub async fn sweep<L: LedgerApi>(engine: &VerifyEngine<L>) {
    let quests = match engine.store().list_auto_verifiable() {
        Ok(quests) => quests,
        Err(e) => {
            error!(error = %e, "Failed to list quests for sweep");
            return;
        }
    };

    debug!(count = quests.len(), "Sweeping auto-verifiable quests");

    let mut verified = 0;
    for quest in &quests {
        match engine.check_today(quest).await {
            Ok(report) if report.newly_recorded => {
                verified += 1;
                info!(
                    quest_id = %quest.id,
                    title = %quest.title,
                    date = %report.date,
                    wallet = report.wallet.as_deref().unwrap_or("-"),
                    "Quest auto-verified"
                );
            }
            Ok(report) if report.verified => {
                debug!(quest_id = %quest.id, "Already completed today");
            }
            Ok(report) => {
                debug!(
                    quest_id = %quest.id,
                    signatures = report.signatures_checked,
                    "Not yet satisfied today"
                );
            }
            Err(e) => {
                warn!(quest_id = %quest.id, error = %e, "Quest check failed; will retry next sweep");
            }
        }
    }

    if verified > 0 {
        info!(verified = verified, total = quests.len(), "Sweep complete");
    } else {
        debug!(total = quests.len(), "Sweep complete, nothing new");
    }
}
