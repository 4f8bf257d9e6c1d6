//! Group expiry sweeper.
//!
//! Periodically closes forming groups whose window has elapsed. Each group is
//! processed in its own transaction, so one group's failure cannot roll back
//! or abort the rest of the sweep; the sweep itself never returns an error.
//! The loop carries an explicit stop signal so shutdown leaves no orphaned
//! task behind, and [`sweep_once`] takes the current time as a parameter so
//! tests can drive it without a wall clock.

use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tokio::sync::watch;
use tracing::{debug, error, info};

use crate::domain::GroupStatus;
use crate::notify::Notifier;
use crate::settlement::{self, FinalizeOutcome};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: usize,
    pub finalized: usize,
    pub expired: usize,
    pub failed: usize,
}

/// Run the sweeper until the stop channel fires.
pub async fn run(
    pool: SqlitePool,
    notifier: Notifier,
    period: Duration,
    mut stop: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    info!(period_secs = period.as_secs(), "expiry sweeper started");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = sweep_once(&pool, &notifier, Utc::now()).await;
                if report.scanned > 0 {
                    info!(
                        scanned = report.scanned,
                        finalized = report.finalized,
                        expired = report.expired,
                        failed = report.failed,
                        "expiry sweep finished"
                    );
                }
            }
            _ = stop.changed() => {
                info!("expiry sweeper stopping");
                break;
            }
        }
    }
}

/// Scan forming groups past their expiry and close each one. Errors are
/// logged per group and counted in the report, never propagated.
pub async fn sweep_once(pool: &SqlitePool, notifier: &Notifier, now: DateTime<Utc>) -> SweepReport {
    let mut report = SweepReport::default();

    let stale: Vec<(i64, i64)> = match sqlx::query_as(
        "SELECT id, leader_id FROM group_orders WHERE status = ? AND expires_at <= ?",
    )
    .bind(GroupStatus::Forming)
    .bind(now)
    .fetch_all(pool)
    .await
    {
        Ok(rows) => rows,
        Err(error) => {
            error!(%error, "expiry sweep could not list stale groups");
            return report;
        }
    };

    report.scanned = stale.len();
    for (group_id, leader_id) in stale {
        match settlement::finalize(pool, group_id, now).await {
            Ok(outcome) => {
                match &outcome {
                    FinalizeOutcome::Finalized { .. } => report.finalized += 1,
                    FinalizeOutcome::Expired { .. } => report.expired += 1,
                    FinalizeOutcome::AlreadyClosed { status } => {
                        // Raced with an API-triggered finalize; nothing left to do.
                        debug!(group_id, status = ?status, "group closed concurrently");
                    }
                }
                notifier.announce_close(leader_id, &outcome).await;
            }
            Err(error) => {
                report.failed += 1;
                error!(group_id, %error, "failed to close expired group");
            }
        }
    }
    report
}
