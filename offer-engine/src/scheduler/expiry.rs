use super::report::{SweepKind, SweepReport, SweepResult};
use crate::core::clock::SharedClock;
use crate::core::config::NegotiationPolicy;
use crate::core::error::ServiceResult;
use crate::core::tasks::panic_message;
use crate::db::repository::{archive, job_log, offer};
use crate::db::rollback;
use crate::fanout::FanOut;
use crate::offers::OfferStateMachine;
use crate::reservations::ReservationManager;
use futures::FutureExt;
use serde_json::json;
use shared::error::AppError;
use shared::models::Party;
use shared::notification::{Notification, NotificationKind};
use shared::response::BatchOutcome;
use sqlx::SqlitePool;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Dedup key of the expiry reminder for one offer and one party
pub fn reminder_dedup_key(offer_id: i64, party: Party) -> String {
    format!("offer_expiring:{offer_id}:{}", party.as_str())
}

/// Run one sweep, turning a panic into a failed outcome
async fn isolate<F>(kind: SweepKind, sweep: F) -> SweepResult
where
    F: Future<Output = Option<BatchOutcome>>,
{
    match AssertUnwindSafe(sweep).catch_unwind().await {
        Ok(outcome) => SweepResult { kind, outcome },
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            tracing::error!(target: "alert", sweep = %kind, panic = %message, "Sweep panicked");
            SweepResult {
                kind,
                outcome: Some(BatchOutcome {
                    errors: vec![format!("panicked: {message}")],
                    ..Default::default()
                }),
            }
        }
    }
}

fn saturating_u32(n: u64) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// 到期调度器
///
/// 注册为 `TaskKind::Periodic`，在 `start_background_tasks()` 中启动。
#[derive(Debug, Clone)]
pub struct ExpiryScheduler {
    pool: SqlitePool,
    clock: SharedClock,
    policy: NegotiationPolicy,
    fanout: FanOut,
    offers: OfferStateMachine,
    reservations: ReservationManager,
    interval: Duration,
}

impl ExpiryScheduler {
    pub fn new(
        pool: SqlitePool,
        clock: SharedClock,
        policy: NegotiationPolicy,
        fanout: FanOut,
        offers: OfferStateMachine,
        reservations: ReservationManager,
        interval: Duration,
    ) -> Self {
        Self {
            pool,
            clock,
            policy,
            fanout,
            offers,
            reservations,
            interval,
        }
    }

    /// 主循环：立即执行一次，然后按间隔执行，直到 shutdown
    pub async fn run(self, shutdown: CancellationToken) {
        tracing::info!(interval_secs = self.interval.as_secs(), "Expiry scheduler started");

        loop {
            self.run_once().await;

            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {}
                _ = shutdown.cancelled() => {
                    tracing::info!("Expiry scheduler received shutdown signal");
                    break;
                }
            }
        }

        tracing::info!("Expiry scheduler stopped");
    }

    /// Run all four sweeps concurrently and record each one that ran
    pub async fn run_once(&self) -> SweepReport {
        let started_at = self.clock.now_millis();

        let (offers, reservations, reminders, archive) = tokio::join!(
            isolate(SweepKind::OfferExpiry, async {
                Some(self.offers.process_expired_offers().await)
            }),
            isolate(SweepKind::ReservationExpiry, async {
                Some(self.reservations.process_expired_reservations().await)
            }),
            isolate(SweepKind::ExpiryReminders, async {
                Some(self.send_expiry_reminders().await)
            }),
            isolate(SweepKind::Archive, self.archive_if_due()),
        );

        let report = SweepReport {
            started_at,
            finished_at: self.clock.now_millis(),
            sweeps: vec![offers, reservations, reminders, archive],
        };
        self.persist(&report).await;
        report.log_summary();
        report
    }

    // ========================================================================
    // Reminders
    // ========================================================================

    /// Remind both parties of pending offers expiring within the reminder
    /// window. Read-only; repeats inside the window collapse on the dedup key.
    async fn send_expiry_reminders(&self) -> BatchOutcome {
        let now = self.clock.now_millis();
        let until = now + self.policy.reminder_window_millis();
        let mut outcome = BatchOutcome::default();

        let expiring =
            match offer::find_expiring_pending(&self.pool, now, until, self.policy.sweep_batch_limit).await {
                Ok(rows) => rows,
                Err(e) => {
                    tracing::error!(error = %e, "Failed to load expiring offers");
                    outcome.errors.push(format!("query: {e}"));
                    return outcome;
                }
            };

        for pending in expiring {
            outcome.attempted += 1;
            let kind = NotificationKind::OfferExpiring {
                offer_id: pending.id,
                listing_id: pending.listing_id,
                expires_at: pending.expires_at,
            };
            let queued = self.fanout.notify_all([
                Notification::new(pending.buyer_id, kind.clone())
                    .with_dedup_key(reminder_dedup_key(pending.id, Party::Buyer)),
                Notification::new(pending.seller_id, kind)
                    .with_dedup_key(reminder_dedup_key(pending.id, Party::Seller)),
            ]);
            if queued == 2 {
                outcome.processed += 1;
            } else {
                outcome.errors.push(format!("offer {}: reminder not queued", pending.id));
            }
        }
        outcome
    }

    // ========================================================================
    // Archive
    // ========================================================================

    async fn archive_if_due(&self) -> Option<BatchOutcome> {
        let now = self.clock.now_millis();
        match job_log::last_clean_run_at(&self.pool, SweepKind::Archive.as_str()).await {
            Ok(Some(last)) if now - last < self.policy.archive_interval_millis() => return None,
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "Failed to read last archive run");
                return Some(BatchOutcome {
                    errors: vec![format!("job log: {e}")],
                    ..Default::default()
                });
            }
        }

        let cutoff = now - self.policy.archive_retention_millis();
        let outcome = match self.try_archive(cutoff, now).await {
            Ok((reservations, offers)) => {
                tracing::info!(reservations, offers, cutoff, "Archived terminal records");
                let moved = saturating_u32(reservations + offers);
                BatchOutcome {
                    attempted: moved,
                    processed: moved,
                    ..Default::default()
                }
            }
            Err(e) => {
                let err = AppError::from(e);
                BatchOutcome {
                    errors: vec![format!("archive: {}", err.message)],
                    ..Default::default()
                }
            }
        };
        Some(outcome)
    }

    /// Reservations first: an offer row cannot leave while a reservation points at it
    async fn try_archive(&self, cutoff: i64, now: i64) -> ServiceResult<(u64, u64)> {
        let mut tx = self.pool.begin().await?;
        let reservations = match archive::archive_reservations(&mut tx, cutoff, now).await {
            Ok(n) => n,
            Err(e) => {
                rollback(tx, "archive").await;
                return Err(e.into());
            }
        };
        let offers = match archive::archive_offers(&mut tx, cutoff, now).await {
            Ok(n) => n,
            Err(e) => {
                rollback(tx, "archive").await;
                return Err(e.into());
            }
        };
        tx.commit().await?;
        Ok((reservations, offers))
    }

    // ========================================================================
    // Job log
    // ========================================================================

    async fn persist(&self, report: &SweepReport) {
        for sweep in &report.sweeps {
            let Some(outcome) = &sweep.outcome else {
                continue;
            };
            let details = json!({ "attempted": outcome.attempted, "errors": outcome.errors });
            let run = job_log::NewJobRun {
                id: shared::util::snowflake_id(),
                job_type: sweep.kind.as_str(),
                processed: outcome.processed,
                skipped: outcome.skipped,
                errors: outcome.error_count(),
                details: Some(&details),
            };
            if let Err(e) = job_log::insert(&self.pool, run, report.finished_at).await {
                tracing::error!(sweep = %sweep.kind, error = %e, "Failed to record sweep run");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn exploding_sweep() -> Option<BatchOutcome> {
        panic!("sweep exploded")
    }

    #[tokio::test]
    async fn test_isolate_turns_panic_into_error() {
        let result = isolate(SweepKind::Archive, exploding_sweep()).await;
        assert!(result.ran());
        assert_eq!(result.error_count(), 1);
        let errors = result.outcome.map(|o| o.errors).unwrap_or_default();
        assert!(errors[0].contains("sweep exploded"));
    }

    #[tokio::test]
    async fn test_isolate_passes_not_due_through() {
        let result = isolate(SweepKind::Archive, async { None }).await;
        assert!(!result.ran());
        assert_eq!(result.error_count(), 0);
    }

    #[test]
    fn test_reminder_keys_differ_per_party() {
        assert_eq!(reminder_dedup_key(42, Party::Buyer), "offer_expiring:42:buyer");
        assert_ne!(
            reminder_dedup_key(42, Party::Buyer),
            reminder_dedup_key(42, Party::Seller)
        );
    }
}
