//! Per-run sweep results

use serde::Serialize;
use shared::response::BatchOutcome;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SweepKind {
    OfferExpiry,
    ReservationExpiry,
    ExpiryReminders,
    Archive,
}

impl SweepKind {
    pub const ALL: [SweepKind; 4] = [
        SweepKind::OfferExpiry,
        SweepKind::ReservationExpiry,
        SweepKind::ExpiryReminders,
        SweepKind::Archive,
    ];

    /// `job_type` in the job execution log
    pub fn as_str(&self) -> &'static str {
        match self {
            SweepKind::OfferExpiry => "offer_expiry",
            SweepKind::ReservationExpiry => "reservation_expiry",
            SweepKind::ExpiryReminders => "expiry_reminders",
            SweepKind::Archive => "archive",
        }
    }
}

impl fmt::Display for SweepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One sweep of one run. `outcome` is `None` when the sweep was not due.
#[derive(Debug, Clone, Serialize)]
pub struct SweepResult {
    pub kind: SweepKind,
    pub outcome: Option<BatchOutcome>,
}

impl SweepResult {
    pub fn ran(&self) -> bool {
        self.outcome.is_some()
    }

    pub fn processed(&self) -> u32 {
        self.outcome.as_ref().map_or(0, |o| o.processed)
    }

    pub fn error_count(&self) -> u32 {
        self.outcome.as_ref().map_or(0, BatchOutcome::error_count)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    pub started_at: i64,
    pub finished_at: i64,
    pub sweeps: Vec<SweepResult>,
}

impl SweepReport {
    pub fn get(&self, kind: SweepKind) -> Option<&SweepResult> {
        self.sweeps.iter().find(|s| s.kind == kind)
    }

    pub fn total_errors(&self) -> u32 {
        self.sweeps.iter().map(SweepResult::error_count).sum()
    }

    pub fn log_summary(&self) {
        for sweep in &self.sweeps {
            match &sweep.outcome {
                Some(o) if o.error_count() > 0 => tracing::warn!(
                    sweep = %sweep.kind,
                    attempted = o.attempted,
                    processed = o.processed,
                    skipped = o.skipped,
                    errors = o.error_count(),
                    "Sweep finished with errors"
                ),
                Some(o) => tracing::debug!(
                    sweep = %sweep.kind,
                    attempted = o.attempted,
                    processed = o.processed,
                    skipped = o.skipped,
                    "Sweep finished"
                ),
                None => tracing::debug!(sweep = %sweep.kind, "Sweep not due"),
            }
        }
        tracing::info!(
            duration_ms = self.finished_at - self.started_at,
            errors = self.total_errors(),
            "Scheduler run complete"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(processed: u32, errors: usize) -> BatchOutcome {
        BatchOutcome {
            attempted: processed + errors as u32,
            processed,
            skipped: 0,
            errors: vec!["boom".to_string(); errors],
        }
    }

    #[test]
    fn test_report_totals() {
        let report = SweepReport {
            started_at: 0,
            finished_at: 5,
            sweeps: vec![
                SweepResult { kind: SweepKind::OfferExpiry, outcome: Some(outcome(3, 1)) },
                SweepResult { kind: SweepKind::ReservationExpiry, outcome: Some(outcome(1, 2)) },
                SweepResult { kind: SweepKind::Archive, outcome: None },
            ],
        };
        assert_eq!(report.total_errors(), 3);
        assert_eq!(report.get(SweepKind::OfferExpiry).map(SweepResult::processed), Some(3));
        assert!(!report.get(SweepKind::Archive).is_some_and(SweepResult::ran));
        assert!(report.get(SweepKind::ExpiryReminders).is_none());
    }

    #[test]
    fn test_job_types_are_distinct() {
        let mut names: Vec<_> = SweepKind::ALL.iter().map(SweepKind::as_str).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), SweepKind::ALL.len());
    }
}
