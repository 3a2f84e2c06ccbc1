//! Activity log entries and coarse health assessment
//!
//! Dashboards read both through the admin API; nothing here affects control flow.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::ledger::RunControl;
use crate::observability::MetricsSnapshot;
use crate::queue::QueueCounts;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    Batch,
    Started,
    Stopped,
    Reset,
    Recovered,
}

/// One append-only activity record; `id` is assigned by the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub id: u64,
    pub kind: ActivityKind,
    pub processed: u64,
    pub failed: u64,
    pub message: Option<String>,
    pub at: DateTime<Utc>,
}

impl ActivityEntry {
    pub fn new(kind: ActivityKind) -> Self {
        Self {
            id: 0,
            kind,
            processed: 0,
            failed: 0,
            message: None,
            at: Utc::now(),
        }
    }

    pub fn batch(processed: u64, failed: u64) -> Self {
        Self {
            processed,
            failed,
            ..Self::new(ActivityKind::Batch)
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Queue counts together with the run control record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStats {
    pub counts: QueueCounts,
    pub control: RunControl,
    #[serde(default)]
    pub metrics: Option<MetricsSnapshot>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthStatus {
    /// Driver not running
    Idle,
    Healthy,
    /// Running, but some items exhausted their attempts
    Degraded,
    /// Running with pending work, nothing in flight, and no batch recorded
    /// within the stall threshold
    Stalled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub is_running: bool,
    pub pending: u64,
    pub processing: u64,
    pub failed: u64,
    pub total_processed: u64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub seconds_since_last_run: Option<i64>,
}

impl HealthReport {
    pub fn assess(
        control: &RunControl,
        counts: &QueueCounts,
        stall_after: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        // A fresh run is measured from its start, not from the previous run's last batch
        let reference = control.last_run_at.max(control.started_at);
        let seconds_since_last_run = control.last_run_at.map(|at| (now - at).num_seconds());
        // An empty queue or a batch in flight is not a stall, however quiet the ledger
        let stalled = counts.pending > 0
            && counts.processing == 0
            && reference.is_some_and(|at| {
                (now - at).to_std().unwrap_or(Duration::ZERO) > stall_after
            });

        let status = if !control.is_running {
            HealthStatus::Idle
        } else if stalled {
            HealthStatus::Stalled
        } else if counts.failed > 0 {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };

        Self {
            status,
            is_running: control.is_running,
            pending: counts.pending,
            processing: counts.processing,
            failed: counts.failed,
            total_processed: control.total_processed,
            last_run_at: control.last_run_at,
            seconds_since_last_run,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running_control(last_run_secs_ago: i64) -> (RunControl, DateTime<Utc>) {
        let now = Utc::now();
        let control = RunControl {
            is_running: true,
            started_at: Some(now - chrono::Duration::seconds(3600)),
            last_run_at: Some(now - chrono::Duration::seconds(last_run_secs_ago)),
            ..RunControl::default()
        };
        (control, now)
    }

    #[test]
    fn test_idle_when_not_running() {
        let report = HealthReport::assess(
            &RunControl::default(),
            &QueueCounts {
                failed: 4,
                ..Default::default()
            },
            Duration::from_secs(300),
            Utc::now(),
        );
        assert_eq!(report.status, HealthStatus::Idle);
        assert_eq!(report.failed, 4);
    }

    #[test]
    fn test_healthy_and_degraded() {
        let (control, now) = running_control(10);
        let stall = Duration::from_secs(300);

        let healthy = HealthReport::assess(&control, &QueueCounts::default(), stall, now);
        assert_eq!(healthy.status, HealthStatus::Healthy);
        assert_eq!(healthy.seconds_since_last_run, Some(10));

        let counts = QueueCounts {
            failed: 1,
            ..Default::default()
        };
        let degraded = HealthReport::assess(&control, &counts, stall, now);
        assert_eq!(degraded.status, HealthStatus::Degraded);
    }

    #[test]
    fn test_stalled_wins_over_degraded() {
        let (control, now) = running_control(900);
        let counts = QueueCounts {
            pending: 5,
            failed: 2,
            ..Default::default()
        };

        let report = HealthReport::assess(&control, &counts, Duration::from_secs(300), now);
        assert_eq!(report.status, HealthStatus::Stalled);
    }

    #[test]
    fn test_restarted_run_is_not_stalled() {
        let now = Utc::now();
        let control = RunControl {
            is_running: true,
            started_at: Some(now - chrono::Duration::seconds(5)),
            last_run_at: Some(now - chrono::Duration::days(2)),
            ..RunControl::default()
        };

        let counts = QueueCounts {
            pending: 3,
            ..Default::default()
        };
        let report = HealthReport::assess(&control, &counts, Duration::from_secs(300), now);
        assert_eq!(report.status, HealthStatus::Healthy);
    }

    #[test]
    fn test_quiet_run_without_pending_work_is_healthy() {
        let (control, now) = running_control(3600);
        let stall = Duration::from_secs(300);

        let empty = HealthReport::assess(&control, &QueueCounts::default(), stall, now);
        assert_eq!(empty.status, HealthStatus::Healthy);
        assert_eq!(empty.seconds_since_last_run, Some(3600));

        // A long batch still holding claims
        let busy = QueueCounts {
            pending: 40,
            processing: 100,
            ..Default::default()
        };
        let report = HealthReport::assess(&control, &busy, stall, now);
        assert_eq!(report.status, HealthStatus::Healthy);
    }

    #[test]
    fn test_batch_entry_serializes_kind() {
        let entry = ActivityEntry::batch(3, 1).with_message("claimed 4");
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["kind"], "batch");
        assert_eq!(json["processed"], 3);
        assert_eq!(json["message"], "claimed 4");
    }
}
