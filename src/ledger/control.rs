use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::error::{LedgerError, Result};

/// Singleton record deciding whether the driver loop keeps going
///
/// Counters only grow: stop and start leave them untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunControl {
    pub is_running: bool,
    pub total_processed: u64,
    pub current_batch: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub stopped_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub started_by: Option<String>,
}

impl RunControl {
    pub(crate) fn start(&mut self, actor: &str, now: DateTime<Utc>) -> Result<()> {
        if self.is_running {
            return Err(LedgerError::AlreadyRunning {
                started_by: self.started_by.clone(),
                started_at: self.started_at,
            });
        }

        self.is_running = true;
        self.started_at = Some(now);
        self.started_by = Some(actor.to_string());
        Ok(())
    }

    /// Returns whether the record was running before the call
    pub(crate) fn stop(&mut self, now: DateTime<Utc>) -> bool {
        let was_running = self.is_running;
        self.is_running = false;
        self.stopped_at = Some(now);
        was_running
    }

    pub(crate) fn record_batch(&mut self, processed: u64, now: DateTime<Utc>) {
        self.total_processed = self.total_processed.saturating_add(processed);
        self.current_batch = self.current_batch.saturating_add(1);
        self.last_run_at = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_twice_is_rejected_without_touching_counters() {
        let mut control = RunControl::default();
        let now = Utc::now();

        control.start("dashboard", now).unwrap();
        control.record_batch(5, now);

        let err = control.start("cli", now).unwrap_err();
        assert!(matches!(
            err,
            LedgerError::AlreadyRunning { started_by: Some(ref who), .. } if who == "dashboard"
        ));
        assert_eq!(control.total_processed, 5);
        assert_eq!(control.current_batch, 1);
    }

    #[test]
    fn test_stop_is_unconditional() {
        let mut control = RunControl::default();
        assert!(!control.stop(Utc::now()));
        assert!(control.stopped_at.is_some());

        control.start("cli", Utc::now()).unwrap();
        assert!(control.stop(Utc::now()));
        assert!(!control.is_running);
    }
}
