//! Driver loop
//!
//! An explicit state machine run as one iterative task:
//!
//! ```text
//! Idle -> Running -> Draining (work found, batch invoked, short delay)
//!                 -> Backoff  (queue empty or invocation failed, long delay)
//!                 -> Running -> ... -> Stopped
//! ```
//!
//! The persisted control record is read at the top of every iteration and is
//! the only cancellation signal. A batch that is already dispatched always
//! runs to completion; only the sleeps are interruptible by host shutdown.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::future::Future;
use std::pin::{Pin, pin};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::backend::{BackendError, DriverBackend};
use crate::config::DriverSettings;
use crate::queue::QueueCounts;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Failed to start run: {0}")]
    Start(#[source] BackendError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverState {
    Idle,
    Running,
    Draining,
    Backoff,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The control record was switched off
    ControlStopped,
    /// The host asked the loop to end
    Shutdown,
}

/// Progress published for observers; never read by the loop itself
#[derive(Debug, Clone, Serialize)]
pub struct Progress {
    pub state: DriverState,
    pub counts: QueueCounts,
    pub total_processed: u64,
    pub batches: u64,
    pub updated_at: DateTime<Utc>,
}

impl Default for Progress {
    fn default() -> Self {
        Self {
            state: DriverState::Idle,
            counts: QueueCounts::default(),
            total_processed: 0,
            batches: 0,
            updated_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DriverReport {
    pub batches: u64,
    pub processed: u64,
    pub failed: u64,
    pub invocation_errors: u64,
    pub stop_reason: StopReason,
}

pub struct Driver {
    backend: Arc<dyn DriverBackend>,
    settings: DriverSettings,
    actor: String,
    progress: Arc<watch::Sender<Progress>>,
}

impl Driver {
    pub fn new(backend: Arc<dyn DriverBackend>, settings: DriverSettings) -> Self {
        let actor = settings.actor.clone();
        let (progress, _) = watch::channel(Progress::default());

        Self {
            backend,
            settings,
            actor,
            progress: Arc::new(progress),
        }
    }

    pub fn with_actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = actor.into();
        self
    }

    pub fn subscribe(&self) -> watch::Receiver<Progress> {
        self.progress.subscribe()
    }

    fn set_state(&self, state: DriverState) {
        self.progress.send_modify(|p| {
            p.state = state;
            p.updated_at = Utc::now();
        });
    }

    /// Start (or resume) the run and drive it until the control record is
    /// switched off or `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> Result<DriverReport, DriverError>
    where
        F: Future<Output = ()>,
    {
        let mut shutdown = pin!(shutdown);

        match self.backend.start(&self.actor).await {
            Ok(control) => info!(
                actor = %self.actor,
                total_processed = control.total_processed,
                "Driver started"
            ),
            Err(BackendError::AlreadyRunning) => {
                info!(actor = %self.actor, "Run already active, resuming")
            }
            Err(e) => return Err(DriverError::Start(e)),
        }

        self.set_state(DriverState::Running);
        let heartbeat = self.spawn_heartbeat();

        let mut report = DriverReport {
            batches: 0,
            processed: 0,
            failed: 0,
            invocation_errors: 0,
            stop_reason: StopReason::ControlStopped,
        };

        loop {
            match self.backend.is_running().await {
                Ok(true) => {}
                Ok(false) => {
                    info!("Control record stopped, leaving loop");
                    report.stop_reason = StopReason::ControlStopped;
                    break;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to read control record");
                    report.invocation_errors += 1;
                    self.set_state(DriverState::Backoff);
                    if pause(self.settings.check_delay(), &mut shutdown).await {
                        report.stop_reason = StopReason::Shutdown;
                        break;
                    }
                    continue;
                }
            }

            let delay = self.iterate(&mut report).await;

            if pause(delay, &mut shutdown).await {
                report.stop_reason = StopReason::Shutdown;
                break;
            }
            self.set_state(DriverState::Running);
        }

        heartbeat.abort();

        if report.stop_reason == StopReason::Shutdown {
            self.stop_best_effort().await;
        }

        self.set_state(DriverState::Stopped);
        info!(
            batches = report.batches,
            processed = report.processed,
            failed = report.failed,
            invocation_errors = report.invocation_errors,
            reason = ?report.stop_reason,
            "Driver stopped"
        );

        Ok(report)
    }

    /// One pass: look for work, invoke at most one batch, return the delay
    async fn iterate(&self, report: &mut DriverReport) -> Duration {
        let pending = match self.backend.pending_count().await {
            Ok(pending) => pending,
            Err(e) => {
                warn!(error = %e, "Failed to read pending count");
                report.invocation_errors += 1;
                self.set_state(DriverState::Backoff);
                return self.settings.check_delay();
            }
        };

        if pending == 0 {
            debug!("Queue empty, backing off");
            self.set_state(DriverState::Backoff);
            return self.settings.check_delay();
        }

        self.set_state(DriverState::Draining);
        match self.backend.invoke_batch().await {
            Ok(outcome) => {
                report.batches += 1;
                report.processed += outcome.processed;
                report.failed += outcome.failed;

                match self.backend.record_batch(outcome.processed).await {
                    Ok(control) => self.progress.send_modify(|p| {
                        p.total_processed = control.total_processed;
                        p.batches = report.batches;
                    }),
                    Err(e) => warn!(error = %e, "Failed to record batch"),
                }

                debug!(
                    pending,
                    processed = outcome.processed,
                    failed = outcome.failed,
                    "Batch invoked"
                );
                self.settings.batch_delay()
            }
            Err(e) => {
                warn!(error = %e, "Batch invocation failed, backing off");
                report.invocation_errors += 1;
                self.set_state(DriverState::Backoff);
                self.settings.check_delay()
            }
        }
    }

    /// Periodically refresh queue counts for observers
    fn spawn_heartbeat(&self) -> JoinHandle<()> {
        let backend = Arc::clone(&self.backend);
        let progress = Arc::clone(&self.progress);
        let period = self.settings.heartbeat();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            loop {
                ticker.tick().await;
                match backend.stats().await {
                    Ok(stats) => progress.send_modify(|p| {
                        p.counts = stats.counts;
                        p.total_processed = stats.control.total_processed;
                        p.updated_at = Utc::now();
                    }),
                    Err(e) => debug!(error = %e, "Heartbeat poll failed"),
                }
            }
        })
    }

    /// The host is going away: try to switch the record off, but never hang
    async fn stop_best_effort(&self) {
        match tokio::time::timeout(self.settings.shutdown_grace(), self.backend.stop()).await {
            Ok(Ok(_)) => info!("Run stopped on shutdown"),
            Ok(Err(e)) => warn!(error = %e, "Failed to stop run on shutdown"),
            Err(_) => warn!("Timed out stopping run on shutdown"),
        }
    }
}

/// Sleep for `duration`; returns true when shutdown fired first
async fn pause<F>(duration: Duration, shutdown: &mut Pin<&mut F>) -> bool
where
    F: Future<Output = ()>,
{
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        _ = shutdown.as_mut() => true,
    }
}
