//! Daily scheduler
//!
//! State machine: `Idle -> Waiting -> Running -> Waiting ...`. The next fire
//! time is computed from the wall clock after each run completes, so a run
//! that overruns its slot never fires twice. Manual triggers that arrive while
//! a run is in flight are coalesced into it, or queued (at most one) when the
//! `queue` policy is configured.

use crate::config::{Config, ManualTriggerPolicy, ScheduleTime};
use crate::error::RunError;
use crate::managers::backup::{BackupOrchestrator, RunTrigger};
use chrono::{DateTime, Duration as ChronoDuration, Local, LocalResult, NaiveDate, TimeZone};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// Upper bound on a single sleep, so wall-clock jumps are noticed
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Waiting { next_run: DateTime<Local> },
    Running { started_at: DateTime<Local> },
}

/// What happened to a manual trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    /// A run starts now
    Accepted,
    /// A run will start as soon as the current one finishes
    Queued,
    /// Folded into the run already in progress (or already pending)
    Coalesced,
    /// The scheduler has stopped
    Stopped,
}

/// Next instant at which `schedule` occurs strictly after `now`
///
/// Returns today's slot if it is still ahead, otherwise tomorrow's. On a DST
/// gap the slot moves to the first valid local time after it.
pub fn next_fire_time(schedule: ScheduleTime, now: DateTime<Local>) -> DateTime<Local> {
    let today = now.date_naive();
    let candidate = local_at(today, schedule);
    if candidate > now {
        return candidate;
    }
    local_at(today + ChronoDuration::days(1), schedule)
}

fn local_at(date: NaiveDate, schedule: ScheduleTime) -> DateTime<Local> {
    let mut naive = date.and_time(schedule.time());
    // Skipped local times only happen on DST gaps, which last at most a few hours
    for _ in 0..48 {
        match Local.from_local_datetime(&naive) {
            LocalResult::Single(t) => return t,
            LocalResult::Ambiguous(earliest, _) => return earliest,
            LocalResult::None => naive += ChronoDuration::minutes(30),
        }
    }
    Local.from_utc_datetime(&naive)
}

/// Control surface for a running scheduler
#[derive(Clone)]
pub struct SchedulerHandle {
    triggers: mpsc::Sender<()>,
    shutdown: Arc<watch::Sender<bool>>,
    state: Arc<Mutex<SchedulerState>>,
    policy: ManualTriggerPolicy,
}

impl SchedulerHandle {
    /// Request an immediate run
    pub fn run_now(&self) -> TriggerOutcome {
        let state = self.state.lock();
        let running = matches!(*state, SchedulerState::Running { .. });

        if running && self.policy == ManualTriggerPolicy::Coalesce {
            info!(component = "scheduler", "Run already in progress; manual trigger coalesced");
            return TriggerOutcome::Coalesced;
        }

        match self.triggers.try_send(()) {
            Ok(()) if running => {
                info!(component = "scheduler", "Manual trigger queued behind the current run");
                TriggerOutcome::Queued
            }
            Ok(()) => TriggerOutcome::Accepted,
            Err(mpsc::error::TrySendError::Full(())) => {
                info!(component = "scheduler", "A manual run is already pending; trigger coalesced");
                TriggerOutcome::Coalesced
            }
            Err(mpsc::error::TrySendError::Closed(())) => TriggerOutcome::Stopped,
        }
    }

    /// Stop after the current run; databases not yet started are skipped
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.lock()
    }
}

pub struct Scheduler {
    orchestrator: Arc<BackupOrchestrator>,
    config: Config,
    triggers: mpsc::Receiver<()>,
    shutdown: watch::Receiver<bool>,
    state: Arc<Mutex<SchedulerState>>,
    poll_interval: Duration,
}

impl Scheduler {
    pub fn new(orchestrator: Arc<BackupOrchestrator>, config: Config) -> (Self, SchedulerHandle) {
        // One slot: at most one manual run can be pending
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = Arc::new(Mutex::new(SchedulerState::Idle));

        let handle = SchedulerHandle {
            triggers: trigger_tx,
            shutdown: Arc::new(shutdown_tx),
            state: Arc::clone(&state),
            policy: config.backup_settings.manual_trigger,
        };

        let scheduler = Self {
            orchestrator,
            config,
            triggers: trigger_rx,
            shutdown: shutdown_rx,
            state,
            poll_interval: DEFAULT_POLL_INTERVAL,
        };

        (scheduler, handle)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn set_state(&self, state: SchedulerState) {
        *self.state.lock() = state;
    }

    /// Run until shutdown is requested
    pub async fn run(mut self) {
        let settings = self.config.backup_settings.clone();
        let clock = self.orchestrator.clock();
        info!(
            component = "scheduler",
            "Scheduler started: daily at {}, {} database(s)",
            settings.schedule_time,
            self.config.databases.len()
        );

        let mut next_run = next_fire_time(settings.schedule_time, clock.now());
        'schedule: loop {
            self.set_state(SchedulerState::Waiting { next_run });
            self.orchestrator.set_next_scheduled_run(Some(next_run));
            info!(component = "scheduler", "Next backup at {}", next_run.format("%Y-%m-%d %H:%M"));

            // Wait for the slot, a manual trigger or shutdown
            let trigger = loop {
                if *self.shutdown.borrow() {
                    break 'schedule;
                }

                let remaining = (next_run - clock.now()).to_std().unwrap_or(Duration::ZERO);
                if remaining.is_zero() {
                    break RunTrigger::Scheduled;
                }

                tokio::select! {
                    _ = tokio::time::sleep(remaining.min(self.poll_interval)) => {}
                    Some(()) = self.triggers.recv() => {
                        info!(component = "scheduler", "Manual run requested");
                        break RunTrigger::Manual;
                    }
                    Ok(()) = self.shutdown.changed() => {}
                }
            };

            self.execute(trigger).await;

            // A manual run leaves the slot alone; if it has passed meanwhile it fires next
            if trigger == RunTrigger::Scheduled {
                next_run = next_fire_time(settings.schedule_time, clock.now());
            }

            if settings.manual_trigger == ManualTriggerPolicy::Coalesce {
                while self.triggers.try_recv().is_ok() {}
            }
        }

        self.orchestrator.set_next_scheduled_run(None);
        self.set_state(SchedulerState::Idle);
        info!(component = "scheduler", "Scheduler stopped");
    }

    async fn execute(&mut self, trigger: RunTrigger) {
        let started_at = self.orchestrator.clock().now();
        self.set_state(SchedulerState::Running { started_at });

        let orchestrator = Arc::clone(&self.orchestrator);
        let databases = self.config.databases.clone();
        let settings = self.config.backup_settings.clone();
        let cycle = async move { orchestrator.run_cycle(&databases, &settings, trigger).await };
        tokio::pin!(cycle);

        let outcome = tokio::select! {
            outcome = &mut cycle => outcome,
            Ok(()) = self.shutdown.changed() => {
                warn!(component = "scheduler", "Shutdown requested; remaining databases will be skipped");
                self.orchestrator.cancel();
                cycle.await
            }
        };

        match outcome {
            Ok(report) => {
                if report.summary.all_succeeded() {
                    info!(component = "scheduler", "Scheduled run completed successfully");
                } else {
                    warn!(
                        component = "scheduler",
                        "Scheduled run completed with {} failure(s)",
                        report.summary.failed
                    );
                }
            }
            Err(RunError::AlreadyRunning) => {
                warn!(component = "scheduler", "Another backup run holds the lock; skipping this slot");
            }
            Err(e) => error!(component = "scheduler", "Scheduled run failed: {}", e),
        }
    }
}
