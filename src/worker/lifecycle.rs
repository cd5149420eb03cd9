use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::config::LifecycleLimits;
use crate::logging::{LogLevel, LogSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerPhase {
    Running,
    /// Terminal. The serve loop exits at the next poll boundary.
    Stopping,
}

impl fmt::Display for WorkerPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkerPhase::Running => write!(f, "running"),
            WorkerPhase::Stopping => write!(f, "stopping"),
        }
    }
}

/// Counters and flags that live as long as the worker process.
#[derive(Debug, Clone)]
pub struct LifecycleState {
    start_time: DateTime<Utc>,
    job_execution_count: u64,
    stop_requested: bool,
}

impl Default for LifecycleState {
    fn default() -> Self {
        Self::new()
    }
}

impl LifecycleState {
    pub fn new() -> Self {
        Self::started_at(Utc::now())
    }

    pub fn started_at(start_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            job_execution_count: 0,
            stop_requested: false,
        }
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    /// Reset the start time when the worker begins serving.
    pub fn mark_started(&mut self, now: DateTime<Utc>) {
        self.start_time = now;
    }

    pub fn job_execution_count(&self) -> u64 {
        self.job_execution_count
    }

    pub fn record_execution(&mut self) {
        self.job_execution_count = self.job_execution_count.saturating_add(1);
    }

    pub fn stop_requested(&self) -> bool {
        self.stop_requested
    }

    pub fn phase(&self) -> WorkerPhase {
        if self.stop_requested {
            WorkerPhase::Stopping
        } else {
            WorkerPhase::Running
        }
    }

    fn request_stop(&mut self) {
        self.stop_requested = true;
    }
}

/// Decides between polls whether the worker should stop.
///
/// Only ever sets the stop flag; counters are left alone.
pub struct LifecycleMonitor {
    limits: LifecycleLimits,
    sink: Arc<dyn LogSink>,
}

impl LifecycleMonitor {
    pub fn new(limits: LifecycleLimits, sink: Arc<dyn LogSink>) -> Self {
        Self { limits, sink }
    }

    /// Returns true when the worker should stop.
    pub fn poll(&self, state: &mut LifecycleState, idle: bool, last_job: DateTime<Utc>) -> bool {
        self.poll_at(state, Utc::now(), idle, last_job)
    }

    /// [`poll`](Self::poll) against an explicit clock reading.
    pub fn poll_at(
        &self,
        state: &mut LifecycleState,
        now: DateTime<Utc>,
        idle: bool,
        last_job: DateTime<Utc>,
    ) -> bool {
        if let Some(max_run_time) = self.limits.max_run_time {
            let elapsed = (now - state.start_time).to_std().unwrap_or(Duration::ZERO);
            if elapsed >= max_run_time {
                self.sink
                    .log(LogLevel::WorkerInfo, "Been running too long, exiting");
                state.request_stop();
            }
        }

        let since_last_job = (now - last_job).num_seconds().max(0);
        self.sink.log(
            LogLevel::Crazy,
            &format!(
                "Worker's last job {} seconds ago{}",
                since_last_job,
                if idle { " (idle)" } else { "" }
            ),
        );

        if let Some(max_runs) = self.limits.max_runs_per_worker {
            if state.job_execution_count >= max_runs {
                self.sink.log(
                    LogLevel::WorkerInfo,
                    &format!(
                        "Ran {} jobs which is over the maximum({}), exiting",
                        state.job_execution_count, max_runs
                    ),
                );
                state.request_stop();
            }
        }

        state.stop_requested
    }
}
