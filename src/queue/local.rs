use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::error::{HarnessError, Result};
use crate::queue::{JobOutcome, QueueClient, WorkerCallbacks};

const DEFAULT_CAPACITY: usize = 1_024;
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
struct Submission {
    job_name: String,
    workload: Value,
    reply: oneshot::Sender<JobOutcome>,
}

/// Sending half of a [`LocalQueue`].
#[derive(Debug, Clone)]
pub struct LocalSubmitter {
    tx: mpsc::Sender<Submission>,
}

impl LocalSubmitter {
    /// Enqueue a job and get a receiver for its outcome.
    pub async fn submit(
        &self,
        job_name: impl Into<String>,
        workload: Value,
    ) -> Result<oneshot::Receiver<JobOutcome>> {
        let (reply, outcome_rx) = oneshot::channel();
        self.tx
            .send(Submission {
                job_name: job_name.into(),
                workload,
                reply,
            })
            .await
            .map_err(|_| HarnessError::Queue("local queue is closed".to_string()))?;
        Ok(outcome_rx)
    }
}

/// An in-process job queue.
///
/// Jobs are served one at a time in submission order. Serving ends when the
/// monitor asks to stop or every [`LocalSubmitter`] has been dropped and the
/// backlog is drained.
#[derive(Debug)]
pub struct LocalQueue {
    servers: Vec<String>,
    functions: HashMap<String, Option<Duration>>,
    rx: mpsc::Receiver<Submission>,
    idle_timeout: Duration,
    next_handle: u64,
}

impl LocalQueue {
    pub fn new() -> (Self, LocalSubmitter) {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> (Self, LocalSubmitter) {
        let (tx, rx) = mpsc::channel(capacity);
        let queue = Self {
            servers: Vec::new(),
            functions: HashMap::new(),
            rx,
            idle_timeout: DEFAULT_IDLE_TIMEOUT,
            next_handle: 0,
        };
        (queue, LocalSubmitter { tx })
    }

    /// How long one poll waits for a job before reporting the worker idle.
    pub fn with_idle_timeout(mut self, idle_timeout: Duration) -> Self {
        self.idle_timeout = idle_timeout;
        self
    }

    pub fn servers(&self) -> &[String] {
        &self.servers
    }

    pub fn is_registered(&self, job_name: &str) -> bool {
        self.functions.contains_key(job_name)
    }

    pub fn timeout_for(&self, job_name: &str) -> Option<Duration> {
        self.functions.get(job_name).copied().flatten()
    }

    fn next_handle(&mut self) -> String {
        self.next_handle += 1;
        format!("H:local:{}", self.next_handle)
    }
}

#[async_trait]
impl QueueClient for LocalQueue {
    fn add_server(&mut self, address: &str) -> Result<()> {
        if address.trim().is_empty() {
            return Err(HarnessError::Config("empty server address".to_string()));
        }
        if !self.servers.iter().any(|s| s == address) {
            self.servers.push(address.to_string());
        }
        Ok(())
    }

    fn register_function(&mut self, job_name: &str, timeout: Option<Duration>) -> Result<()> {
        self.functions.insert(job_name.to_string(), timeout);
        Ok(())
    }

    async fn serve(&mut self, callbacks: &mut dyn WorkerCallbacks) -> Result<()> {
        let mut idle = false;
        let mut last_job = Utc::now();

        loop {
            if callbacks.monitor(idle, last_job) {
                tracing::info!("Monitor requested stop");
                return Ok(());
            }

            let submission = match tokio::time::timeout(self.idle_timeout, self.rx.recv()).await {
                Err(_) => {
                    idle = true;
                    continue;
                }
                Ok(None) => {
                    tracing::info!("Local queue closed and drained");
                    return Ok(());
                }
                Ok(Some(submission)) => submission,
            };

            let handle = self.next_handle();
            let registered = self.functions.get(&submission.job_name).copied();
            let outcome = dispatch(
                &handle,
                &submission.job_name,
                &submission.workload,
                registered,
                callbacks,
            )
            .await;

            // Submitter may have stopped waiting.
            let _ = submission.reply.send(outcome);

            idle = false;
            last_job = Utc::now();
        }
    }

    fn unregister_all(&mut self) {
        self.functions.clear();
    }
}

/// Run one job through the callbacks. `registered` is the function's
/// timeout entry, `None` when the function was never registered.
async fn dispatch(
    handle: &str,
    job_name: &str,
    workload: &Value,
    registered: Option<Option<Duration>>,
    callbacks: &mut dyn WorkerCallbacks,
) -> JobOutcome {
    let Some(timeout) = registered else {
        tracing::warn!(handle, job_name, "Job for unregistered function rejected");
        let err = HarnessError::Queue(format!("no worker registered for {}", job_name));
        return JobOutcome::failed(handle.to_string(), job_name.to_string(), &err);
    };

    callbacks.on_start(handle, job_name, workload);

    let result = match timeout {
        Some(limit) => {
            let started = Instant::now();
            let timed_out = || HarnessError::Timeout {
                job_name: job_name.to_string(),
                timeout: limit,
            };
            match tokio::time::timeout(limit, callbacks.execute(job_name, workload)).await {
                // A handler that never yields overruns without the timer firing.
                Ok(_) if started.elapsed() > limit => Err(timed_out()),
                Ok(result) => result,
                Err(_) => Err(timed_out()),
            }
        }
        None => callbacks.execute(job_name, workload).await,
    };

    match result {
        Ok(value) => {
            callbacks.on_complete(handle, job_name, value.as_ref());
            JobOutcome::completed(handle.to_string(), job_name.to_string(), value)
        }
        Err(e) => {
            callbacks.on_fail(handle, job_name, &e);
            JobOutcome::failed(handle.to_string(), job_name.to_string(), &e)
        }
    }
}
