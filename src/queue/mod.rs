//! The job queue client the worker is served by.
//!
//! The queue transport itself is not part of this crate. [`QueueClient`] names
//! the capabilities the worker needs from one, and [`WorkerCallbacks`] is what
//! the client calls back into while serving. [`LocalQueue`] is an in-process
//! implementation fed through a channel.

pub mod local;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{HarnessError, Result};

pub use local::{LocalQueue, LocalSubmitter};

/// Hooks the queue client invokes around each job and between polls.
#[async_trait]
pub trait WorkerCallbacks: Send {
    fn on_start(&mut self, handle: &str, job_name: &str, workload: &Value);

    async fn execute(&mut self, job_name: &str, workload: &Value) -> Result<Option<Value>>;

    fn on_complete(&mut self, handle: &str, job_name: &str, result: Option<&Value>);

    fn on_fail(&mut self, handle: &str, job_name: &str, error: &HarnessError);

    /// Called once per poll cycle. Returns true when serving should stop.
    fn monitor(&mut self, idle: bool, last_job: DateTime<Utc>) -> bool;
}

#[async_trait]
pub trait QueueClient: Send {
    fn add_server(&mut self, address: &str) -> Result<()>;

    fn register_function(&mut self, job_name: &str, timeout: Option<Duration>) -> Result<()>;

    /// Serve jobs until the monitor asks to stop or the queue is exhausted.
    async fn serve(&mut self, callbacks: &mut dyn WorkerCallbacks) -> Result<()>;

    fn unregister_all(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutcomeStatus {
    Completed,
    Failed,
}

impl fmt::Display for OutcomeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeStatus::Completed => write!(f, "completed"),
            OutcomeStatus::Failed => write!(f, "failed"),
        }
    }
}

/// What the queue reports back to whoever submitted a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub handle: String,
    pub job_name: String,
    pub status: OutcomeStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobOutcome {
    pub fn completed(handle: String, job_name: String, result: Option<Value>) -> Self {
        Self {
            handle,
            job_name,
            status: OutcomeStatus::Completed,
            result,
            error: None,
        }
    }

    pub fn failed(handle: String, job_name: String, error: &HarnessError) -> Self {
        Self {
            handle,
            job_name,
            status: OutcomeStatus::Failed,
            result: None,
            error: Some(error.to_string()),
        }
    }
}
