use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HarnessError {
    #[error("Function {identifier} is not a registered job name")]
    UnregisteredJob { job_name: String, identifier: String },

    #[error("Function {identifier} not found in {}", path.display())]
    HandlerNotFound {
        job_name: String,
        identifier: String,
        path: PathBuf,
    },

    #[error("{message}")]
    HandlerExecution { job_name: String, message: String },

    #[error("Failed to load {}: {reason}", path.display())]
    Load { path: PathBuf, reason: String },

    #[error("Job {job_name} timed out after {timeout:?}")]
    Timeout { job_name: String, timeout: Duration },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Queue error: {0}")]
    Queue(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl HarnessError {
    /// Whether the serve loop keeps going after this error.
    ///
    /// Per-job failures abort only the job that raised them. Configuration,
    /// queue and I/O errors end the worker.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            HarnessError::UnregisteredJob { .. }
                | HarnessError::HandlerNotFound { .. }
                | HarnessError::HandlerExecution { .. }
                | HarnessError::Load { .. }
                | HarnessError::Timeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, HarnessError>;
