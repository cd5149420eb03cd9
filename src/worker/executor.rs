use std::sync::Arc;

use serde_json::Value;

use crate::error::{HarnessError, Result};
use crate::logging::{LogLevel, LogSink};
use crate::worker::handler::ResolvedHandler;
use crate::worker::lifecycle::LifecycleState;
use crate::worker::log_buffer::JobLog;
use crate::worker::registry::HandlerRegistry;

/// Runs jobs against the handlers the registry resolves.
pub struct JobExecutor {
    registry: HandlerRegistry,
    sink: Arc<dyn LogSink>,
}

impl JobExecutor {
    pub fn new(registry: HandlerRegistry, sink: Arc<dyn LogSink>) -> Self {
        Self { registry, sink }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut HandlerRegistry {
        &mut self.registry
    }

    /// Execute one job.
    ///
    /// The execution counter in `state` goes up before the handler is looked
    /// up, so a job whose handler cannot be resolved still counts toward the
    /// worker's run limit. Resolution failures are logged and yield `Ok(None)`.
    /// Entries the handler writes are left in `log` for the reporter.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::HandlerExecution`] when the handler itself fails.
    pub async fn execute(
        &mut self,
        job_name: &str,
        workload: &Value,
        log: &mut JobLog,
        state: &mut LifecycleState,
    ) -> Result<Option<Value>> {
        state.record_execution();

        let handler = match self.registry.resolve(job_name) {
            Ok(handler) => handler,
            Err(e) if e.is_recoverable() => {
                self.sink.log(LogLevel::Info, &e.to_string());
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        self.sink
            .log(LogLevel::Debug, &format!("Starting Job: {}", job_name));
        self.sink
            .log(LogLevel::Debug, &format!("Workload: {}", workload));

        let outcome = match handler {
            ResolvedHandler::Stateful(object) => {
                self.sink.log(
                    LogLevel::Debug,
                    &format!("Calling object for {}.", job_name),
                );
                object.run(workload, log).await
            }
            ResolvedHandler::Function(function) => {
                self.sink.log(
                    LogLevel::Debug,
                    &format!("Calling function for {}.", job_name),
                );
                function(workload, log)
            }
        };

        match outcome {
            Ok(result) => {
                tracing::debug!(job_name, log_entries = log.len(), "Job handler returned");
                Ok(Some(result))
            }
            Err(e) => Err(HarnessError::HandlerExecution {
                job_name: job_name.to_string(),
                message: e.to_string(),
            }),
        }
    }
}
