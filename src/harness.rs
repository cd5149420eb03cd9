use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::config::WorkerConfig;
use crate::error::{HarnessError, Result};
use crate::logging::{LogLevel, LogSink};
use crate::process::ProcessControl;
use crate::queue::{QueueClient, WorkerCallbacks};
use crate::worker::{
    HandlerRegistry, JobExecutor, JobLog, LifecycleMonitor, LifecycleState, OutcomeReporter,
    SourceLoader,
};

/// Per-process worker state the queue client calls back into.
///
/// Jobs run strictly one after another, so the log buffer and counters are
/// only ever touched by the job currently in flight.
pub struct WorkerCore {
    executor: JobExecutor,
    reporter: OutcomeReporter,
    monitor: LifecycleMonitor,
    state: LifecycleState,
    log: JobLog,
}

impl WorkerCore {
    pub fn new(config: &WorkerConfig, loader: Box<dyn SourceLoader>, sink: Arc<dyn LogSink>) -> Self {
        let registry = HandlerRegistry::new(
            config.registrations.clone(),
            config.prefix.clone(),
            loader,
            sink.clone(),
        );
        Self {
            executor: JobExecutor::new(registry, sink.clone()),
            reporter: OutcomeReporter::new(sink.clone()),
            monitor: LifecycleMonitor::new(config.limits, sink),
            state: LifecycleState::new(),
            log: JobLog::new(),
        }
    }

    pub fn state(&self) -> &LifecycleState {
        &self.state
    }

    pub fn log(&self) -> &JobLog {
        &self.log
    }

    pub fn validate(&mut self) -> Result<()> {
        self.executor.registry_mut().validate_all()
    }
}

#[async_trait]
impl WorkerCallbacks for WorkerCore {
    fn on_start(&mut self, handle: &str, job_name: &str, workload: &Value) {
        self.reporter.on_start(handle, job_name, workload, &mut self.log);
    }

    async fn execute(&mut self, job_name: &str, workload: &Value) -> Result<Option<Value>> {
        self.executor
            .execute(job_name, workload, &mut self.log, &mut self.state)
            .await
    }

    fn on_complete(&mut self, handle: &str, job_name: &str, result: Option<&Value>) {
        self.reporter
            .on_complete(handle, job_name, result, &mut self.log);
    }

    fn on_fail(&mut self, handle: &str, job_name: &str, error: &HarnessError) {
        self.reporter.on_fail(handle, job_name, error, &mut self.log);
    }

    fn monitor(&mut self, idle: bool, last_job: DateTime<Utc>) -> bool {
        self.monitor.poll(&mut self.state, idle, last_job)
    }
}

/// A worker process: validates its handlers, registers with the queue and
/// serves jobs until a lifecycle limit is reached.
pub struct Harness<Q: QueueClient> {
    config: WorkerConfig,
    queue: Q,
    core: WorkerCore,
    sink: Arc<dyn LogSink>,
    process: Box<dyn ProcessControl>,
}

impl<Q: QueueClient> Harness<Q> {
    pub fn with_collaborators(
        config: WorkerConfig,
        loader: Box<dyn SourceLoader>,
        queue: Q,
        sink: Arc<dyn LogSink>,
        process: Box<dyn ProcessControl>,
    ) -> Self {
        let core = WorkerCore::new(&config, loader, sink.clone());
        Self {
            config,
            queue,
            core,
            sink,
            process,
        }
    }

    pub fn core(&self) -> &WorkerCore {
        &self.core
    }

    pub fn queue(&self) -> &Q {
        &self.queue
    }

    /// Validate every handler, ending the process on failure.
    ///
    /// If the [`ProcessControl`] returns instead of exiting, the error is
    /// returned and nothing is served.
    pub fn validate(&mut self) -> Result<()> {
        if let Err(e) = self.core.validate() {
            self.process.fatal_terminate(&e);
            return Err(e);
        }
        Ok(())
    }

    /// Run the worker until it stops.
    ///
    /// 1. Validates all handlers (fatal on failure)
    /// 2. Adds every configured server to the queue client
    /// 3. Registers every job with its timeout
    /// 4. Serves jobs until the lifecycle monitor or the queue ends it
    /// 5. Unregisters all jobs
    pub async fn run(&mut self) -> Result<()> {
        self.config.validate()?;
        self.validate()?;

        for server in &self.config.servers {
            self.sink
                .log(LogLevel::WorkerInfo, &format!("Adding server {}", server));
            self.queue.add_server(server)?;
        }

        for registration in &self.config.registrations {
            let mut message = format!("Adding job {}", registration.job_name);
            if let Some(timeout) = registration.timeout {
                message.push_str(&format!("; timeout: {}", timeout.as_secs()));
            }
            self.sink.log(LogLevel::WorkerInfo, &message);
            self.queue
                .register_function(&registration.job_name, registration.timeout)?;
        }

        self.core.state.mark_started(Utc::now());
        tracing::info!(
            jobs = self.config.registrations.len(),
            servers = self.config.servers.len(),
            "Worker serving"
        );

        let served = self.queue.serve(&mut self.core).await;
        self.queue.unregister_all();

        tracing::info!(
            executions = self.core.state.job_execution_count(),
            phase = %self.core.state.phase(),
            "Worker stopped"
        );
        served
    }
}
