//! Shared fixtures for worker integration tests.
//!
//! Provides a handler catalog covering every resolution path, a loader that
//! counts loads, and a process control that records instead of exiting.

#![allow(dead_code)]

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use job_harness::config::{HandlerRegistration, WorkerConfig};
use job_harness::error::{HarnessError, Result};
use job_harness::logging::MemorySink;
use job_harness::process::ProcessControl;
use job_harness::queue::LocalQueue;
use job_harness::worker::{BoxError, Catalog, CodeUnit, JobHandler, JobLog, SourceLoader};
use job_harness::Harness;

pub fn echo(workload: &Value, _log: &mut JobLog) -> std::result::Result<Value, BoxError> {
    Ok(workload.clone())
}

pub fn boom(_workload: &Value, log: &mut JobLog) -> std::result::Result<Value, BoxError> {
    log.push("about to explode");
    Err("disk on fire".into())
}

/// Writes one long scalar and one structure into the job log.
pub fn chatty(workload: &Value, log: &mut JobLog) -> std::result::Result<Value, BoxError> {
    log.push("z".repeat(300));
    log.push(json!({ "seen": workload }));
    Ok(json!(["a", "b"]))
}

/// Blocks the worker thread well past any test timeout without yielding.
pub fn dawdle(_workload: &Value, _log: &mut JobLog) -> std::result::Result<Value, BoxError> {
    std::thread::sleep(Duration::from_millis(300));
    Ok(json!("late"))
}

/// Counts how many jobs this instance has served.
#[derive(Default)]
pub struct Counter {
    calls: u64,
}

#[async_trait]
impl JobHandler for Counter {
    async fn run(&mut self, _workload: &Value, log: &mut JobLog) -> std::result::Result<Value, BoxError> {
        self.calls += 1;
        log.push(format!("call {}", self.calls));
        Ok(json!(self.calls))
    }
}

fn new_counter() -> Box<dyn JobHandler> {
    Box::new(Counter::default())
}

/// Sleeps longer than any test timeout.
pub struct Sleeper;

#[async_trait]
impl JobHandler for Sleeper {
    async fn run(&mut self, _workload: &Value, _log: &mut JobLog) -> std::result::Result<Value, BoxError> {
        tokio::time::sleep(Duration::from_secs(5)).await;
        Ok(Value::Null)
    }
}

fn new_sleeper() -> Box<dyn JobHandler> {
    Box::new(Sleeper)
}

pub fn test_catalog() -> Catalog {
    Catalog::new()
        .with_unit("workers/echo", || {
            CodeUnit::new()
                .with_function("echo", echo)
                .with_function("test_echo", echo)
        })
        .with_unit("workers/counter", || CodeUnit::new().with_runnable("counter", new_counter))
        .with_unit("workers/boom", || CodeUnit::new().with_function("boom", boom))
        .with_unit("workers/chatty", || CodeUnit::new().with_function("chatty", chatty))
        .with_unit("workers/slow", || CodeUnit::new().with_runnable("slow", new_sleeper))
        .with_unit("workers/plain", || CodeUnit::new().with_plain_type("plain"))
        .with_unit("workers/dawdle", || CodeUnit::new().with_function("dawdle", dawdle))
        .with_unit("workers/pair", || {
            CodeUnit::new()
                .with_function("first", echo)
                .with_function("second", echo)
        })
}

/// Wraps a catalog and counts every load.
pub struct CountingLoader {
    inner: Catalog,
    loads: Arc<AtomicUsize>,
}

impl CountingLoader {
    pub fn new(inner: Catalog) -> (Self, Arc<AtomicUsize>) {
        let loads = Arc::new(AtomicUsize::new(0));
        (
            Self {
                inner,
                loads: loads.clone(),
            },
            loads,
        )
    }
}

impl SourceLoader for CountingLoader {
    fn load(&mut self, location: &Path) -> Result<CodeUnit> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load(location)
    }
}

/// Records fatal terminations instead of ending the test process.
#[derive(Clone, Default)]
pub struct RecordingTerminator {
    reasons: Arc<Mutex<Vec<String>>>,
}

impl RecordingTerminator {
    pub fn reasons(&self) -> Vec<String> {
        self.reasons.lock().unwrap().clone()
    }
}

impl ProcessControl for RecordingTerminator {
    fn fatal_terminate(&self, reason: &HarnessError) {
        self.reasons.lock().unwrap().push(reason.to_string());
    }
}

/// Config registering `jobs` as (name, source) pairs.
pub fn config_with(jobs: &[(&str, &str)]) -> WorkerConfig {
    jobs.iter().fold(WorkerConfig::new(), |config, (name, source)| {
        config.with_registration(HandlerRegistration::new(*name, *source))
    })
}

pub struct TestWorker {
    pub harness: Harness<LocalQueue>,
    pub submitter: job_harness::queue::LocalSubmitter,
    pub sink: Arc<MemorySink>,
    pub terminator: RecordingTerminator,
}

/// A harness over [`test_catalog`] with a fast idle timeout.
pub fn test_worker(config: WorkerConfig) -> TestWorker {
    let (queue, submitter) = LocalQueue::new();
    let queue = queue.with_idle_timeout(Duration::from_millis(20));
    let sink = Arc::new(MemorySink::new());
    let terminator = RecordingTerminator::default();
    let harness = Harness::with_collaborators(
        config,
        Box::new(test_catalog()),
        queue,
        sink.clone(),
        Box::new(terminator.clone()),
    );
    TestWorker {
        harness,
        submitter,
        sink,
        terminator,
    }
}
