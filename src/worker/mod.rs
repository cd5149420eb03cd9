//! Worker core: resolving handlers and running jobs.
//!
//! # Components
//!
//! - [`HandlerRegistry`]: maps job names to handlers, loading handler code once
//! - [`JobExecutor`]: runs a resolved handler and counts executions
//! - [`JobLog`]: per-job buffer handler code writes log entries into
//! - [`OutcomeReporter`]: formats start/complete/fail events for the log sink
//! - [`LifecycleMonitor`]: decides between polls whether the worker stops
//!
//! # Execution Flow
//!
//! 1. The queue client delivers a job name, handle and workload
//! 2. [`OutcomeReporter::on_start`] logs the start and clears the buffer
//! 3. [`JobExecutor::execute`] resolves the handler and runs it
//! 4. [`OutcomeReporter::on_complete`] or [`OutcomeReporter::on_fail`] drains
//!    the buffer and logs the outcome
//! 5. [`LifecycleMonitor::poll`] runs before the next wait

pub mod executor;
pub mod handler;
pub mod lifecycle;
pub mod log_buffer;
pub mod registry;
pub mod reporter;

pub use executor::JobExecutor;
pub use handler::{BoxError, Catalog, CodeUnit, HandlerFn, JobHandler, ResolvedHandler, SourceLoader};
pub use lifecycle::{LifecycleMonitor, LifecycleState, WorkerPhase};
pub use log_buffer::JobLog;
pub use registry::HandlerRegistry;
pub use reporter::OutcomeReporter;
