use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::wrappers::LinesStream;
use tokio_stream::StreamExt;

use job_harness::builtin;
use job_harness::config::{parse_timeout, HandlerRegistration, LifecycleLimits, WorkerConfig};
use job_harness::logging::{init_tracing, LogLevel, TracingSink};
use job_harness::process::SignalTerminator;
use job_harness::queue::local::DEFAULT_IDLE_TIMEOUT;
use job_harness::queue::{LocalQueue, LocalSubmitter};
use job_harness::Harness;

#[derive(Parser, Debug)]
#[command(name = "job-harness")]
#[command(version)]
#[command(about = "A job worker that serves named handlers until a lifecycle limit is hit")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve newline-delimited JSON job requests from stdin
    Run(WorkerArgs),

    /// Check that every registered job resolves to a handler, then exit
    Validate(WorkerArgs),
}

#[derive(Parser, Debug)]
struct WorkerArgs {
    /// Queue server address (host:port); repeat for several servers
    #[arg(long = "server", short = 's', default_value = "127.0.0.1:4730")]
    servers: Vec<String>,

    /// Job registration as NAME=PATH; defaults to every built-in job
    #[arg(long = "worker", short = 'w')]
    workers: Vec<HandlerRegistration>,

    /// Per-job timeout as NAME=SECONDS
    #[arg(long = "timeout", short = 't')]
    timeouts: Vec<String>,

    /// Prefix prepended to job names to form handler identifiers
    #[arg(long, default_value = "")]
    prefix: String,

    /// Stop after this many seconds of serving (0 = no limit)
    #[arg(long, default_value = "0")]
    max_run_time: u64,

    /// Stop after this many job executions (0 = no limit)
    #[arg(long, default_value = "0")]
    max_runs_per_worker: u64,

    /// How long one poll waits for a job before the worker counts as idle
    #[arg(long, default_value_t = DEFAULT_IDLE_TIMEOUT.as_millis() as u64)]
    idle_timeout_ms: u64,

    /// Increase verbosity (-v proc info, -vv worker info, -vvv debug, -vvvv crazy)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl WorkerArgs {
    fn worker_config(&self) -> job_harness::Result<WorkerConfig> {
        let registrations = if self.workers.is_empty() {
            builtin::registrations()
        } else {
            self.workers.clone()
        };

        let mut config = WorkerConfig::new()
            .with_servers(self.servers.clone())
            .with_prefix(self.prefix.clone())
            .with_limits(LifecycleLimits::from_raw(
                self.max_run_time,
                self.max_runs_per_worker,
            ));
        for registration in registrations {
            config = config.with_registration(registration);
        }
        for timeout in &self.timeouts {
            let (job_name, timeout) = parse_timeout(timeout)?;
            config.set_timeout(&job_name, timeout)?;
        }
        config.validate()?;
        Ok(config)
    }
}

/// One request line on stdin.
#[derive(Deserialize, Debug)]
struct JobRequest {
    job: String,
    #[serde(default)]
    workload: Value,
}

/// Feed stdin requests into the queue and print each outcome as a JSON line.
async fn pump_stdin(submitter: LocalSubmitter) {
    let mut lines = LinesStream::new(BufReader::new(tokio::io::stdin()).lines());

    while let Some(line) = lines.next().await {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                tracing::error!(error = %e, "Failed to read stdin");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let request: JobRequest = match serde_json::from_str(&line) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(error = %e, line, "Skipping malformed job request");
                continue;
            }
        };

        let outcome_rx = match submitter.submit(request.job, request.workload).await {
            Ok(rx) => rx,
            Err(e) => {
                tracing::warn!(error = %e, "Worker stopped accepting jobs");
                break;
            }
        };

        match outcome_rx.await {
            Ok(outcome) => match serde_json::to_string(&outcome) {
                Ok(json) => println!("{}", json),
                Err(e) => tracing::error!(error = %e, "Failed to encode job outcome"),
            },
            // The worker stopped before answering.
            Err(_) => break,
        }
    }
}

async fn run_worker(args: WorkerArgs) -> Result<(), Box<dyn std::error::Error>> {
    let verbosity = LogLevel::from_verbosity(args.verbose);
    init_tracing(verbosity);

    let config = args.worker_config()?;
    let (queue, submitter) = LocalQueue::new();
    let queue = queue.with_idle_timeout(Duration::from_millis(args.idle_timeout_ms.max(1)));

    tracing::info!(
        servers = ?config.servers,
        jobs = ?config.registrations.iter().map(|r| r.job_name.as_str()).collect::<Vec<_>>(),
        limits = ?config.limits,
        "Starting job-harness worker"
    );

    let mut harness = Harness::with_collaborators(
        config,
        Box::new(builtin::catalog()),
        queue,
        Arc::new(TracingSink::new(verbosity)),
        Box::new(SignalTerminator),
    );

    let pump = tokio::spawn(pump_stdin(submitter));
    let served = harness.run().await;
    // Serving ended; pending requests have no one to answer them.
    pump.abort();
    served?;
    Ok(())
}

fn validate_workers(args: WorkerArgs) -> Result<(), Box<dyn std::error::Error>> {
    let verbosity = LogLevel::from_verbosity(args.verbose);
    init_tracing(verbosity);

    let config = args.worker_config()?;
    let jobs = config.registrations.len();
    let (queue, _submitter) = LocalQueue::new();
    let mut harness = Harness::with_collaborators(
        config,
        Box::new(builtin::catalog()),
        queue,
        Arc::new(TracingSink::new(verbosity)),
        Box::new(SignalTerminator),
    );
    harness.validate()?;
    println!("All {} registered jobs resolve to a handler.", jobs);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    match args.command {
        Commands::Run(worker_args) => run_worker(worker_args).await?,
        Commands::Validate(worker_args) => validate_workers(worker_args)?,
    }

    Ok(())
}
