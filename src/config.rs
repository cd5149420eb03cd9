use std::collections::HashSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{HarnessError, Result};

pub const DEFAULT_SERVER: &str = "127.0.0.1:4730";

/// A job name bound to the source location that provides its handler.
///
/// Created once at startup from the worker list and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerRegistration {
    pub job_name: String,
    /// Location of the code unit that defines the handler.
    pub source: PathBuf,
    /// Passed to the queue client; the job fails if it runs longer.
    pub timeout: Option<Duration>,
}

impl HandlerRegistration {
    pub fn new(job_name: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            job_name: job_name.into(),
            source: source.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Parses `NAME=PATH`.
impl FromStr for HandlerRegistration {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self> {
        let (name, path) = s
            .split_once('=')
            .ok_or_else(|| HarnessError::Config(format!("expected NAME=PATH, got {:?}", s)))?;
        let name = name.trim();
        let path = path.trim();
        if name.is_empty() || path.is_empty() {
            return Err(HarnessError::Config(format!(
                "expected NAME=PATH, got {:?}",
                s
            )));
        }
        Ok(Self::new(name, path))
    }
}

/// Parses a per-function timeout given as `NAME=SECONDS`.
pub fn parse_timeout(s: &str) -> Result<(String, Duration)> {
    let (name, secs) = s
        .split_once('=')
        .ok_or_else(|| HarnessError::Config(format!("expected NAME=SECONDS, got {:?}", s)))?;
    let secs: u64 = secs
        .trim()
        .parse()
        .map_err(|_| HarnessError::Config(format!("invalid timeout seconds in {:?}", s)))?;
    Ok((name.trim().to_string(), Duration::from_secs(secs)))
}

/// Limits after which a worker stops serving and exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LifecycleLimits {
    /// Maximum wall-clock time since the worker started serving.
    pub max_run_time: Option<Duration>,
    /// Maximum number of job executions.
    pub max_runs_per_worker: Option<u64>,
}

impl LifecycleLimits {
    /// Build limits from CLI-style values where zero means unset.
    pub fn from_raw(max_run_time_secs: u64, max_runs_per_worker: u64) -> Self {
        Self {
            max_run_time: (max_run_time_secs > 0).then_some(Duration::from_secs(max_run_time_secs)),
            max_runs_per_worker: (max_runs_per_worker > 0).then_some(max_runs_per_worker),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Queue server addresses (host:port).
    pub servers: Vec<String>,
    /// Prepended to a job name to form the handler identifier.
    pub prefix: Option<String>,
    pub registrations: Vec<HandlerRegistration>,
    pub limits: LifecycleLimits,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            servers: vec![DEFAULT_SERVER.to_string()],
            prefix: None,
            registrations: Vec::new(),
            limits: LifecycleLimits::default(),
        }
    }
}

impl WorkerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_servers(mut self, servers: Vec<String>) -> Self {
        self.servers = servers;
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.prefix = if prefix.is_empty() { None } else { Some(prefix) };
        self
    }

    pub fn with_registration(mut self, registration: HandlerRegistration) -> Self {
        self.registrations.push(registration);
        self
    }

    pub fn with_limits(mut self, limits: LifecycleLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Attach a timeout to an already registered job.
    pub fn set_timeout(&mut self, job_name: &str, timeout: Duration) -> Result<()> {
        let registration = self
            .registrations
            .iter_mut()
            .find(|r| r.job_name == job_name)
            .ok_or_else(|| {
                HarnessError::Config(format!("timeout given for unknown job {}", job_name))
            })?;
        registration.timeout = Some(timeout);
        Ok(())
    }

    /// Reject configurations the worker cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.servers.is_empty() {
            return Err(HarnessError::Config("no queue servers configured".to_string()));
        }
        let mut seen = HashSet::new();
        for registration in &self.registrations {
            if !seen.insert(registration.job_name.as_str()) {
                return Err(HarnessError::Config(format!(
                    "job {} registered more than once",
                    registration.job_name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn worker_config_default() {
        let cfg = WorkerConfig::default();
        assert_eq!(cfg.servers, vec!["127.0.0.1:4730".to_string()]);
        assert!(cfg.prefix.is_none());
        assert!(cfg.registrations.is_empty());
        assert_eq!(cfg.limits, LifecycleLimits::default());
    }

    #[test]
    fn registration_parses_name_and_path() {
        let reg: HandlerRegistration = "resize=workers/images".parse().unwrap();
        assert_eq!(reg.job_name, "resize");
        assert_eq!(reg.source, PathBuf::from("workers/images"));
        assert!(reg.timeout.is_none());
    }

    #[test]
    fn registration_rejects_missing_parts() {
        assert!("resize".parse::<HandlerRegistration>().is_err());
        assert!("=workers/images".parse::<HandlerRegistration>().is_err());
        assert!("resize=".parse::<HandlerRegistration>().is_err());
    }

    #[test]
    fn timeout_parses_seconds() {
        let (name, timeout) = parse_timeout("resize=30").unwrap();
        assert_eq!(name, "resize");
        assert_eq!(timeout, Duration::from_secs(30));
        assert!(parse_timeout("resize=soon").is_err());
        assert!(parse_timeout("resize").is_err());
    }

    #[test]
    fn zero_limits_mean_unset() {
        assert_eq!(LifecycleLimits::from_raw(0, 0), LifecycleLimits::default());

        let limits = LifecycleLimits::from_raw(60, 5);
        assert_eq!(limits.max_run_time, Some(Duration::from_secs(60)));
        assert_eq!(limits.max_runs_per_worker, Some(5));
    }

    #[test]
    fn empty_prefix_is_no_prefix() {
        assert!(WorkerConfig::new().with_prefix("").prefix.is_none());
        assert_eq!(
            WorkerConfig::new().with_prefix("job_").prefix.as_deref(),
            Some("job_")
        );
    }

    #[test]
    fn set_timeout_requires_registered_job() {
        let mut cfg =
            WorkerConfig::new().with_registration(HandlerRegistration::new("echo", "builtin/echo"));
        cfg.set_timeout("echo", Duration::from_secs(5)).unwrap();
        assert_eq!(cfg.registrations[0].timeout, Some(Duration::from_secs(5)));
        assert!(cfg.set_timeout("missing", Duration::from_secs(5)).is_err());
    }

    #[test]
    fn validate_rejects_duplicate_jobs_and_missing_servers() {
        let dup = WorkerConfig::new()
            .with_registration(HandlerRegistration::new("echo", "a"))
            .with_registration(HandlerRegistration::new("echo", "b"));
        assert!(dup.validate().is_err());

        let no_servers = WorkerConfig::new().with_servers(Vec::new());
        assert!(no_servers.validate().is_err());

        assert!(WorkerConfig::new().validate().is_ok());
    }
}
