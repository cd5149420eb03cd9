//! Log levels and the logging sink the worker reports through.
//!
//! Every message the core emits goes through a [`LogSink`] so the process can
//! decide where it ends up. [`TracingSink`] forwards to `tracing`;
//! [`MemorySink`] keeps records in memory for assertions.

use std::fmt;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

/// Verbosity levels, ordered from always-shown to most chatty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Error,
    Info,
    ProcInfo,
    WorkerInfo,
    Debug,
    Crazy,
}

impl LogLevel {
    /// Map a `-v` repetition count to the most verbose level that is shown.
    pub fn from_verbosity(count: u8) -> Self {
        match count {
            0 => LogLevel::Info,
            1 => LogLevel::ProcInfo,
            2 => LogLevel::WorkerInfo,
            3 => LogLevel::Debug,
            _ => LogLevel::Crazy,
        }
    }

    /// The `tracing` filter directive needed to see messages at this level.
    pub fn filter_directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Info | LogLevel::ProcInfo | LogLevel::WorkerInfo => "info",
            LogLevel::Debug => "debug",
            LogLevel::Crazy => "trace",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Error => write!(f, "error"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::ProcInfo => write!(f, "proc_info"),
            LogLevel::WorkerInfo => write!(f, "worker_info"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Crazy => write!(f, "crazy"),
        }
    }
}

/// Destination for worker log messages.
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);
}

/// Forwards messages to `tracing`, dropping anything above `verbosity`.
#[derive(Debug, Clone, Copy)]
pub struct TracingSink {
    verbosity: LogLevel,
}

impl TracingSink {
    pub fn new(verbosity: LogLevel) -> Self {
        Self { verbosity }
    }
}

impl Default for TracingSink {
    fn default() -> Self {
        Self::new(LogLevel::Info)
    }
}

impl LogSink for TracingSink {
    fn log(&self, level: LogLevel, message: &str) {
        if level > self.verbosity {
            return;
        }
        match level {
            LogLevel::Error => tracing::error!(log_level = %level, "{}", message),
            LogLevel::Info | LogLevel::ProcInfo | LogLevel::WorkerInfo => {
                tracing::info!(log_level = %level, "{}", message)
            }
            LogLevel::Debug => tracing::debug!(log_level = %level, "{}", message),
            LogLevel::Crazy => tracing::trace!(log_level = %level, "{}", message),
        }
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<(LogLevel, String)>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records in arrival order.
    pub fn records(&self) -> Vec<(LogLevel, String)> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Messages logged at exactly `level`.
    pub fn messages_at(&self, level: LogLevel) -> Vec<String> {
        self.records()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, message)| message)
            .collect()
    }

    /// Whether any message contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.records()
            .iter()
            .any(|(_, message)| message.contains(needle))
    }

    pub fn clear(&self) {
        if let Ok(mut records) = self.records.lock() {
            records.clear();
        }
    }
}

impl LogSink for MemorySink {
    fn log(&self, level: LogLevel, message: &str) {
        if let Ok(mut records) = self.records.lock() {
            records.push((level, message.to_string()));
        }
    }
}

/// Install the process-wide `tracing` subscriber.
///
/// `RUST_LOG` takes precedence; otherwise the filter follows `verbosity`.
pub fn init_tracing(verbosity: LogLevel) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(verbosity.filter_directive())),
        )
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_are_ordered_by_verbosity() {
        assert!(LogLevel::Error < LogLevel::Info);
        assert!(LogLevel::WorkerInfo < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Crazy);
    }

    #[test]
    fn verbosity_count_maps_to_levels() {
        assert_eq!(LogLevel::from_verbosity(0), LogLevel::Info);
        assert_eq!(LogLevel::from_verbosity(2), LogLevel::WorkerInfo);
        assert_eq!(LogLevel::from_verbosity(3), LogLevel::Debug);
        assert_eq!(LogLevel::from_verbosity(9), LogLevel::Crazy);
    }

    #[test]
    fn memory_sink_records_in_order() {
        let sink = MemorySink::new();
        sink.log(LogLevel::WorkerInfo, "first");
        sink.log(LogLevel::Debug, "second");

        assert_eq!(
            sink.records(),
            vec![
                (LogLevel::WorkerInfo, "first".to_string()),
                (LogLevel::Debug, "second".to_string()),
            ]
        );
        assert_eq!(sink.messages_at(LogLevel::Debug), vec!["second".to_string()]);
        assert!(sink.contains("fir"));

        sink.clear();
        assert!(sink.records().is_empty());
    }
}
