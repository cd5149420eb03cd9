//! Formatting of job log entries and results, and the start/complete/fail
//! callbacks that write them to the log sink.

use std::sync::Arc;

use serde_json::Value;

use crate::error::HarnessError;
use crate::logging::{LogLevel, LogSink};
use crate::worker::log_buffer::JobLog;

/// Longest scalar rendered in full, in characters.
pub const MAX_SCALAR_LEN: usize = 256;

pub const TRUNCATION_MARKER: &str = "...(truncated)";

/// A value ready for the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rendered {
    /// A scalar, truncated when too long.
    Line(String),
    /// A structure dumped over several lines.
    Block(Vec<String>),
}

impl Rendered {
    /// Log lines for this value, each prefixed with `prefix`.
    pub fn lines(&self, prefix: &str) -> Vec<String> {
        match self {
            Rendered::Line(line) => vec![format!("{}{}", prefix, line)],
            Rendered::Block(lines) => lines
                .iter()
                .map(|line| format!("{}{}", prefix, line))
                .collect(),
        }
    }
}

pub fn truncate(text: &str) -> String {
    match text.char_indices().nth(MAX_SCALAR_LEN) {
        Some((cut, _)) => format!("{}{}", &text[..cut], TRUNCATION_MARKER),
        None => text.to_string(),
    }
}

/// Apply the scalar/structure rule to `value`.
pub fn render(value: &Value) -> Rendered {
    match value {
        Value::Null => Rendered::Line(String::new()),
        Value::String(s) => Rendered::Line(truncate(s)),
        Value::Bool(b) => Rendered::Line(b.to_string()),
        Value::Number(n) => Rendered::Line(truncate(&n.to_string())),
        Value::Array(_) | Value::Object(_) => {
            let dump = serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string());
            Rendered::Block(dump.trim().lines().map(str::to_string).collect())
        }
    }
}

/// Writes job lifecycle events to the log sink.
pub struct OutcomeReporter {
    sink: Arc<dyn LogSink>,
}

impl OutcomeReporter {
    pub fn new(sink: Arc<dyn LogSink>) -> Self {
        Self { sink }
    }

    pub fn on_start(&self, handle: &str, job_name: &str, args: &Value, log: &mut JobLog) {
        self.sink.log(
            LogLevel::WorkerInfo,
            &format!("({}) Starting Job: {}", handle, job_name),
        );
        self.sink
            .log(LogLevel::Debug, &format!("({}) Workload: {}", handle, args));
        log.clear();
    }

    pub fn on_complete(&self, handle: &str, job_name: &str, result: Option<&Value>, log: &mut JobLog) {
        self.sink.log(
            LogLevel::WorkerInfo,
            &format!("({}) Completed Job: {}", handle, job_name),
        );
        self.log_outcome(handle, result, log);
    }

    pub fn on_fail(&self, handle: &str, job_name: &str, error: &HarnessError, log: &mut JobLog) {
        self.sink.log(
            LogLevel::WorkerInfo,
            &format!("({}) Failed Job: {}: {}", handle, job_name, error),
        );
        let error = Value::String(error.to_string());
        self.log_outcome(handle, Some(&error), log);
    }

    /// Drain the job's buffered entries, then the result.
    ///
    /// A job that produced no result (`None`, e.g. its handler could not be
    /// resolved) gets no result line at all. A `null` result still logs an
    /// empty line under the handle.
    fn log_outcome(&self, handle: &str, result: Option<&Value>, log: &mut JobLog) {
        let prefix = format!("({}) ", handle);
        for entry in log.drain() {
            for line in render(&entry).lines(&prefix) {
                self.sink.log(LogLevel::WorkerInfo, &line);
            }
        }
        if let Some(result) = result {
            for line in render(result).lines(&prefix) {
                self.sink.log(LogLevel::Debug, &line);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn short_scalars_pass_through() {
        assert_eq!(render(&json!("done")), Rendered::Line("done".to_string()));
        assert_eq!(render(&json!(42)), Rendered::Line("42".to_string()));
        assert_eq!(render(&json!(true)), Rendered::Line("true".to_string()));
        assert_eq!(render(&Value::Null), Rendered::Line(String::new()));
    }

    #[test]
    fn boundary_length_is_not_truncated() {
        let exact = "x".repeat(MAX_SCALAR_LEN);
        assert_eq!(truncate(&exact), exact);
    }

    #[test]
    fn long_scalars_are_truncated_to_limit_plus_marker() {
        let long = "y".repeat(MAX_SCALAR_LEN + 1);
        let out = truncate(&long);
        assert_eq!(out, format!("{}{}", "y".repeat(MAX_SCALAR_LEN), TRUNCATION_MARKER));
    }

    #[test]
    fn truncation_counts_characters() {
        let long = "é".repeat(300);
        let out = truncate(&long);
        assert_eq!(
            out.trim_end_matches(TRUNCATION_MARKER).chars().count(),
            MAX_SCALAR_LEN
        );
    }

    #[test]
    fn structures_render_one_line_per_dump_line() {
        let rendered = render(&json!({"width": 10}));
        assert_eq!(
            rendered.lines("(H:1) "),
            vec![
                "(H:1) {".to_string(),
                "(H:1)   \"width\": 10".to_string(),
                "(H:1) }".to_string(),
            ]
        );
    }
}
