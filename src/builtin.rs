//! Handler code units compiled into the `job-harness` binary.
//!
//! | Location       | Defines                                   |
//! |----------------|-------------------------------------------|
//! | `builtin/echo` | function `echo`                           |
//! | `builtin/text` | runnable type `reverse`, function `word_count` |
//! | `builtin/fail` | function `fail`                           |

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::config::HandlerRegistration;
use crate::worker::handler::{BoxError, Catalog, CodeUnit, JobHandler};
use crate::worker::log_buffer::JobLog;

pub fn catalog() -> Catalog {
    Catalog::new()
        .with_unit("builtin/echo", echo_unit)
        .with_unit("builtin/text", text_unit)
        .with_unit("builtin/fail", fail_unit)
}

/// Registrations for every built-in job.
pub fn registrations() -> Vec<HandlerRegistration> {
    vec![
        HandlerRegistration::new("echo", "builtin/echo"),
        HandlerRegistration::new("reverse", "builtin/text"),
        HandlerRegistration::new("word_count", "builtin/text"),
        HandlerRegistration::new("fail", "builtin/fail"),
    ]
}

fn echo_unit() -> CodeUnit {
    CodeUnit::new().with_function("echo", echo)
}

fn text_unit() -> CodeUnit {
    CodeUnit::new()
        .with_runnable("reverse", new_reverse)
        .with_function("word_count", word_count)
}

fn new_reverse() -> Box<dyn JobHandler> {
    Box::new(Reverse::default())
}

fn fail_unit() -> CodeUnit {
    CodeUnit::new().with_function("fail", fail)
}

fn echo(workload: &Value, _log: &mut JobLog) -> Result<Value, BoxError> {
    Ok(workload.clone())
}

fn text_of(workload: &Value) -> Result<&str, BoxError> {
    workload
        .as_str()
        .ok_or_else(|| format!("expected a string workload, got {}", workload).into())
}

fn word_count(workload: &Value, log: &mut JobLog) -> Result<Value, BoxError> {
    let text = text_of(workload)?;
    let words = text.split_whitespace().count();
    let lines = text.lines().count();
    log.push(format!("counted {} words", words));
    Ok(json!({ "words": words, "lines": lines, "chars": text.chars().count() }))
}

fn fail(workload: &Value, log: &mut JobLog) -> Result<Value, BoxError> {
    log.push("failing on request");
    let message = workload.as_str().unwrap_or("job failed on request");
    Err(message.to_string().into())
}

/// Reverses text and remembers how many jobs it has served.
#[derive(Debug, Default)]
struct Reverse {
    served: u64,
}

#[async_trait]
impl JobHandler for Reverse {
    async fn run(&mut self, workload: &Value, log: &mut JobLog) -> Result<Value, BoxError> {
        let text = text_of(workload)?;
        self.served += 1;
        log.push(format!("reverse call #{}", self.served));
        Ok(Value::String(text.chars().rev().collect()))
    }
}
