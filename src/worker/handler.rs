use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{HarnessError, Result};
use crate::worker::log_buffer::JobLog;

/// Error type handler code returns; any `std::error::Error` converts into it.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A handler object with state that survives across jobs.
///
/// One instance is created per job name the first time the job is resolved
/// and reused for every later job of that name.
#[async_trait]
pub trait JobHandler: Send {
    async fn run(
        &mut self,
        workload: &Value,
        log: &mut JobLog,
    ) -> std::result::Result<Value, BoxError>;
}

/// A stateless handler.
pub type HandlerFn = fn(&Value, &mut JobLog) -> std::result::Result<Value, BoxError>;

/// Produces a fresh handler object for a runnable type.
pub type HandlerFactory = fn() -> Box<dyn JobHandler>;

/// A handler selected for a job name, cached for the life of the worker.
pub enum ResolvedHandler {
    Stateful(Box<dyn JobHandler>),
    Function(HandlerFn),
}

impl ResolvedHandler {
    pub fn is_stateful(&self) -> bool {
        matches!(self, ResolvedHandler::Stateful(_))
    }
}

impl fmt::Debug for ResolvedHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedHandler::Stateful(_) => write!(f, "ResolvedHandler::Stateful"),
            ResolvedHandler::Function(_) => write!(f, "ResolvedHandler::Function"),
        }
    }
}

/// The symbols a loaded source location defines.
///
/// Types and functions live in separate namespaces. A type is only usable as
/// a handler when it has a `run` capability, i.e. it was registered with a
/// factory.
#[derive(Debug, Default, Clone)]
pub struct CodeUnit {
    types: HashMap<String, Option<HandlerFactory>>,
    functions: HashMap<String, HandlerFn>,
}

impl CodeUnit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Define a type that can run jobs.
    pub fn with_runnable(mut self, identifier: impl Into<String>, factory: HandlerFactory) -> Self {
        self.types.insert(identifier.into(), Some(factory));
        self
    }

    /// Define a type without a `run` capability.
    pub fn with_plain_type(mut self, identifier: impl Into<String>) -> Self {
        self.types.insert(identifier.into(), None);
        self
    }

    pub fn with_function(mut self, identifier: impl Into<String>, function: HandlerFn) -> Self {
        self.functions.insert(identifier.into(), function);
        self
    }

    pub fn has_type(&self, identifier: &str) -> bool {
        self.types.contains_key(identifier)
    }

    pub fn runnable(&self, identifier: &str) -> Option<HandlerFactory> {
        self.types.get(identifier).copied().flatten()
    }

    pub fn function(&self, identifier: &str) -> Option<HandlerFn> {
        self.functions.get(identifier).copied()
    }

    pub fn defines(&self, identifier: &str) -> bool {
        self.has_type(identifier) || self.functions.contains_key(identifier)
    }

    /// Merge another unit's symbols into this one. Earlier definitions win.
    pub fn absorb(&mut self, other: CodeUnit) {
        for (identifier, factory) in other.types {
            self.types.entry(identifier).or_insert(factory);
        }
        for (identifier, function) in other.functions {
            self.functions.entry(identifier).or_insert(function);
        }
    }
}

/// Loads the code unit found at a source location.
pub trait SourceLoader: Send {
    fn load(&mut self, location: &Path) -> Result<CodeUnit>;
}

/// A loader over code units compiled into the binary, keyed by path.
#[derive(Default, Clone)]
pub struct Catalog {
    units: HashMap<PathBuf, fn() -> CodeUnit>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unit(mut self, location: impl Into<PathBuf>, build: fn() -> CodeUnit) -> Self {
        self.units.insert(location.into(), build);
        self
    }
}

impl SourceLoader for Catalog {
    fn load(&mut self, location: &Path) -> Result<CodeUnit> {
        let build = self.units.get(location).ok_or_else(|| HarnessError::Load {
            path: location.to_path_buf(),
            reason: "no such source location".to_string(),
        })?;
        Ok(build())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: &Value, _: &mut JobLog) -> std::result::Result<Value, BoxError> {
        Ok(Value::Null)
    }

    fn other(_: &Value, _: &mut JobLog) -> std::result::Result<Value, BoxError> {
        Ok(Value::Bool(true))
    }

    #[test]
    fn plain_types_are_not_runnable() {
        let unit = CodeUnit::new().with_plain_type("Thumbnail");
        assert!(unit.has_type("Thumbnail"));
        assert!(unit.defines("Thumbnail"));
        assert!(unit.runnable("Thumbnail").is_none());
    }

    #[test]
    fn types_and_functions_have_separate_namespaces() {
        let unit = CodeUnit::new()
            .with_plain_type("resize")
            .with_function("resize", noop);
        assert!(unit.has_type("resize"));
        assert!(unit.function("resize").is_some());
        assert!(unit.runnable("resize").is_none());
    }

    #[test]
    fn absorb_keeps_earlier_definitions() {
        let mut table = CodeUnit::new().with_function("resize", noop);
        table.absorb(
            CodeUnit::new()
                .with_function("resize", other)
                .with_function("crop", other),
        );

        let resize = table.function("resize").unwrap();
        let mut log = JobLog::new();
        assert_eq!(resize(&Value::Null, &mut log).unwrap(), Value::Null);
        assert!(table.function("crop").is_some());
    }

    #[test]
    fn catalog_loads_known_locations_only() {
        let mut catalog = Catalog::new().with_unit("workers/resize", || {
            CodeUnit::new().with_function("resize", noop)
        });

        let unit = catalog.load(Path::new("workers/resize")).unwrap();
        assert!(unit.function("resize").is_some());

        let err = catalog.load(Path::new("workers/missing")).unwrap_err();
        assert!(matches!(err, HarnessError::Load { .. }));
    }
}
