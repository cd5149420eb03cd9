use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::HandlerRegistration;
use crate::error::{HarnessError, Result};
use crate::logging::{LogLevel, LogSink};
use crate::worker::handler::{CodeUnit, ResolvedHandler, SourceLoader};

/// Resolves job names to handlers.
///
/// Each source location is loaded at most once and its symbols are merged into
/// one table shared by every job. A handler, once resolved, is cached and
/// reused for the life of the registry.
pub struct HandlerRegistry {
    registrations: Vec<HandlerRegistration>,
    prefix: Option<String>,
    loader: Box<dyn SourceLoader>,
    loaded: HashSet<PathBuf>,
    symbols: CodeUnit,
    resolved: HashMap<String, ResolvedHandler>,
    sink: Arc<dyn LogSink>,
}

impl HandlerRegistry {
    pub fn new(
        registrations: Vec<HandlerRegistration>,
        prefix: Option<String>,
        loader: Box<dyn SourceLoader>,
        sink: Arc<dyn LogSink>,
    ) -> Self {
        Self {
            registrations,
            prefix,
            loader,
            loaded: HashSet::new(),
            symbols: CodeUnit::new(),
            resolved: HashMap::new(),
            sink,
        }
    }

    pub fn registration(&self, job_name: &str) -> Option<&HandlerRegistration> {
        self.registrations.iter().find(|r| r.job_name == job_name)
    }

    /// The identifier a job's handler is looked up under.
    pub fn identifier_for(&self, job_name: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}{}", prefix, job_name),
            None => job_name.to_string(),
        }
    }

    pub fn is_resolved(&self, job_name: &str) -> bool {
        self.resolved.contains_key(job_name)
    }

    pub fn resolved_count(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_loaded(&self, location: &Path) -> bool {
        self.loaded.contains(location)
    }

    /// Return the handler for `job_name`, resolving and caching it on first use.
    ///
    /// # Errors
    ///
    /// - [`HarnessError::UnregisteredJob`] if no registration names the job.
    /// - [`HarnessError::Load`] if its source location cannot be loaded.
    /// - [`HarnessError::HandlerNotFound`] if the loaded code defines neither a
    ///   runnable type nor a function under the job's identifier.
    pub fn resolve(&mut self, job_name: &str) -> Result<&mut ResolvedHandler> {
        if !self.resolved.contains_key(job_name) {
            let handler = self.create_handler(job_name)?;
            self.resolved.insert(job_name.to_string(), handler);
        }
        self.resolved
            .get_mut(job_name)
            .ok_or_else(|| HarnessError::Internal(format!("handler for {} vanished", job_name)))
    }

    fn create_handler(&mut self, job_name: &str) -> Result<ResolvedHandler> {
        let identifier = self.identifier_for(job_name);
        let source = self
            .registration(job_name)
            .map(|r| r.source.clone())
            .ok_or_else(|| HarnessError::UnregisteredJob {
                job_name: job_name.to_string(),
                identifier: identifier.clone(),
            })?;

        self.ensure_defined(&identifier, &source)?;

        if let Some(factory) = self.symbols.runnable(&identifier) {
            self.sink.log(
                LogLevel::WorkerInfo,
                &format!("Creating a {} object", identifier),
            );
            Ok(ResolvedHandler::Stateful(factory()))
        } else if let Some(function) = self.symbols.function(&identifier) {
            self.sink.log(
                LogLevel::WorkerInfo,
                &format!("Using function {} for {}", identifier, job_name),
            );
            Ok(ResolvedHandler::Function(function))
        } else {
            Err(HarnessError::HandlerNotFound {
                job_name: job_name.to_string(),
                identifier,
                path: source,
            })
        }
    }

    /// Load `location` unless an earlier load already defined a handler under
    /// `identifier`.
    fn ensure_defined(&mut self, identifier: &str, location: &Path) -> Result<()> {
        let defined = self.symbols.runnable(identifier).is_some()
            || self.symbols.function(identifier).is_some();
        if defined {
            return Ok(());
        }
        self.load(location)
    }

    fn load(&mut self, location: &Path) -> Result<()> {
        if self.loaded.contains(location) {
            return Ok(());
        }
        let unit = self.loader.load(location)?;
        self.sink.log(
            LogLevel::Debug,
            &format!("Loaded handler source {}", location.display()),
        );
        self.symbols.absorb(unit);
        self.loaded.insert(location.to_path_buf());
        Ok(())
    }

    /// Check every registration before the worker serves anything.
    ///
    /// Loads each source location whose handler is not yet defined and
    /// requires a function or runnable type under the job's identifier. Stops
    /// at the first failure, which is logged at error level; the caller treats
    /// it as fatal.
    pub fn validate_all(&mut self) -> Result<()> {
        let registrations = self.registrations.clone();
        for registration in &registrations {
            let identifier = self.identifier_for(&registration.job_name);
            if let Err(e) = self.ensure_defined(&identifier, &registration.source) {
                self.sink.log(LogLevel::Error, &e.to_string());
                return Err(e);
            }
            let runnable = self.symbols.runnable(&identifier).is_some();
            let function = self.symbols.function(&identifier).is_some();
            if !runnable && !function {
                let err = HarnessError::HandlerNotFound {
                    job_name: registration.job_name.clone(),
                    identifier,
                    path: registration.source.clone(),
                };
                self.sink.log(LogLevel::Error, &err.to_string());
                return Err(err);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::MemorySink;
    use crate::worker::handler::{BoxError, Catalog};
    use crate::worker::log_buffer::JobLog;
    use serde_json::Value;

    fn echo(workload: &Value, _: &mut JobLog) -> std::result::Result<Value, BoxError> {
        Ok(workload.clone())
    }

    fn registry(prefix: Option<&str>) -> (HandlerRegistry, Arc<MemorySink>) {
        let sink = Arc::new(MemorySink::new());
        let catalog = Catalog::new()
            .with_unit("workers/echo", || {
                CodeUnit::new()
                    .with_function("echo", echo)
                    .with_function("job_echo", echo)
            });
        let registry = HandlerRegistry::new(
            vec![HandlerRegistration::new("echo", "workers/echo")],
            prefix.map(str::to_string),
            Box::new(catalog),
            sink.clone(),
        );
        (registry, sink)
    }

    #[test]
    fn identifier_applies_prefix() {
        let (plain, _) = registry(None);
        let (prefixed, _) = registry(Some("job_"));
        assert_eq!(plain.identifier_for("echo"), "echo");
        assert_eq!(prefixed.identifier_for("echo"), "job_echo");
    }

    #[test]
    fn resolve_caches_function_handler() {
        let (mut registry, _) = registry(Some("job_"));
        assert!(!registry.resolve("echo").unwrap().is_stateful());
        assert!(registry.is_resolved("echo"));
        assert!(registry.is_loaded(Path::new("workers/echo")));
    }

    #[test]
    fn unregistered_job_leaves_cache_untouched() {
        let (mut registry, _) = registry(None);
        let err = registry.resolve("resize").unwrap_err();
        assert!(matches!(err, HarnessError::UnregisteredJob { .. }));
        assert_eq!(registry.resolved_count(), 0);
    }
}
