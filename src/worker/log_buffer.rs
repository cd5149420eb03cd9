use serde_json::Value;

/// Per-job log entries written by handler code.
///
/// Entries may be scalars or nested structures. The buffer is cleared when a
/// job starts and drained when its outcome is reported.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct JobLog {
    entries: Vec<Value>,
}

impl JobLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: impl Into<Value>) {
        self.entries.push(entry.into());
    }

    pub fn entries(&self) -> &[Value] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Take every entry, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<Value> {
        std::mem::take(&mut self.entries)
    }
}
