pub mod builtin;
pub mod config;
pub mod error;
pub mod harness;
pub mod logging;
pub mod process;
pub mod queue;
pub mod worker;

pub use error::{HarnessError, Result};
pub use harness::{Harness, WorkerCore};
