use crate::error::HarnessError;

/// Process-level actions the worker cannot take on its own.
pub trait ProcessControl: Send + Sync {
    /// End the whole process after a fatal startup failure.
    ///
    /// Implementations for a real process do not return.
    fn fatal_terminate(&self, reason: &HarnessError);
}

/// Terminates the current process by signalling itself with `SIGUSR2`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignalTerminator;

impl ProcessControl for SignalTerminator {
    fn fatal_terminate(&self, reason: &HarnessError) {
        tracing::error!(error = %reason, "Fatal startup failure, terminating worker");
        // SAFETY: getpid and kill have no memory-safety preconditions.
        let rc = unsafe { libc::kill(libc::getpid(), libc::SIGUSR2) };
        if rc != 0 {
            tracing::error!(
                error = %std::io::Error::last_os_error(),
                "Failed to signal self, exiting"
            );
        }
        std::process::exit(1);
    }
}
