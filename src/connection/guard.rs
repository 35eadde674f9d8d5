// src/connection/guard.rs

//! Defines `TransportGuard`, an RAII guard for the I/O tasks of one transport.

use tokio::task::JoinHandle;
use tracing::debug;

/// Owns the reader and writer tasks of a physical connection and aborts them
/// when the transport is torn down, so a stale connection can never feed
/// replies into a newer one.
pub(crate) struct TransportGuard {
    tasks: Vec<JoinHandle<()>>,
}

impl TransportGuard {
    pub(crate) fn new(tasks: Vec<JoinHandle<()>>) -> Self {
        Self { tasks }
    }
}

impl Drop for TransportGuard {
    fn drop(&mut self) {
        let live = self.tasks.iter().filter(|t| !t.is_finished()).count();
        if live > 0 {
            debug!("TransportGuard dropping, aborting {} I/O task(s)", live);
        }
        for task in &self.tasks {
            task.abort();
        }
    }
}
