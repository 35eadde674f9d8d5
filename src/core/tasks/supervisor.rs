// src/core/tasks/supervisor.rs

//! Fire-and-forget task supervision.

use crate::core::{MpdError, Result};
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{Instrument, Span, error};

/// Receives every error a supervised task ends with, except cancellation.
pub type ErrorHook = Arc<dyn Fn(&MpdError) + Send + Sync>;

/// The hook used when the client was built without one.
pub fn log_error_hook() -> ErrorHook {
    Arc::new(|e: &MpdError| error!("Background task failed: {}", e))
}

/// Runs `task` to completion in the background.
///
/// Ending with [`MpdError::Cancelled`] counts as a normal completion. Any
/// other error is handed to `hook` and never reaches whoever spawned the task.
pub fn spawn_supervised<F>(task: F, hook: ErrorHook, span: Span) -> JoinHandle<()>
where
    F: Future<Output = Result<()>> + Send + 'static,
{
    tokio::spawn(
        async move {
            match task.await {
                Ok(()) | Err(MpdError::Cancelled) => {}
                Err(e) => hook(&e),
            }
        }
        .instrument(span),
    )
}
