//! Progress notifications emitted while waiting on an agent.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use relay_core::types::{AgentId, AgentStatus};
use serde::Serialize;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressUpdate {
    pub agent_id: AgentId,
    pub elapsed: Duration,
    pub status: AgentStatus,
}

impl ProgressUpdate {
    pub fn elapsed_secs(&self) -> u64 {
        self.elapsed.as_secs()
    }

    pub fn describe(&self) -> String {
        format!(
            "agent {} {} ({}s elapsed)",
            self.agent_id,
            self.status.as_str().to_ascii_lowercase(),
            self.elapsed_secs()
        )
    }
}

#[derive(Debug, thiserror::Error)]
#[error("progress notification failed: {message}")]
pub struct ProgressError {
    pub message: String,
}

impl ProgressError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Receives periodic status while a wait is in flight. Failures never affect
/// the wait itself.
#[async_trait]
pub trait ProgressNotifier: Send + Sync {
    async fn notify(&self, update: &ProgressUpdate) -> Result<(), ProgressError>;
}

/// Adapts an async closure into a [`ProgressNotifier`].
pub struct FnNotifier<F> {
    callback: F,
}

impl<F> FnNotifier<F> {
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

#[async_trait]
impl<F, Fut> ProgressNotifier for FnNotifier<F>
where
    F: Fn(ProgressUpdate) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), ProgressError>> + Send,
{
    async fn notify(&self, update: &ProgressUpdate) -> Result<(), ProgressError> {
        (self.callback)(update.clone()).await
    }
}

/// Writes one line per update to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrNotifier;

#[async_trait]
impl ProgressNotifier for StderrNotifier {
    async fn notify(&self, update: &ProgressUpdate) -> Result<(), ProgressError> {
        eprintln!("{}", update.describe());
        Ok(())
    }
}

/// Runs the notifier under `limit`. Errors and timeouts are logged only.
pub(crate) async fn deliver(
    notifier: &dyn ProgressNotifier,
    update: &ProgressUpdate,
    limit: Duration,
) {
    match tokio::time::timeout(limit, notifier.notify(update)).await {
        Ok(Ok(())) => {
            debug!(agent_id = %update.agent_id, elapsed_secs = update.elapsed_secs(), "progress delivered");
        }
        Ok(Err(err)) => {
            warn!(agent_id = %update.agent_id, error = %err, "progress notifier failed");
        }
        Err(_) => {
            warn!(
                agent_id = %update.agent_id,
                timeout_secs = limit.as_secs(),
                "progress notifier timed out"
            );
        }
    }
}
