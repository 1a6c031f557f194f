//! Unit of deferred work.

use async_trait::async_trait;

/// A side effect executed by a dispatcher worker.
///
/// Failures are logged by the worker and then dropped. Nothing a job does
/// may be required for settlement correctness.
#[async_trait]
pub trait Job: Send + 'static {
    /// Short name used in log lines
    fn name(&self) -> &'static str;

    async fn execute(self: Box<Self>) -> anyhow::Result<()>;
}
