//! Subcommand implementations.

pub mod completions;
pub mod download;
pub mod publish;
pub mod resolve;
pub mod upload;

use std::sync::Arc;

use relsync_core::TracingReporter;
use relsync_core::config::SyncConfig;
use relsync_core::pipeline::SyncContext;
use tokio_util::sync::CancellationToken;

/// Pipeline context for the configured channel and retry policy.
pub fn sync_context(config: &SyncConfig, cancel: CancellationToken) -> SyncContext {
    SyncContext::new(config.channel())
        .with_retry(config.retry_policy())
        .with_cancel(cancel)
        .with_reporter(Arc::new(TracingReporter))
}
