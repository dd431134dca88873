//! Ordered upload and download of release sets.
//!
//! Uploads always land artifacts before the index that references them, so a
//! client reading the remote index never sees an entry whose file is missing.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use relsync_schema::{Channel, FormatError};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::merge::MergeError;
use crate::reporter::{Reporter, TracingReporter};
use crate::retry::{RetryError, RetryPolicy, retry};
use crate::transport::TransportError;

mod download;
mod release_dir;
mod upload;

pub use download::{DownloadOutcome, download_latest};
pub use release_dir::{LocalRelease, read_release_dir};
pub use upload::{UploadOptions, UploadReport, upload_release_set};

/// Errors that abort a pipeline run.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A required remote operation failed on every attempt.
    #[error("{op} '{key}' failed after {attempts} attempt(s): {source}")]
    Transport {
        /// Operation name (`get`, `put`, `list`, `delete`).
        op: &'static str,
        /// Object key.
        key: String,
        /// Attempts made.
        attempts: u32,
        /// Last transport error.
        #[source]
        source: TransportError,
    },

    /// The run was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// An index or manifest could not be parsed or encoded.
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    /// Local and remote entries cannot be merged.
    #[error("Merge error: {0}")]
    Merge(#[from] MergeError),

    /// Local filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A downloaded artifact does not match its index entry.
    #[error("Checksum mismatch for {filename}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Artifact filename.
        filename: String,
        /// SHA1 (and size) from the index.
        expected: String,
        /// What was actually received.
        actual: String,
    },

    /// The release directory contains no full package for the channel.
    #[error("No full release found in {}", .0.display())]
    NoLocalReleases(PathBuf),

    /// The index references an artifact the remote does not have.
    #[error("Artifact '{0}' is listed in the index but missing from the remote")]
    MissingArtifact(String),

    /// A blocking hashing task panicked.
    #[error("Background task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Shared settings for one pipeline run.
#[derive(Clone)]
pub struct SyncContext {
    /// Channel being synchronized.
    pub channel: Channel,
    /// Retry policy for remote operations.
    pub retry: RetryPolicy,
    /// Cooperative cancellation.
    pub cancel: CancellationToken,
    /// Progress sink.
    pub reporter: Arc<dyn Reporter>,
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("channel", &self.channel)
            .field("retry", &self.retry)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl SyncContext {
    /// Context with default retries, a fresh token and tracing output.
    pub fn new(channel: Channel) -> Self {
        Self {
            channel,
            retry: RetryPolicy::default(),
            cancel: CancellationToken::new(),
            reporter: Arc::new(TracingReporter),
        }
    }

    /// Replace the retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Replace the cancellation token.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Replace the progress sink.
    pub fn with_reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Run a remote operation under this context's retry policy.
    pub(crate) async fn remote<T, F, Fut>(
        &self,
        op: &'static str,
        key: &str,
        f: F,
    ) -> Result<T, PipelineError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        retry(&self.retry, &self.cancel, &format!("{op} {key}"), f)
            .await
            .map_err(|e| match e {
                RetryError::Cancelled => PipelineError::Cancelled,
                RetryError::Exhausted { attempts, source } => PipelineError::Transport {
                    op,
                    key: key.to_string(),
                    attempts,
                    source,
                },
            })
    }
}

/// Write via a temporary sibling and rename, so readers never see a partial file.
pub(crate) async fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));
    tokio::fs::write(&tmp, data).await?;
    tokio::fs::rename(&tmp, path).await
}
