//! Publishing to a hosted release service.
//!
//! The service groups all files of one version into a release group that is
//! created as a draft, filled by concurrent uploads and then published.

use relsync_schema::{FormatError, Version};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::delta::DeltaError;

mod auth;
mod client;
mod orchestrator;

pub use auth::{AuthProvider, AuthScheme, Credential, StaticAuth};
pub use client::{BaseRelease, FileType, HostedClient};
pub use orchestrator::{PollPolicy, PublishOutcome, PublishRequest, ReleaseGroupOrchestrator};

/// Errors from the hosted backend.
#[derive(Error, Debug)]
pub enum HostedError {
    /// No credential is available; nothing was sent.
    #[error("Not authenticated. Provide an API key before publishing.")]
    AuthenticationRequired,

    /// The channel already holds a version at least as new as the one being published.
    #[error("Latest version in channel is {latest}, which is not older than {new}")]
    VersionOrder {
        /// Newest version already published.
        latest: Version,
        /// Version being published.
        new: Version,
    },

    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API answered with an error status.
    #[error("{endpoint} failed with status {status}: {body}")]
    Api {
        /// Endpoint path.
        endpoint: String,
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// Delta generation failed.
    #[error("Delta error: {0}")]
    Codec(#[from] DeltaError),

    /// Local filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A package or response name was malformed.
    #[error("Format error: {0}")]
    Format(#[from] FormatError),

    /// An upload task panicked or was aborted.
    #[error("Upload task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// The publish was cancelled.
    #[error("Publish cancelled")]
    Cancelled,
}

/// Visibility of a release group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReleaseGroupState {
    /// Created, not visible to clients.
    Draft,
    /// Visible to clients.
    Published,
    /// Hidden after publishing.
    Unlisted,
}

/// Processing state of one uploaded file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileUpload {
    /// Uploaded filename.
    #[serde(default)]
    pub file_name: Option<String>,
    /// Server-side status (`uploading`, `processing`, `processed`).
    #[serde(default)]
    pub status: Option<String>,
}

impl FileUpload {
    /// Whether the server has finished processing this file.
    pub fn is_processed(&self) -> bool {
        self.status
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case("processed"))
    }
}

/// A release group as returned by the API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseGroup {
    /// Server-assigned id.
    pub id: String,
    /// Version the group holds.
    #[serde(default)]
    pub version: Option<String>,
    /// Current state.
    #[serde(default)]
    pub state: Option<ReleaseGroupState>,
    /// Per-file processing state, when requested.
    #[serde(default)]
    pub file_uploads: Option<Vec<FileUpload>>,
}
