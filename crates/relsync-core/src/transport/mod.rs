//! Remote object transports.
//!
//! The pipeline never talks to a concrete backend. It depends only on two
//! capabilities: [`Downloadable`] (read-only mirrors) and [`Uploadable`]
//! (stores that can also write, delete and list).

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use relsync_schema::ReleaseEntry;
use thiserror::Error;

pub mod local;
pub mod memory;

#[cfg(feature = "network")]
pub mod http;
#[cfg(feature = "object-store")]
pub mod object_store;

pub use local::LocalDirTransport;
pub use memory::{MemoryTransport, TransportCall};

#[cfg(feature = "network")]
pub use http::HttpTransport;
#[cfg(feature = "object-store")]
pub use object_store::ObjectStoreTransport;

/// Transport-level failure. Every variant is treated as transient and retried.
#[derive(Error, Debug)]
pub enum TransportError {
    /// Local filesystem error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client error.
    #[cfg(feature = "network")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Object storage backend error.
    #[cfg(feature = "object-store")]
    #[error("Storage error: {0}")]
    Backend(#[from] opendal::Error),

    /// The remote answered with an unexpected status code.
    #[error("Unexpected status {status} for '{key}'")]
    Status {
        /// Object key or URL that was requested.
        key: String,
        /// HTTP status code.
        status: u16,
    },

    /// The backend is temporarily unable to serve the request.
    #[error("Remote unavailable: {0}")]
    Unavailable(String),
}

/// One object as reported by a listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    /// Object key (a bare filename for release artifacts).
    pub key: String,
    /// Store-reported ETag, usually the quoted MD5 of the content.
    pub etag: Option<String>,
    /// Last modification time, if the backend reports it.
    pub last_modified: Option<DateTime<Utc>>,
    /// Content length in bytes, if known.
    pub size: Option<u64>,
}

/// Per-upload options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PutOptions {
    /// Ask caches and CDNs not to cache the object (used for index files).
    pub no_cache: bool,
}

impl PutOptions {
    /// Options for index artifacts, which must never be served stale.
    pub fn index() -> Self {
        Self { no_cache: true }
    }
}

/// Read capability: fetch objects by key.
#[async_trait]
pub trait Downloadable: Send + Sync {
    /// Fetch an object. A missing object is `Ok(None)`, not an error.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, TransportError>;

    /// Fetch the artifact for a release entry.
    ///
    /// Backends that understand absolute URLs override this to honor the
    /// entry's `base_url` and `query`.
    async fn get_entry(&self, entry: &ReleaseEntry) -> Result<Option<Bytes>, TransportError> {
        self.get(entry.filename()).await
    }
}

/// Write capability: store, remove and enumerate objects.
#[async_trait]
pub trait Uploadable: Downloadable {
    /// Store `body` under `key`, replacing any existing object.
    async fn put(&self, key: &str, body: Bytes, options: PutOptions) -> Result<(), TransportError>;

    /// Remove `key`. Deleting a missing object succeeds.
    async fn delete(&self, key: &str) -> Result<(), TransportError>;

    /// List objects whose key starts with `prefix`.
    async fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>, TransportError>;
}
