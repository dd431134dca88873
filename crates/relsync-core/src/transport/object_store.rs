//! S3-compatible object storage (AWS S3, Cloudflare R2, MinIO) via `opendal`.

use async_trait::async_trait;
use bytes::Bytes;
use opendal::{ErrorKind, Metakey, Operator, services::S3};

use super::{Downloadable, PutOptions, RemoteObject, TransportError, Uploadable};
use crate::config::StoreConfig;

/// Transport backed by an S3-compatible bucket.
#[derive(Debug, Clone)]
pub struct ObjectStoreTransport {
    op: Operator,
}

impl ObjectStoreTransport {
    /// Connect to the bucket described by `config`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Backend`] if the operator cannot be built.
    pub fn new(config: &StoreConfig) -> Result<Self, TransportError> {
        let mut builder = S3::default();
        builder.bucket(&config.bucket);
        builder.endpoint(&config.endpoint);
        builder.access_key_id(&config.access_key);
        builder.secret_access_key(&config.secret_key);
        builder.region(config.region.as_deref().unwrap_or("auto"));
        if let Some(root) = &config.root {
            builder.root(root);
        }
        Ok(Self {
            op: Operator::new(builder)?.finish(),
        })
    }

    /// Wrap an existing operator (any `opendal` service works).
    pub fn from_operator(op: Operator) -> Self {
        Self { op }
    }
}

#[async_trait]
impl Downloadable for ObjectStoreTransport {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, TransportError> {
        match self.op.read(key).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Uploadable for ObjectStoreTransport {
    async fn put(&self, key: &str, body: Bytes, options: PutOptions) -> Result<(), TransportError> {
        if options.no_cache {
            self.op.write_with(key, body).cache_control("no-cache").await?;
        } else {
            self.op.write(key, body).await?;
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), TransportError> {
        match self.op.delete(key).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>, TransportError> {
        // Release artifacts live flat at the root, so list it once and filter here
        let entries = self
            .op
            .list_with("/")
            .metakey(Metakey::Mode | Metakey::Etag | Metakey::LastModified | Metakey::ContentLength)
            .await?;

        Ok(entries
            .into_iter()
            .filter(|e| !e.metadata().is_dir() && e.name().starts_with(prefix))
            .map(|e| {
                let meta = e.metadata();
                RemoteObject {
                    key: e.name().to_string(),
                    etag: meta.etag().map(str::to_string),
                    last_modified: meta.last_modified(),
                    size: Some(meta.content_length()),
                }
            })
            .collect())
    }
}
