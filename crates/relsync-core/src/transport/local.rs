//! A plain directory acting as the remote.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use relsync_schema::Md5Hash;
use tokio::fs;

use super::{Downloadable, PutOptions, RemoteObject, TransportError, Uploadable};

/// Stores objects as files directly under `root`.
///
/// Keys are bare filenames. Writes go to a temporary sibling first and are
/// renamed into place, so readers never observe a half-written object.
#[derive(Debug, Clone)]
pub struct LocalDirTransport {
    root: PathBuf,
}

impl LocalDirTransport {
    /// Use `root` as the remote directory. It is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The directory backing this transport.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, key: &str) -> Result<PathBuf, TransportError> {
        if key.is_empty() || key.contains(['/', '\\']) || key == "." || key == ".." {
            return Err(TransportError::Unavailable(format!("invalid object key '{key}'")));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl Downloadable for LocalDirTransport {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, TransportError> {
        match fs::read(self.path(key)?).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl Uploadable for LocalDirTransport {
    async fn put(&self, key: &str, body: Bytes, _options: PutOptions) -> Result<(), TransportError> {
        let target = self.path(key)?;
        fs::create_dir_all(&self.root).await?;
        let tmp = self.root.join(format!(".{key}.tmp"));
        fs::write(&tmp, &body).await?;
        fs::rename(&tmp, &target).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), TransportError> {
        match fs::remove_file(self.path(key)?).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>, TransportError> {
        let mut dir = match fs::read_dir(&self.root).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut objects = Vec::new();
        while let Some(item) = dir.next_entry().await? {
            let Ok(name) = item.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') || !name.starts_with(prefix) {
                continue;
            }
            let meta = item.metadata().await?;
            if !meta.is_file() {
                continue;
            }
            let path = item.path();
            let md5 = tokio::task::spawn_blocking(move || Md5Hash::compute_file(&path))
                .await
                .map_err(|e| TransportError::Unavailable(e.to_string()))??;
            objects.push(RemoteObject {
                key: name,
                etag: Some(format!("\"{md5}\"")),
                last_modified: meta.modified().ok().map(DateTime::<Utc>::from),
                size: Some(meta.len()),
            });
        }
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn missing_object_is_none() {
        let dir = tempdir().unwrap();
        let remote = LocalDirTransport::new(dir.path().join("remote"));
        assert!(remote.get("RELEASES").await.unwrap().is_none());
        assert!(remote.list("").await.unwrap().is_empty());
        remote.delete("RELEASES").await.unwrap();
    }

    #[tokio::test]
    async fn put_then_list_reports_md5_etag() {
        let dir = tempdir().unwrap();
        let remote = LocalDirTransport::new(dir.path());
        remote
            .put("MyApp-1.0.0-full.nupkg", Bytes::from_static(b"hello world"), PutOptions::default())
            .await
            .unwrap();
        remote
            .put("other.txt", Bytes::from_static(b"x"), PutOptions::index())
            .await
            .unwrap();

        let listed = remote.list("MyApp").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].size, Some(11));
        assert!(
            Md5Hash::compute(b"hello world").matches_etag(listed[0].etag.as_deref().unwrap())
        );
        assert!(listed[0].last_modified.is_some());
    }

    #[tokio::test]
    async fn rejects_path_like_keys() {
        let dir = tempdir().unwrap();
        let remote = LocalDirTransport::new(dir.path());
        assert!(remote.get("../escape").await.is_err());
    }
}
