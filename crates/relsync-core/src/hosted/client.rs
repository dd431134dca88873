//! Typed client for the hosted release API.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::StreamExt;
use relsync_schema::{Channel, PackageId, ReleaseFilename, Version};
use reqwest::header::{AUTHORIZATION, CONTENT_DISPOSITION};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use super::{AuthProvider, HostedError, ReleaseGroup, ReleaseGroupState};
use crate::reporter::{Reporter, percent};

/// Role of an uploaded file within a release group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// Full or delta package.
    Release,
    /// Installer or portable bundle.
    Installer,
}

impl FileType {
    fn as_str(self) -> &'static str {
        match self {
            Self::Release => "Release",
            Self::Installer => "Installer",
        }
    }
}

/// The previously published full package, downloaded as a delta base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BaseRelease {
    /// Filename reported by the server.
    pub filename: String,
    /// Its version.
    pub version: Version,
    /// Where it was saved.
    pub path: PathBuf,
}

/// HTTP client for one hosted service.
///
/// Every call checks for a credential first and fails with
/// [`HostedError::AuthenticationRequired`] without touching the network.
#[derive(Clone)]
pub struct HostedClient {
    http: Client,
    base_url: String,
    auth: Arc<dyn AuthProvider>,
}

impl std::fmt::Debug for HostedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostedClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HostedClient {
    /// Client for the service at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`HostedError::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: &str, auth: Arc<dyn AuthProvider>) -> Result<Self, HostedError> {
        let http = Client::builder().user_agent(crate::USER_AGENT).build()?;
        let mut base_url = base_url.to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Ok(Self {
            http,
            base_url,
            auth,
        })
    }

    /// Fail early when no credential is configured.
    ///
    /// # Errors
    ///
    /// Returns [`HostedError::AuthenticationRequired`].
    pub fn require_auth(&self) -> Result<(), HostedError> {
        self.auth
            .credential()
            .map(|_| ())
            .ok_or(HostedError::AuthenticationRequired)
    }

    fn request(&self, method: reqwest::Method, endpoint: &str) -> Result<RequestBuilder, HostedError> {
        let credential = self
            .auth
            .credential()
            .ok_or(HostedError::AuthenticationRequired)?;
        debug!(%method, endpoint, "Hosted API request");
        Ok(self
            .http
            .request(method, format!("{}{endpoint}", self.base_url))
            .header(AUTHORIZATION, credential.header_value()))
    }

    async fn check(endpoint: &str, response: Response) -> Result<Response, HostedError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(HostedError::Api {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
            body,
        })
    }

    async fn json<T: DeserializeOwned>(endpoint: &str, response: Response) -> Result<T, HostedError> {
        Ok(Self::check(endpoint, response).await?.json().await?)
    }

    /// Create `channel` for `package_id`; an existing channel is fine.
    ///
    /// # Errors
    ///
    /// Returns [`HostedError`] for any status other than success or 409.
    pub async fn create_channel_if_not_exists(
        &self,
        package_id: &PackageId,
        channel: &Channel,
    ) -> Result<(), HostedError> {
        let endpoint = "v1/channels/create";
        let response = self
            .request(reqwest::Method::POST, endpoint)?
            .json(&json!({ "packageId": package_id.as_str(), "name": channel.as_str() }))
            .send()
            .await?;
        if response.status() == StatusCode::CONFLICT {
            debug!(channel = %channel, "Channel already exists");
            return Ok(());
        }
        Self::check(endpoint, response).await?;
        Ok(())
    }

    /// Create a draft release group.
    ///
    /// # Errors
    ///
    /// Returns [`HostedError`] on a transport or API failure.
    pub async fn create_release_group(
        &self,
        package_id: &PackageId,
        version: &Version,
        channel: &Channel,
    ) -> Result<ReleaseGroup, HostedError> {
        let endpoint = "v1/releaseGroups/create";
        let response = self
            .request(reqwest::Method::POST, endpoint)?
            .json(&json!({
                "packageId": package_id.as_str(),
                "version": version.to_string(),
                "channel": channel.as_str(),
            }))
            .send()
            .await?;
        let group: ReleaseGroup = Self::json(endpoint, response).await?;
        info!(id = %group.id, %version, "Created release group");
        Ok(group)
    }

    /// Change a release group's state.
    ///
    /// # Errors
    ///
    /// Returns [`HostedError`] on a transport or API failure.
    pub async fn update_release_group(
        &self,
        id: &str,
        state: ReleaseGroupState,
    ) -> Result<ReleaseGroup, HostedError> {
        let endpoint = format!("v1/releaseGroups/{id}");
        let response = self
            .request(reqwest::Method::PUT, &endpoint)?
            .json(&json!({ "state": state }))
            .send()
            .await?;
        Self::json(&endpoint, response).await
    }

    /// Fetch a release group with its upload status.
    ///
    /// # Errors
    ///
    /// Returns [`HostedError`] on a transport or API failure.
    pub async fn get_release_group(&self, id: &str) -> Result<ReleaseGroup, HostedError> {
        let endpoint = format!("v1/releaseGroups/{id}");
        let response = self.request(reqwest::Method::GET, &endpoint)?.send().await?;
        Self::json(&endpoint, response).await
    }

    /// Upload one file into a release group, streaming it from disk and
    /// reporting progress under the file's name.
    ///
    /// # Errors
    ///
    /// Returns [`HostedError`] on an I/O, transport or API failure.
    pub async fn upload_file(
        &self,
        group_id: &str,
        file_type: FileType,
        path: &Path,
        reporter: Arc<dyn Reporter>,
    ) -> Result<(), HostedError> {
        let endpoint = "v1/releases/upload";
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file = tokio::fs::File::open(path).await?;
        let total = file.metadata().await?.len();

        let sent = Arc::new(AtomicU64::new(0));
        let task = filename.clone();
        let stream = ReaderStream::new(file).map(move |chunk| {
            if let Ok(bytes) = &chunk {
                let now = sent.fetch_add(bytes.len() as u64, Ordering::Relaxed) + bytes.len() as u64;
                reporter.progress(&task, percent(now, total));
            }
            chunk
        });

        let part = Part::stream_with_length(Body::wrap_stream(stream), total)
            .file_name(filename.clone())
            .mime_str("application/octet-stream")?;
        let form = Form::new()
            .text("ReleaseGroupId", group_id.to_string())
            .text("FileType", file_type.as_str())
            .part("File", part);

        let response = self
            .request(reqwest::Method::POST, endpoint)?
            .multipart(form)
            .send()
            .await?;
        Self::check(endpoint, response).await?;
        info!(filename, "Uploaded");
        Ok(())
    }

    /// Download the newest published full package of a channel into `dest`.
    ///
    /// Returns `Ok(None)` when the channel has no releases yet. The version
    /// is read from the attachment filename in `Content-Disposition`.
    ///
    /// # Errors
    ///
    /// Returns [`HostedError`] on a transport, API or I/O failure, or
    /// [`HostedError::Format`] if the filename is missing or malformed.
    pub async fn download_latest_full(
        &self,
        package_id: &PackageId,
        channel: &Channel,
        dest: &Path,
    ) -> Result<Option<BaseRelease>, HostedError> {
        let endpoint = format!("v1/releases/{package_id}/{channel}/download-latest");
        let response = self.request(reqwest::Method::GET, &endpoint)?.send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(%channel, "No previous release");
            return Ok(None);
        }
        let response = Self::check(&endpoint, response).await?;

        let filename = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(attachment_filename)
            .unwrap_or_default();
        let name = ReleaseFilename::parse(&filename)?;

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;

        Ok(Some(BaseRelease {
            filename,
            version: name.version,
            path: dest.to_path_buf(),
        }))
    }
}

/// Extract `filename` from a `Content-Disposition` header value.
fn attachment_filename(header: &str) -> Option<String> {
    header.split(';').find_map(|part| {
        let (key, value) = part.trim().split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("filename")
            .then(|| value.trim().trim_matches('"').to_string())
    })
}
