//! Read-only HTTP mirror.

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, StatusCode};
use relsync_schema::ReleaseEntry;
use tracing::debug;

use super::{Downloadable, TransportError};

/// Fetches objects from `{base_url}{key}` over HTTP(S).
///
/// Entries that carry their own `base_url` or `query` are fetched from
/// exactly that location, so an index can point at a CDN.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// Mirror rooted at `base_url`. A trailing `/` is added if missing.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        let client = Client::builder().user_agent(crate::USER_AGENT).build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Mirror using a caller-configured client.
    pub fn with_client(client: Client, base_url: &str) -> Self {
        let mut base_url = base_url.to_string();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Self { client, base_url }
    }

    /// The normalized base URL.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn fetch(&self, url: &str) -> Result<Option<Bytes>, TransportError> {
        debug!(url, "GET");
        let response = self.client.get(url).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.bytes().await?)),
            status => Err(TransportError::Status {
                key: url.to_string(),
                status: status.as_u16(),
            }),
        }
    }
}

#[async_trait]
impl Downloadable for HttpTransport {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, TransportError> {
        self.fetch(&format!("{}{key}", self.base_url)).await
    }

    async fn get_entry(&self, entry: &ReleaseEntry) -> Result<Option<Bytes>, TransportError> {
        let url = format!(
            "{}{}{}",
            entry.base_url().unwrap_or(&self.base_url),
            entry.filename(),
            entry.query().unwrap_or_default()
        );
        self.fetch(&url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Server;
    use relsync_schema::Sha1Hash;

    #[tokio::test]
    async fn get_maps_404_to_none() {
        let mut server = Server::new_async().await;
        let _index = server
            .mock("GET", "/RELEASES")
            .with_status(200)
            .with_body("index body")
            .create_async()
            .await;
        let _missing = server
            .mock("GET", "/RELEASES-beta")
            .with_status(404)
            .create_async()
            .await;

        let mirror = HttpTransport::new(&server.url()).unwrap();
        assert_eq!(mirror.get("RELEASES").await.unwrap().unwrap(), "index body");
        assert!(mirror.get("RELEASES-beta").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn requests_carry_the_user_agent() {
        let mut server = Server::new_async().await;
        let index = server
            .mock("GET", "/RELEASES")
            .match_header("user-agent", crate::USER_AGENT)
            .with_status(200)
            .with_body("index body")
            .expect(1)
            .create_async()
            .await;

        let mirror = HttpTransport::new(&server.url()).unwrap();
        assert!(mirror.get("RELEASES").await.unwrap().is_some());
        index.assert_async().await;
    }

    #[tokio::test]
    async fn server_errors_are_reported() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/RELEASES")
            .with_status(503)
            .create_async()
            .await;

        let mirror = HttpTransport::new(&server.url()).unwrap();
        let err = mirror.get("RELEASES").await.unwrap_err();
        assert!(matches!(err, TransportError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn entry_origin_and_query_are_honored() {
        let mut server = Server::new_async().await;
        let _m = server
            .mock("GET", "/cdn/MyApp-1.0.0-full.nupkg")
            .match_query(mockito::Matcher::UrlEncoded("token".into(), "abc".into()))
            .with_status(200)
            .with_body("package")
            .create_async()
            .await;

        let entry = ReleaseEntry::new("MyApp-1.0.0-full.nupkg", Sha1Hash::compute(b"package"), 7)
            .unwrap()
            .with_origin(
                Some(format!("{}/cdn/", server.url())),
                Some("?token=abc".to_string()),
            );

        let mirror = HttpTransport::new("http://unused.invalid").unwrap();
        assert_eq!(mirror.get_entry(&entry).await.unwrap().unwrap(), "package");
    }
}
