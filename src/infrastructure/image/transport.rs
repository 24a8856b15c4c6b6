//! Default image transports.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::TryStreamExt;
use tokio::io::AsyncReadExt;
use tracing::{debug, trace};

use crate::domain::entities::Scheme;
use crate::domain::errors::LoadError;
use crate::domain::ports::{ExtraParams, ImageStream, Transport};

/// Default connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(20);

/// Opens `http(s)://` URIs with reqwest and `file://` or bare paths from the filesystem.
#[derive(Debug, Clone)]
pub struct BaseTransport {
    client: reqwest::Client,
}

impl BaseTransport {
    /// Creates a transport with the given timeouts.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be created.
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Result<Self, LoadError> {
        let client = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .read_timeout(read_timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LoadError::io(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { client })
    }

    /// Wraps an existing client.
    #[must_use]
    pub const fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn open_network(
        &self,
        uri: &str,
        extra: Option<&ExtraParams>,
    ) -> Result<Option<ImageStream>, LoadError> {
        let mut request = self.client.get(uri);
        if let Some(headers) = extra {
            for (name, value) in headers {
                request = request.header(name.as_str(), value.as_str());
            }
        }

        let response = request
            .send()
            .await
            .map_err(|e| LoadError::io(format!("Request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(LoadError::io(format!(
                "HTTP {}: {}",
                response.status(),
                response.status().canonical_reason().unwrap_or("Unknown")
            )));
        }

        let length = response.content_length();
        debug!(uri, length = ?length, "Opened network stream");
        let body = response.bytes_stream().map_err(std::io::Error::other);
        Ok(Some(ImageStream::new(
            tokio_util::io::StreamReader::new(body),
            length,
        )))
    }

    async fn open_file(path: &Path) -> Result<Option<ImageStream>, LoadError> {
        let file = tokio::fs::File::open(path).await?;
        let length = file.metadata().await?.len();
        trace!(path = %path.display(), length, "Opened file stream");
        Ok(Some(ImageStream::new(file, Some(length))))
    }
}

#[async_trait]
impl Transport for BaseTransport {
    async fn open(
        &self,
        uri: &str,
        extra: Option<&ExtraParams>,
    ) -> Result<Option<ImageStream>, LoadError> {
        match Scheme::of(uri) {
            Scheme::Http | Scheme::Https => self.open_network(uri, extra).await,
            Scheme::File => Self::open_file(Path::new(Scheme::File.crop(uri))).await,
            Scheme::Unknown if Path::new(uri).is_absolute() => {
                Self::open_file(Path::new(uri)).await
            }
            Scheme::Unknown => Err(LoadError::unsupported_scheme(uri)),
        }
    }
}

/// Refuses network URIs while delegating everything else.
pub struct NetworkDeniedTransport {
    inner: Arc<dyn Transport>,
}

impl NetworkDeniedTransport {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn Transport>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Transport for NetworkDeniedTransport {
    async fn open(
        &self,
        uri: &str,
        extra: Option<&ExtraParams>,
    ) -> Result<Option<ImageStream>, LoadError> {
        if Scheme::of(uri).is_remote() {
            return Err(LoadError::network_denied(uri));
        }
        self.inner.open(uri, extra).await
    }
}

/// Reads network bodies fully before handing them on.
///
/// Used on slow links so a stalled connection fails the fetch instead of the decoder.
pub struct SlowNetworkTransport {
    inner: Arc<dyn Transport>,
}

impl SlowNetworkTransport {
    /// Wraps `inner`.
    #[must_use]
    pub fn new(inner: Arc<dyn Transport>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl Transport for SlowNetworkTransport {
    async fn open(
        &self,
        uri: &str,
        extra: Option<&ExtraParams>,
    ) -> Result<Option<ImageStream>, LoadError> {
        let Some(mut stream) = self.inner.open(uri, extra).await? else {
            return Ok(None);
        };
        if !Scheme::of(uri).is_remote() {
            return Ok(Some(stream));
        }
        let capacity = stream
            .length()
            .and_then(|len| usize::try_from(len).ok())
            .unwrap_or_default();
        let mut body = Vec::with_capacity(capacity);
        stream.reader().read_to_end(&mut body).await?;
        trace!(uri, size = body.len(), "Buffered network body");
        Ok(Some(ImageStream::from_bytes(Bytes::from(body))))
    }
}
