//! Network access to the update artifact
//!
//! [`UpdateSource`] is the seam between the engine and HTTP: a metadata-only
//! probe plus a streamed transfer. [`HttpSource`] is the reqwest-backed
//! implementation used outside of tests.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, ETAG, HeaderMap, HeaderName};

use crate::error::TransportError;

// Download timeout constants
const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
const PROBE_TIMEOUT: Duration = Duration::from_secs(60);

/// Response metadata shared by probes and transfers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteMetadata {
    /// Final URL after redirects
    pub url: String,
    pub status: u16,
    pub content_length: Option<u64>,
    pub etag: String,
    /// File name suggested by `Content-Disposition`
    pub file_name: Option<String>,
}

impl RemoteMetadata {
    #[inline]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A transfer whose headers have arrived and whose body is still streaming.
///
/// Dropping the transfer cancels it.
#[async_trait]
pub trait Transfer: Send {
    fn metadata(&self) -> &RemoteMetadata;

    /// Next body chunk, `None` once the body is complete.
    ///
    /// Must be cancel-safe: the download loop drops pending calls on its
    /// progress tick and polls again.
    async fn chunk(&mut self) -> Result<Option<Bytes>, TransportError>;
}

/// Where update artifacts come from
#[async_trait]
pub trait UpdateSource: Send + Sync {
    /// Metadata-only probe (HTTP `HEAD`).
    async fn head(&self, url: &str) -> Result<RemoteMetadata, TransportError>;

    /// Start a streamed `GET`.
    async fn get(&self, url: &str) -> Result<Box<dyn Transfer>, TransportError>;
}

/// reqwest-backed [`UpdateSource`]
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
}

impl HttpSource {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .user_agent(concat!("autoupdated/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

struct HttpTransfer {
    response: reqwest::Response,
    metadata: RemoteMetadata,
}

#[async_trait]
impl Transfer for HttpTransfer {
    fn metadata(&self) -> &RemoteMetadata {
        &self.metadata
    }

    async fn chunk(&mut self) -> Result<Option<Bytes>, TransportError> {
        Ok(self.response.chunk().await?)
    }
}

#[async_trait]
impl UpdateSource for HttpSource {
    async fn head(&self, url: &str) -> Result<RemoteMetadata, TransportError> {
        let response = self
            .client
            .head(url)
            .timeout(PROBE_TIMEOUT)
            .send()
            .await?;
        // reqwest reports the (empty) body size for HEAD, so trust the header only
        Ok(metadata_from(
            response.url().as_str(),
            response.status().as_u16(),
            response.headers(),
            None,
        ))
    }

    async fn get(&self, url: &str) -> Result<Box<dyn Transfer>, TransportError> {
        let response = self.client.get(url).send().await?;
        let metadata = metadata_from(
            response.url().as_str(),
            response.status().as_u16(),
            response.headers(),
            response.content_length(),
        );
        Ok(Box::new(HttpTransfer { response, metadata }))
    }
}

fn metadata_from(
    url: &str,
    status: u16,
    headers: &HeaderMap,
    body_length: Option<u64>,
) -> RemoteMetadata {
    let header = move |name: HeaderName| headers.get(name).and_then(|v| v.to_str().ok());

    RemoteMetadata {
        url: url.to_string(),
        status,
        content_length: header(CONTENT_LENGTH)
            .and_then(|v| v.trim().parse().ok())
            .or(body_length),
        etag: header(ETAG).unwrap_or_default().to_string(),
        file_name: header(CONTENT_DISPOSITION).and_then(disposition_file_name),
    }
}

/// `filename` parameter of a `Content-Disposition` header, reduced to a bare name.
pub(crate) fn disposition_file_name(value: &str) -> Option<String> {
    let raw = value.split(';').map(str::trim).find_map(|param| {
        let (key, val) = param.split_once('=')?;
        key.trim()
            .eq_ignore_ascii_case("filename")
            .then(|| val.trim().trim_matches('"'))
    })?;

    // Never let the server pick a directory
    let name = raw.rsplit(['/', '\\']).next()?.trim();
    (!name.is_empty() && name != "." && name != "..").then(|| name.to_string())
}
