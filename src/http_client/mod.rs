//! HTTP plumbing: streaming provider requests and image downloads.
//!
//! Sessions only see the [`Transport`] / [`ByteStream`] and
//! [`ImageFetcher`] traits; the reqwest-backed implementations live here.

mod fetch;

pub use fetch::{FetchedImage, HttpImageFetcher, ImageFetcher};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

use crate::provider::ProviderRequest;

/// User agent sent with every request.
pub const USER_AGENT: &str = concat!("inspo/", env!("CARGO_PKG_VERSION"));

/// Errors from opening or reading a response stream.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// Server answered with a non-2xx status.
    #[error("HTTP {status} {reason}")]
    Status {
        status: u16,
        reason: String,
        body: String,
    },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// A response body being read chunk by chunk.
#[async_trait]
pub trait ByteStream: Send {
    /// Next chunk; `None` once the body is exhausted or aborted.
    async fn next_chunk(&mut self) -> Option<Result<Bytes, TransportError>>;

    /// Drop the underlying transfer so the connection is released now.
    fn abort(&mut self);
}

/// Something that can send a [`ProviderRequest`] and stream the answer.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn open(&self, request: ProviderRequest) -> Result<Box<dyn ByteStream>, TransportError>;
}

/// reqwest-backed transport.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

fn header_map(headers: &[(String, String)]) -> Result<HeaderMap, TransportError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| TransportError::InvalidRequest(format!("header {}: {}", name, e)))?;
        // Credentials end up here, so the value is never echoed into errors.
        let mut value = HeaderValue::from_str(value)
            .map_err(|_| TransportError::InvalidRequest(format!("invalid value for header {}", name)))?;
        if name == reqwest::header::AUTHORIZATION || name.as_str() == "x-goog-api-key" {
            value.set_sensitive(true);
        }
        map.insert(name, value);
    }
    Ok(map)
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn open(&self, request: ProviderRequest) -> Result<Box<dyn ByteStream>, TransportError> {
        let headers = header_map(&request.headers)?;

        debug!("POST {}", request.url);
        let response = self
            .client
            .post(&request.url)
            .headers(headers)
            .json(&request.body)
            .send()
            .await
            .map_err(|e| TransportError::Connection(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or("Unknown").to_string();
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                reason,
                body,
            });
        }

        Ok(Box::new(ReqwestByteStream {
            inner: Some(response.bytes_stream().boxed()),
        }))
    }
}

/// Body stream of a reqwest response. Aborting drops the stream, which
/// closes the connection.
pub struct ReqwestByteStream {
    inner: Option<BoxStream<'static, reqwest::Result<Bytes>>>,
}

#[async_trait]
impl ByteStream for ReqwestByteStream {
    async fn next_chunk(&mut self) -> Option<Result<Bytes, TransportError>> {
        let stream = self.inner.as_mut()?;
        match stream.next().await? {
            Ok(bytes) => Some(Ok(bytes)),
            Err(e) => Some(Err(TransportError::Connection(e.to_string()))),
        }
    }

    fn abort(&mut self) {
        if self.inner.take().is_some() {
            debug!("Response stream aborted");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_map_marks_credentials_sensitive() {
        let map = header_map(&[
            ("Content-Type".to_string(), "application/json".to_string()),
            ("Authorization".to_string(), "Bearer secret".to_string()),
            ("x-goog-api-key".to_string(), "secret".to_string()),
        ])
        .unwrap();
        assert!(!map["content-type"].is_sensitive());
        assert!(map["authorization"].is_sensitive());
        assert!(map["x-goog-api-key"].is_sensitive());
    }

    #[test]
    fn test_header_map_rejects_bad_value_without_leaking_it() {
        let err = header_map(&[("Authorization".to_string(), "Bearer a\nb".to_string())])
            .unwrap_err();
        assert!(!err.to_string().contains("Bearer"));
    }

    #[tokio::test]
    async fn test_aborted_stream_yields_nothing() {
        let chunks: Vec<reqwest::Result<Bytes>> = vec![Ok(Bytes::from_static(b"data: x\n"))];
        let mut stream = ReqwestByteStream {
            inner: Some(futures::stream::iter(chunks).boxed()),
        };
        stream.abort();
        assert!(stream.next_chunk().await.is_none());
    }
}
