//! Image retrieval for the download phase.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use tracing::debug;
use url::Url;

use crate::analysis::AnalysisError;

const FALLBACK_MIME: &str = "application/octet-stream";

/// Raw image bytes with their MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    pub mime_type: String,
}

/// Resolves an image source to bytes.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, source: &str) -> Result<FetchedImage, AnalysisError>;
}

/// Fetches `http(s)://` URLs, `data:` URIs, `file://` URLs and local paths.
#[derive(Clone)]
pub struct HttpImageFetcher {
    client: Client,
}

impl HttpImageFetcher {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn fetch_url(&self, url: &Url) -> Result<FetchedImage, AnalysisError> {
        debug!("Fetching image {}", url);
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| AnalysisError::Fetch(e.to_string()))?;

        if !response.status().is_success() {
            return Err(AnalysisError::Fetch(format!("HTTP {}", response.status())));
        }

        let header_mime = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).trim().to_string());

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AnalysisError::Fetch(e.to_string()))?
            .to_vec();

        let mime_type = header_mime
            .filter(|m| m.starts_with("image/"))
            .unwrap_or_else(|| sniff_mime(&bytes, Some(Path::new(url.path()))));
        finish(bytes, mime_type)
    }

    async fn fetch_path(&self, path: &Path) -> Result<FetchedImage, AnalysisError> {
        debug!("Reading image {}", path.display());
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AnalysisError::Fetch(format!("{}: {}", path.display(), e)))?;
        let mime_type = sniff_mime(&bytes, Some(path));
        finish(bytes, mime_type)
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, source: &str) -> Result<FetchedImage, AnalysisError> {
        let source = source.trim();
        if source.starts_with("data:") {
            return decode_data_uri(source);
        }

        match Url::parse(source) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => self.fetch_url(&url).await,
            Ok(url) if url.scheme() == "file" => {
                let path = url
                    .to_file_path()
                    .map_err(|_| AnalysisError::Fetch(format!("invalid file URL: {}", source)))?;
                self.fetch_path(&path).await
            }
            // Bare paths, including Windows drive letters that parse as a scheme.
            _ => self.fetch_path(&PathBuf::from(source)).await,
        }
    }
}

fn finish(bytes: Vec<u8>, mime_type: String) -> Result<FetchedImage, AnalysisError> {
    if bytes.is_empty() {
        return Err(AnalysisError::Fetch("image is empty".to_string()));
    }
    Ok(FetchedImage { bytes, mime_type })
}

/// Content sniffing first, then the file extension.
fn sniff_mime(bytes: &[u8], path: Option<&Path>) -> String {
    if let Some(kind) = infer::get(bytes) {
        return kind.mime_type().to_string();
    }
    path.and_then(|p| mime_guess::from_path(p).first())
        .map(|m| m.essence_str().to_string())
        .unwrap_or_else(|| FALLBACK_MIME.to_string())
}

/// `data:<mime>;base64,<payload>`
fn decode_data_uri(uri: &str) -> Result<FetchedImage, AnalysisError> {
    let rest = &uri["data:".len()..];
    let (meta, payload) = rest
        .split_once(',')
        .ok_or_else(|| AnalysisError::Fetch("malformed data URI".to_string()))?;

    let mut parts = meta.split(';');
    let mime = parts.next().unwrap_or_default().trim();
    if !parts.any(|p| p.eq_ignore_ascii_case("base64")) {
        return Err(AnalysisError::Fetch(
            "only base64 data URIs are supported".to_string(),
        ));
    }

    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| AnalysisError::Fetch(format!("invalid base64 payload: {}", e)))?;

    let mime_type = if mime.is_empty() {
        sniff_mime(&bytes, None)
    } else {
        mime.to_string()
    };
    finish(bytes, mime_type)
}
