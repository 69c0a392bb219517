use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::window::parse_duration_str;

#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub redirect_limit: usize,
    pub max_bytes: u64,
    /// Disk cache location. `None` disables caching entirely.
    pub cache_dir: Option<PathBuf>,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            redirect_limit: 5,
            max_bytes: 50 * 1024 * 1024,
            cache_dir: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("invalid url {url}: {message}")]
    InvalidUrl { url: String, message: String },
    #[error("http status {status} for {url}")]
    HttpStatus {
        status: u16,
        url: String,
        /// Error response body, kept for provider-specific error inspection
        /// (e.g. WordPress pagination-boundary detection).
        body: String,
    },
    #[error("timeout fetching {0}")]
    Timeout(String),
    #[error("redirect limit exceeded fetching {0}")]
    RedirectLimitExceeded(String),
    #[error("response too large (max {max_bytes} bytes) for {url}")]
    TooLarge { max_bytes: u64, url: String },
    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },
    #[error("cache io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct CachedResponse {
    pub body: Vec<u8>,
    pub content_type: Option<String>,
}

/// The external cached-HTTP primitive the Fetcher delegates to.
///
/// `duration` is a compact duration string (`"4h"`, `"0s"`); entries younger
/// than the duration are served from cache without a network round-trip.
#[async_trait]
pub trait CachedClient: Send + Sync {
    async fn get(
        &self,
        url: &str,
        duration: &str,
        headers: &[(String, String)],
    ) -> Result<CachedResponse, ClientError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheMeta {
    url: String,
    content_type: Option<String>,
}

/// reqwest-backed implementation with an mtime-based disk cache.
#[derive(Debug)]
pub struct HttpCache {
    settings: ClientSettings,
    client: reqwest::Client,
}

impl HttpCache {
    pub fn new(settings: ClientSettings) -> Result<Self, ClientError> {
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .redirect(reqwest::redirect::Policy::limited(settings.redirect_limit))
            .build()
            .map_err(|err| ClientError::Network {
                url: String::new(),
                message: err.to_string(),
            })?;
        Ok(Self { settings, client })
    }

    fn cache_paths(&self, url: &str) -> Option<(PathBuf, PathBuf)> {
        let dir = self.settings.cache_dir.as_ref()?;
        let mut hex = String::with_capacity(40);
        for byte in Sha256::digest(url.as_bytes()).iter().take(20) {
            use std::fmt::Write;
            let _ = write!(&mut hex, "{byte:02x}");
        }
        Some((dir.join(format!("{hex}.bin")), dir.join(format!("{hex}.json"))))
    }

    fn read_cache(&self, url: &str, duration: &str) -> Option<CachedResponse> {
        let max_age = parse_duration_str(duration).ok()?.to_std().ok()?;
        if max_age.is_zero() {
            return None;
        }
        let (body_path, meta_path) = self.cache_paths(url)?;
        let age = fs::metadata(&body_path).ok()?.modified().ok()?.elapsed().ok()?;
        if age > max_age {
            return None;
        }
        let body = fs::read(&body_path).ok()?;
        let meta: CacheMeta = serde_json::from_slice(&fs::read(&meta_path).ok()?).ok()?;
        Some(CachedResponse {
            body,
            content_type: meta.content_type,
        })
    }

    fn write_cache(&self, url: &str, response: &CachedResponse) -> Result<(), ClientError> {
        let Some((body_path, meta_path)) = self.cache_paths(url) else {
            return Ok(());
        };
        if let Some(parent) = body_path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&body_path, &response.body)?;
        let meta = CacheMeta {
            url: url.to_string(),
            content_type: response.content_type.clone(),
        };
        fs::write(&meta_path, serde_json::to_vec(&meta).unwrap_or_default())?;
        Ok(())
    }
}

#[async_trait]
impl CachedClient for HttpCache {
    async fn get(
        &self,
        url: &str,
        duration: &str,
        headers: &[(String, String)],
    ) -> Result<CachedResponse, ClientError> {
        if let Some(cached) = self.read_cache(url, duration) {
            return Ok(cached);
        }

        let parsed = reqwest::Url::parse(url).map_err(|err| ClientError::InvalidUrl {
            url: url.to_string(),
            message: err.to_string(),
        })?;

        let mut request = self.client.get(parsed);
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let response = request.send().await.map_err(|err| map_reqwest_error(url, err))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::HttpStatus {
                status: status.as_u16(),
                url: url.to_string(),
                body,
            });
        }

        if let Some(content_len) = response.content_length() {
            if content_len > self.settings.max_bytes {
                return Err(ClientError::TooLarge {
                    max_bytes: self.settings.max_bytes,
                    url: url.to_string(),
                });
            }
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.to_string());

        let mut body = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|err| map_reqwest_error(url, err))?;
            if body.len() as u64 + chunk.len() as u64 > self.settings.max_bytes {
                return Err(ClientError::TooLarge {
                    max_bytes: self.settings.max_bytes,
                    url: url.to_string(),
                });
            }
            body.extend_from_slice(&chunk);
        }

        let cached = CachedResponse { body, content_type };
        self.write_cache(url, &cached)?;
        Ok(cached)
    }
}

fn map_reqwest_error(url: &str, err: reqwest::Error) -> ClientError {
    if err.is_timeout() {
        return ClientError::Timeout(url.to_string());
    }
    if err.is_redirect() {
        return ClientError::RedirectLimitExceeded(url.to_string());
    }
    ClientError::Network {
        url: url.to_string(),
        message: err.to_string(),
    }
}
