use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use import_logging::{human_size, import_error, import_info};
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::client::{CachedClient, ClientError};
use crate::decode::decode_body;
use crate::dirs::{path_join, DirectoryManager};
use crate::filename::asset_filename;
use crate::persist::{Persist, PersistMetadata};
use crate::types::ContentEntry;
use crate::xml::{xml_to_value, XmlError};

pub const USER_AGENT: &str = "Eleventy Import v1.0.0";

/// How the Fetcher should decode a response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FetchType {
    #[default]
    Text,
    Json,
    Xml,
    Buffer,
}

#[derive(Debug, Clone, Default)]
pub struct FetchOptions {
    pub fetch_type: FetchType,
    /// Overrides the Fetcher-level cache duration for this request.
    pub duration: Option<String>,
    pub headers: Vec<(String, String)>,
}

impl FetchOptions {
    pub fn typed(fetch_type: FetchType) -> Self {
        Self {
            fetch_type,
            ..Self::default()
        }
    }
}

/// Per-call logging knobs: `verbose` gates the request line, `show_errors`
/// gates the failure line. Failures always propagate either way.
#[derive(Debug, Clone, Copy)]
pub struct Verbosity {
    pub verbose: bool,
    pub show_errors: bool,
}

impl Default for Verbosity {
    fn default() -> Self {
        Self {
            verbose: true,
            show_errors: true,
        }
    }
}

#[derive(Debug)]
pub enum Payload {
    Text(String),
    Json(Value),
    Xml(Value),
    Buffer {
        body: Vec<u8>,
        content_type: Option<String>,
    },
}

impl Payload {
    /// The structured form of the payload, for sources that navigate it.
    pub fn into_value(self) -> Option<Value> {
        match self {
            Payload::Text(text) => Some(Value::String(text)),
            Payload::Json(value) | Payload::Xml(value) => Some(value),
            Payload::Buffer { .. } => None,
        }
    }
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error("json parse error for {url}: {source}")]
    Json {
        url: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("xml decode error for {url}: {source}")]
    Xml {
        url: String,
        #[source]
        source: XmlError,
    },
}

impl FetchError {
    pub fn http_status(&self) -> Option<u16> {
        match self {
            FetchError::Client(ClientError::HttpStatus { status, .. }) => Some(*status),
            _ => None,
        }
    }

    /// Error response body, when the failure was an HTTP error status.
    pub fn http_body(&self) -> Option<&str> {
        match self {
            FetchError::Client(ClientError::HttpStatus { body, .. }) => Some(body),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchCounts {
    pub assets: usize,
    pub errors: usize,
}

/// A computed local home for a remote asset: the URL value to substitute
/// into content, and the on-disk path to write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetLocation {
    pub url: String,
    pub file_path: String,
}

/// Caching, deduplicating HTTP front door for sources and the HTML
/// transform.
///
/// Owns the per-run membership sets: URLs already requested (for log
/// dedup), asset output paths already written (for write dedup), and URLs
/// that already produced an error (for error-log dedup). All three are
/// lock-guarded so the contains/insert step is atomic even if callers
/// issue sibling asset fetches concurrently.
pub struct Fetcher {
    client: Arc<dyn CachedClient>,
    directory_manager: DirectoryManager,
    persist: Option<Arc<Persist>>,
    cache_duration: String,
    assets_folder: String,
    output_folder: String,
    download_assets: bool,
    use_relative_assets: bool,
    verbose: bool,
    dry_run: bool,
    safe_mode: bool,
    fetched_urls: Mutex<HashSet<String>>,
    written_asset_files: Mutex<HashSet<String>>,
    errors: Mutex<HashSet<String>>,
    asset_count: AtomicUsize,
}

impl Fetcher {
    pub fn new(client: Arc<dyn CachedClient>) -> Self {
        Self {
            client,
            directory_manager: DirectoryManager::new(),
            persist: None,
            cache_duration: "0s".to_string(),
            assets_folder: "assets".to_string(),
            output_folder: ".".to_string(),
            download_assets: true,
            use_relative_assets: true,
            verbose: true,
            dry_run: false,
            safe_mode: true,
            fetched_urls: Mutex::new(HashSet::new()),
            written_asset_files: Mutex::new(HashSet::new()),
            errors: Mutex::new(HashSet::new()),
            asset_count: AtomicUsize::new(0),
        }
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    pub fn set_dry_run(&mut self, dry_run: bool) {
        self.dry_run = dry_run;
        self.directory_manager.set_dry_run(dry_run);
    }

    pub fn set_safe_mode(&mut self, safe_mode: bool) {
        self.safe_mode = safe_mode;
    }

    pub fn set_cache_duration(&mut self, duration: impl Into<String>) {
        self.cache_duration = duration.into();
    }

    pub fn set_assets_folder(&mut self, folder: impl Into<String>) {
        self.assets_folder = folder.into();
    }

    pub fn set_output_folder(&mut self, folder: impl Into<String>) {
        self.output_folder = folder.into();
    }

    pub fn set_download_assets(&mut self, download: bool) {
        self.download_assets = download;
    }

    pub fn set_use_relative_asset_paths(&mut self, relative: bool) {
        self.use_relative_assets = relative;
    }

    pub fn set_persist(&mut self, persist: Arc<Persist>) {
        self.persist = Some(persist);
    }

    pub fn counts(&self) -> FetchCounts {
        FetchCounts {
            assets: self.asset_count.load(Ordering::Relaxed),
            errors: self.errors.lock().expect("error set poisoned").len(),
        }
    }

    /// Fetches and decodes a remote payload through the cache primitive.
    ///
    /// The request line is logged at most once per URL for the lifetime of
    /// this Fetcher (the underlying fetch may still be re-invoked; reuse is
    /// the cache primitive's duration policy, not this layer's). Failures
    /// are logged once per URL and always propagated.
    pub async fn fetch(
        &self,
        url: &str,
        options: FetchOptions,
        verbosity: Verbosity,
    ) -> Result<Payload, FetchError> {
        let mut headers = options.headers;
        headers.push(("user-agent".to_string(), USER_AGENT.to_string()));

        let duration = options
            .duration
            .unwrap_or_else(|| self.cache_duration.clone());

        let first_request = {
            let mut fetched = self.fetched_urls.lock().expect("fetched set poisoned");
            fetched.insert(url.to_string())
        };
        if first_request && self.verbose && verbosity.verbose {
            let mut extras = String::new();
            if headers
                .iter()
                .any(|(name, _)| name.eq_ignore_ascii_case("authorization"))
            {
                extras.push_str(" [auth]");
            }
            if !duration.is_empty() {
                extras.push_str(&format!(" ({duration} cache)"));
            }
            import_info!("Fetching {url}{extras}");
        }

        let response = match self.client.get(url, &duration, &headers).await {
            Ok(response) => response,
            Err(err) => {
                let first_error = {
                    let mut errors = self.errors.lock().expect("error set poisoned");
                    errors.insert(url.to_string())
                };
                if first_error && self.verbose && verbosity.show_errors {
                    import_error!("Error fetching {url}: {err}");
                }
                return Err(FetchError::Client(err));
            }
        };

        match options.fetch_type {
            FetchType::Buffer => Ok(Payload::Buffer {
                body: response.body,
                content_type: response.content_type,
            }),
            FetchType::Text => Ok(Payload::Text(decode_body(
                &response.body,
                response.content_type.as_deref(),
            ))),
            FetchType::Json => {
                serde_json::from_slice(&response.body).map(Payload::Json).map_err(|source| {
                    FetchError::Json {
                        url: url.to_string(),
                        source,
                    }
                })
            }
            FetchType::Xml => {
                let text = decode_body(&response.body, response.content_type.as_deref());
                xml_to_value(&text).map(Payload::Xml).map_err(|source| FetchError::Xml {
                    url: url.to_string(),
                    source,
                })
            }
        }
    }

    /// Computes where an asset lands on disk and the URL value that
    /// replaces the remote reference in content.
    pub fn asset_location(
        &self,
        asset_url: &str,
        content_type: Option<&str>,
        entry: &ContentEntry,
    ) -> AssetLocation {
        let filename = asset_filename(asset_url, content_type);
        let asset_url_location = path_join(&[&self.assets_folder, &filename]);

        // One shared root-relative assets folder.
        if !self.use_relative_assets {
            return AssetLocation {
                url: format!("/{asset_url_location}"),
                file_path: path_join(&[&self.output_folder, &asset_url_location]),
            };
        }

        // Assets co-located with the entry that referenced them.
        let context_dir = match &entry.file_path {
            Some(file_path) => DirectoryManager::parent_directory(file_path),
            None => context_pathname(&entry.url),
        };

        AssetLocation {
            url: asset_url_location.clone(),
            file_path: path_join(&[&context_dir, &asset_url_location]),
        }
    }

    /// Downloads one asset referenced by `entry` and returns the local URL
    /// value to substitute for the remote one.
    ///
    /// Never fails the caller: any fetch or write problem degrades to
    /// returning the original remote URL unchanged.
    pub async fn fetch_asset(&self, asset_url: &str, entry: &ContentEntry) -> String {
        if !self.download_assets {
            return asset_url.to_string();
        }

        // Protocol-relative URLs inherit the entry's scheme.
        let mut asset_url = asset_url.to_string();
        if asset_url.starts_with("//") && !entry.url.is_empty() {
            if let Ok(context_url) = Url::parse(&entry.url) {
                asset_url = format!("{}:{asset_url}", context_url.scheme());
            }
        }

        let payload = self
            .fetch(
                &asset_url,
                FetchOptions::typed(FetchType::Buffer),
                Verbosity::default(),
            )
            .await;

        let (body, content_type) = match payload {
            Ok(Payload::Buffer { body, content_type }) => (body, content_type),
            // Error logging happened in fetch(); asset failures never fail
            // the parent document.
            _ => return asset_url,
        };

        let location = self.asset_location(&asset_url, content_type.as_deref(), entry);

        {
            let mut written = self
                .written_asset_files
                .lock()
                .expect("written set poisoned");
            if !written.insert(location.file_path.clone()) {
                return location.url;
            }
        }

        if self.safe_mode && Path::new(&location.file_path).exists() {
            if self.verbose {
                import_info!(
                    "Skipping asset (no --overwrite) {} from {asset_url}",
                    location.file_path
                );
            }
            return location.url;
        }

        if let Err(err) = self
            .directory_manager
            .create_directory_for_path(&location.file_path)
        {
            import_error!("Error creating directory for {}: {err}", location.file_path);
            return asset_url;
        }

        if self.verbose {
            let dry = if self.dry_run { " (dry run)" } else { "" };
            import_info!(
                "Importing asset{dry} {} ({}) from {asset_url}",
                location.file_path,
                human_size(body.len())
            );
        }

        if !self.dry_run {
            self.asset_count.fetch_add(1, Ordering::Relaxed);
            if let Err(err) = fs::write(&location.file_path, &body) {
                import_error!("Error writing asset {}: {err}", location.file_path);
                return asset_url;
            }
        }

        // Draft content is written locally but never published remotely.
        if !entry.is_draft() {
            if let Some(persist) = &self.persist {
                if persist.can_persist() {
                    let metadata = PersistMetadata {
                        url: Some(asset_url.clone()),
                        kind: Some("asset".to_string()),
                    };
                    if let Err(err) = persist.persist_file(&location.file_path, &body, metadata).await
                    {
                        import_error!("Error persisting asset {}: {err}", location.file_path);
                    }
                }
            }
        }

        location.url
    }
}

/// The directory portion of a URL's pathname: segments minus the last one.
fn context_pathname(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => {
            let mut segments: Vec<&str> = parsed
                .path()
                .split('/')
                .filter(|segment| !segment.is_empty())
                .collect();
            segments.pop();
            segments.join("/")
        }
        Err(_) => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::context_pathname;

    #[test]
    fn context_pathname_pops_final_segment() {
        assert_eq!(
            context_pathname("https://example.com/blog/post/"),
            "blog"
        );
        assert_eq!(
            context_pathname("https://example.com/blog/post"),
            "blog"
        );
        assert_eq!(context_pathname("https://example.com/"), "");
        assert_eq!(context_pathname("not a url"), "");
    }
}
