//! Source connectors: each knows how to page through one provider and
//! normalize its records into canonical content entries.

mod atom;
mod bluesky;
mod fediverse;
mod hosted_wordpress;
mod rss;
mod wordpress_api;
mod youtube;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use import_logging::import_error;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::fetch::{FetchError, FetchOptions, FetchType, Fetcher, Payload, Verbosity};
use crate::types::{ContentEntry, SourceKind, SourceRef};
use crate::window::{DurationParseError, TimeWindow};

pub use atom::Atom;
pub use bluesky::BlueskyUser;
pub use fediverse::FediverseUser;
pub use hosted_wordpress::HostedWordPressApi;
pub use rss::Rss;
pub use wordpress_api::WordPressApi;
pub use youtube::YouTubeUser;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("invalid source configuration: {0}")]
    Config(String),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("unexpected payload shape from {url}")]
    Payload { url: String },
}

/// How a source addresses its provider: one fixed URL, or a page-number to
/// URL mapping for providers that paginate.
pub enum SourceUrl {
    Single(String),
    Paged(Box<dyn Fn(usize) -> String + Send + Sync>),
}

/// Raw creation/update timestamps extracted from a provider record, before
/// entry normalization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawDates {
    pub created: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
}

/// Configuration shared by every source variant. A source never constructs
/// its own network layer; the Fetcher is injected.
pub struct SourceConfig {
    fetcher: Arc<Fetcher>,
    within: Option<TimeWindow>,
    label: Option<String>,
    verbose: bool,
}

impl SourceConfig {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self {
            fetcher,
            within: None,
            label: None,
            verbose: true,
        }
    }

    pub fn set_within(&mut self, within: &str) -> Result<(), DurationParseError> {
        self.within = Some(TimeWindow::parse(within)?);
        Ok(())
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = Some(label.into());
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    pub fn fetcher(&self) -> &Arc<Fetcher> {
        &self.fetcher
    }

    pub fn within(&self) -> Option<&TimeWindow> {
        self.within.as_ref()
    }

    pub fn label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }
}

/// One provider connector. The provided `get_entries` drives pagination,
/// window filtering, and normalization; implementors supply the
/// provider-specific extraction pieces.
#[async_trait]
pub trait DataSource: Send + Sync {
    fn kind(&self) -> SourceKind;
    fn config(&self) -> &SourceConfig;
    fn payload_type(&self) -> FetchType;
    fn url(&self) -> SourceUrl;

    /// The list of raw provider records inside a fetched payload.
    fn entries_from_data<'a>(&self, data: &'a Value) -> Vec<&'a Value>;

    /// Globally unique, stable id for a raw record; identical raw input
    /// must yield an identical id across runs.
    fn unique_id(&self, raw_entry: &Value) -> String;

    /// Raw record timestamps for window filtering. `None` means the source
    /// cannot express dates at all, which retains every record (fail-open).
    fn raw_entry_dates(&self, raw_entry: &Value) -> Option<RawDates>;

    /// Normalizes one raw record into a canonical entry.
    async fn clean_entry(&self, raw_entry: &Value, data: &Value)
        -> Result<ContentEntry, SourceError>;

    /// Extra request headers for this provider (e.g. basic auth).
    fn headers(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Whether an error during paging just means "no more pages".
    fn is_pagination_end_error(&self, _err: &FetchError) -> bool {
        false
    }

    /// Retained when no window is configured, OR the created or updated
    /// timestamp falls inside it (union, not intersection).
    fn is_within(&self, raw_entry: &Value) -> bool {
        let Some(window) = self.config().within() else {
            return true;
        };
        let Some(dates) = self.raw_entry_dates(raw_entry) else {
            return true;
        };
        if let Some(created) = dates.created {
            if window.contains(created) {
                return true;
            }
        }
        if let Some(updated) = dates.updated {
            if window.contains(updated) {
                return true;
            }
        }
        false
    }

    async fn fetch_data(&self, url: &str, show_errors: bool) -> Result<Payload, FetchError> {
        self.config()
            .fetcher()
            .fetch(
                url,
                FetchOptions {
                    fetch_type: self.payload_type(),
                    duration: None,
                    headers: self.headers(),
                },
                Verbosity {
                    verbose: true,
                    show_errors,
                },
            )
            .await
    }

    /// Extracts, window-filters, and normalizes every record in a payload.
    async fn cleaned_entries(&self, data: &Value) -> Result<Vec<ContentEntry>, SourceError> {
        let mut entries = Vec::new();
        for raw_entry in self.entries_from_data(data) {
            if self.is_within(raw_entry) {
                entries.push(self.clean_entry(raw_entry, data).await?);
            }
        }
        Ok(entries)
    }

    /// Fetches and normalizes everything this source has to offer.
    ///
    /// Paged mode stops on the first page that yields zero surviving
    /// records after window filtering; a raw page full of out-of-window
    /// records still terminates, since providers order newest-first.
    async fn get_entries(&self) -> Result<Vec<ContentEntry>, SourceError> {
        let mut entries = Vec::new();

        match self.url() {
            SourceUrl::Paged(page_url) => {
                let mut page_number = 1usize;
                loop {
                    let paged_url = page_url(page_number);
                    let payload = match self.fetch_data(&paged_url, false).await {
                        Ok(payload) => payload,
                        Err(err) => {
                            // Some pagination errors just mean no more pages.
                            if self.is_pagination_end_error(&err) {
                                break;
                            }
                            if self.config().verbose() {
                                import_error!("Error: {err}");
                            }
                            return Err(err.into());
                        }
                    };
                    let data = payload.into_value().ok_or_else(|| SourceError::Payload {
                        url: paged_url.clone(),
                    })?;
                    let cleaned = match self.cleaned_entries(&data).await {
                        Ok(cleaned) => cleaned,
                        Err(err) => {
                            if let SourceError::Fetch(fetch_err) = &err {
                                if self.is_pagination_end_error(fetch_err) {
                                    break;
                                }
                            }
                            if self.config().verbose() {
                                import_error!("Error: {err}");
                            }
                            return Err(err);
                        }
                    };
                    // Careful: an entry updated out of the window is ignored,
                    // and an all-ignored page ends the loop.
                    if cleaned.is_empty() {
                        break;
                    }
                    entries.extend(cleaned);
                    page_number += 1;
                }
            }
            SourceUrl::Single(url) => {
                let payload = self.fetch_data(&url, true).await?;
                let data = payload
                    .into_value()
                    .ok_or_else(|| SourceError::Payload { url: url.clone() })?;
                entries.extend(self.cleaned_entries(&data).await?);
            }
        }

        let origin = SourceRef {
            kind: self.kind(),
            label: self.config().label().map(|label| label.to_string()),
        };
        for entry in &mut entries {
            if let Some(label) = self.config().label() {
                entry.source_label = Some(label.to_string());
            }
            entry.origin = Some(origin.clone());
        }

        Ok(entries)
    }
}

/// Picks the right WordPress variant for a URL: the hosted WordPress.com
/// API when the hostname matches, the self-hosted REST API otherwise.
pub fn wordpress_source(
    url: &str,
    fetcher: Arc<Fetcher>,
) -> Result<Box<dyn DataSource>, SourceError> {
    if HostedWordPressApi::is_valid(url) {
        Ok(Box::new(HostedWordPressApi::new(url, fetcher)?))
    } else {
        Ok(Box::new(WordPressApi::new(url, fetcher)))
    }
}

/// Providers serialize a single-element list as a bare object; callers must
/// defensively wrap.
pub(crate) fn wrap_list(value: Option<&Value>) -> Vec<&Value> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(single) => vec![single],
    }
}

/// Extracts the text of a decoded XML/JSON node: a bare string, a number,
/// or an attributed element's `#text`.
pub(crate) fn text_of(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Object(map) => text_of(map.get("#text")),
        _ => None,
    }
}

pub(crate) fn is_valid_http_url(value: &str) -> bool {
    Url::parse(value).is_ok() && (value.starts_with("https://") || value.starts_with("http://"))
}

/// Long-form fallback title for entries that carry only a timestamp.
pub(crate) fn readable_date(date: DateTime<Utc>) -> String {
    date.format("%B %-d, %Y %-I:%M:%S %p UTC").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn wrap_list_handles_single_and_array() {
        let array = json!([1, 2]);
        assert_eq!(wrap_list(Some(&array)).len(), 2);

        let single = json!({"id": "a"});
        assert_eq!(wrap_list(Some(&single)).len(), 1);

        assert!(wrap_list(None).is_empty());
        assert!(wrap_list(Some(&Value::Null)).is_empty());
    }

    #[test]
    fn text_of_unwraps_hash_text() {
        let attributed = json!({"#text": "hello", "@_type": "html"});
        assert_eq!(text_of(Some(&attributed)).as_deref(), Some("hello"));
        let bare = json!("plain");
        assert_eq!(text_of(Some(&bare)).as_deref(), Some("plain"));
        let number = json!(42);
        assert_eq!(text_of(Some(&number)).as_deref(), Some("42"));
        assert_eq!(text_of(None), None);
    }

    #[test]
    fn http_url_validation() {
        assert!(is_valid_http_url("https://example.com/post"));
        assert!(is_valid_http_url("http://example.com"));
        assert!(!is_valid_http_url("tag:example.com,2024:entry-1"));
        assert!(!is_valid_http_url("/relative/path"));
    }
}
