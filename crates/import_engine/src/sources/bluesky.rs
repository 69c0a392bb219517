use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use super::rss::Rss;
use super::{DataSource, RawDates, SourceConfig, SourceError, SourceUrl};
use crate::fetch::{FetchType, Fetcher};
use crate::types::{ContentEntry, ContentType, SourceKind};

/// A Bluesky profile feed: RSS with entry post-processing.
pub struct BlueskyUser {
    inner: Rss,
}

impl BlueskyUser {
    pub fn new(username: &str, fetcher: Arc<Fetcher>) -> Self {
        let handle = Self::normalize_username(username);
        Self {
            inner: Rss::new(format!("https://bsky.app/profile/{handle}/rss"), fetcher),
        }
    }

    pub fn normalize_username(username: &str) -> &str {
        username.strip_prefix('@').unwrap_or(username)
    }

    /// Output path slug for a post URL: `handle/postId` from
    /// `/profile/<handle>/post/<id>`.
    pub fn file_path_from_url(url: &str) -> Option<String> {
        let parsed = Url::parse(url).ok()?;
        let mut segments = parsed.path().split('/').filter(|segment| !segment.is_empty());
        // "profile"
        segments.next()?;
        let username = segments.next()?;
        // "post"
        segments.next()?;
        let post_id = segments.next()?;
        Some(format!("{username}/{post_id}"))
    }

    pub fn config_mut(&mut self) -> &mut SourceConfig {
        self.inner.config_mut()
    }
}

#[async_trait]
impl DataSource for BlueskyUser {
    fn kind(&self) -> SourceKind {
        SourceKind::Bluesky
    }

    fn config(&self) -> &SourceConfig {
        self.inner.config()
    }

    fn payload_type(&self) -> FetchType {
        self.inner.payload_type()
    }

    fn url(&self) -> SourceUrl {
        self.inner.url()
    }

    fn entries_from_data<'a>(&self, data: &'a Value) -> Vec<&'a Value> {
        self.inner.entries_from_data(data)
    }

    fn unique_id(&self, raw_entry: &Value) -> String {
        self.inner.unique_id(raw_entry)
    }

    fn raw_entry_dates(&self, raw_entry: &Value) -> Option<RawDates> {
        self.inner.raw_entry_dates(raw_entry)
    }

    async fn clean_entry(
        &self,
        raw_entry: &Value,
        data: &Value,
    ) -> Result<ContentEntry, SourceError> {
        let mut entry = self.inner.clean_entry(raw_entry, data).await?;
        entry.kind = SourceKind::Bluesky;
        entry.content_type = ContentType::Text;
        Ok(entry)
    }
}
