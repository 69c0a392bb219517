use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use super::rss::Rss;
use super::{DataSource, RawDates, SourceConfig, SourceError, SourceUrl};
use crate::fetch::{FetchType, Fetcher};
use crate::types::{ContentEntry, ContentType, SourceKind};

/// A Fediverse (Mastodon-compatible) profile: RSS with entry
/// post-processing, modeled as delegation over the RSS connector.
pub struct FediverseUser {
    inner: Rss,
    username: String,
    hostname: String,
}

impl FediverseUser {
    pub fn new(full_username: &str, fetcher: Arc<Fetcher>) -> Result<Self, SourceError> {
        let (username, hostname) = Self::parse_username(full_username)?;
        let inner = Rss::new(format!("https://{hostname}/users/{username}.rss"), fetcher);
        Ok(Self {
            inner,
            username,
            hostname,
        })
    }

    /// Splits an `@user@host` handle (leading `@` optional).
    pub fn parse_username(full_username: &str) -> Result<(String, String), SourceError> {
        let trimmed = full_username.strip_prefix('@').unwrap_or(full_username);
        let (username, hostname) = trimmed.split_once('@').ok_or_else(|| {
            SourceError::Config(format!("invalid fediverse username: {full_username:?}"))
        })?;
        if username.is_empty() || hostname.is_empty() {
            return Err(SourceError::Config(format!(
                "invalid fediverse username: {full_username:?}"
            )));
        }
        Ok((username.to_string(), hostname.to_string()))
    }

    /// Output path slug for a post URL: `user@host/postId`.
    pub fn file_path_from_url(url: &str) -> Option<String> {
        let parsed = Url::parse(url).ok()?;
        let hostname = parsed.host_str()?;
        let mut segments = parsed.path().split('/').filter(|segment| !segment.is_empty());
        let username = segments.next()?;
        let post_id = segments.next()?;
        let username = username.strip_prefix('@').unwrap_or(username);
        Some(format!("{username}@{hostname}/{post_id}"))
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }

    pub fn config_mut(&mut self) -> &mut SourceConfig {
        self.inner.config_mut()
    }
}

#[async_trait]
impl DataSource for FediverseUser {
    fn kind(&self) -> SourceKind {
        SourceKind::Fediverse
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
        entry.kind = SourceKind::Fediverse;
        entry.content_type = ContentType::Html;
        Ok(entry)
    }
}
