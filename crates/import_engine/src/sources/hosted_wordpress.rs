use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use url::Url;

use super::{text_of, DataSource, RawDates, SourceConfig, SourceError, SourceUrl};
use crate::fetch::{FetchType, Fetcher};
use crate::types::{parse_date, Author, ContentEntry, ContentType, EntryStatus, SourceKind, UUID_PREFIX};

/// WordPress.com hosted API connector.
///
/// Same record shape as self-hosted WordPress but a single round-trip:
/// author, category, and tag data come embedded. Drafts are not supported
/// by the public endpoint.
pub struct HostedWordPressApi {
    url: String,
    hostname: String,
    config: SourceConfig,
}

impl HostedWordPressApi {
    fn hostname_of(url: &str) -> Option<String> {
        Url::parse(url)
            .ok()?
            .host_str()
            .map(|host| host.to_string())
    }

    pub fn is_valid(url: &str) -> bool {
        Self::hostname_of(url).is_some_and(|hostname| hostname.ends_with(".wordpress.com"))
    }

    pub fn new(url: impl Into<String>, fetcher: Arc<Fetcher>) -> Result<Self, SourceError> {
        let url = url.into();
        let hostname = Self::hostname_of(&url).unwrap_or_default();
        if !hostname.ends_with(".wordpress.com") {
            return Err(SourceError::Config(format!(
                "HostedWordPressApi expects a .wordpress.com URL, got {url:?}; \
                 for a self-hosted WordPress API use the `wordpress` type"
            )));
        }
        Ok(Self {
            url,
            hostname,
            config: SourceConfig::new(fetcher),
        })
    }

    pub fn url_str(&self) -> &str {
        &self.url
    }

    pub fn config_mut(&mut self) -> &mut SourceConfig {
        &mut self.config
    }

    fn author_data(author: Option<&Value>) -> Vec<Author> {
        let Some(author) = author else {
            return Vec::new();
        };
        vec![Author {
            name: text_of(author.get("name")).unwrap_or_default(),
            url: text_of(author.get("profile_URL")),
            avatar_url: text_of(author.get("avatar_URL")),
        }]
    }

    fn keys_of(value: Option<&Value>) -> Vec<String> {
        value
            .and_then(Value::as_object)
            .map(|map| map.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl DataSource for HostedWordPressApi {
    fn kind(&self) -> SourceKind {
        SourceKind::HostedWordPress
    }

    fn config(&self) -> &SourceConfig {
        &self.config
    }

    fn payload_type(&self) -> FetchType {
        FetchType::Json
    }

    fn url(&self) -> SourceUrl {
        let hostname = self.hostname.clone();
        // Drafts not supported.
        SourceUrl::Paged(Box::new(move |page_number| {
            format!(
                "https://public-api.wordpress.com/rest/v1.1/sites/{hostname}/posts/?page={page_number}&per_page=100"
            )
        }))
    }

    fn entries_from_data<'a>(&self, data: &'a Value) -> Vec<&'a Value> {
        match data.get("posts") {
            Some(Value::Array(posts)) => posts.iter().collect(),
            _ => Vec::new(),
        }
    }

    fn unique_id(&self, raw_entry: &Value) -> String {
        let guid = text_of(raw_entry.get("guid")).unwrap_or_default();
        format!(
            "{UUID_PREFIX}::{}::{guid}",
            SourceKind::HostedWordPress.as_str()
        )
    }

    fn raw_entry_dates(&self, raw_entry: &Value) -> Option<RawDates> {
        Some(RawDates {
            created: text_of(raw_entry.get("date")).and_then(|value| parse_date(&value)),
            updated: text_of(raw_entry.get("modified")).and_then(|value| parse_date(&value)),
        })
    }

    async fn clean_entry(
        &self,
        raw_entry: &Value,
        _data: &Value,
    ) -> Result<ContentEntry, SourceError> {
        let mut metadata = Map::new();
        metadata.insert(
            "categories".to_string(),
            json!(Self::keys_of(raw_entry.get("categories"))),
        );
        metadata.insert(
            "tags".to_string(),
            json!(Self::keys_of(raw_entry.get("tags"))),
        );

        if let Some(featured_image) = text_of(raw_entry.get("featured_image")) {
            if !featured_image.is_empty() {
                metadata.insert(
                    "media".to_string(),
                    json!({ "featuredImage": featured_image }),
                );
                // backwards compatibility (not downloaded or optimized)
                metadata.insert("featuredImage".to_string(), json!(featured_image));
            }
        }

        let dates = self.raw_entry_dates(raw_entry).unwrap_or_default();

        let mut entry = ContentEntry::new(self.unique_id(raw_entry), SourceKind::HostedWordPress);
        entry.title = text_of(raw_entry.get("title")).unwrap_or_default();
        entry.url = text_of(raw_entry.get("URL")).unwrap_or_default();
        entry.authors = Self::author_data(raw_entry.get("author"));
        entry.date = dates.created;
        entry.date_updated = dates.updated;
        entry.content = text_of(raw_entry.get("content")).unwrap_or_default();
        entry.content_type = ContentType::Html;
        entry.status = text_of(raw_entry.get("status")).map(|value| EntryStatus::parse(&value));
        entry.metadata = metadata;
        Ok(entry)
    }
}
