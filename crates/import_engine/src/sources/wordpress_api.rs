use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use url::Url;

use super::{text_of, wrap_list, DataSource, RawDates, SourceConfig, SourceError, SourceUrl};
use crate::fetch::{FetchError, FetchType, Fetcher};
use crate::types::{parse_date, Author, ContentEntry, ContentType, EntryStatus, SourceKind, UUID_PREFIX};

const IGNORED_CATEGORIES: &[&str] = &["Uncategorized"];

/// Self-hosted WordPress REST API connector.
///
/// Paginates `wp-json/wp/v2/posts`; when `WORDPRESS_USERNAME` and
/// `WORDPRESS_PASSWORD` are both present, requests are authenticated and
/// additionally ask for drafts. Author, category, and tag names each cost
/// one extra request per id.
pub struct WordPressApi {
    url: String,
    config: SourceConfig,
    credentials: Option<(String, String)>,
}

impl WordPressApi {
    pub fn new(url: impl Into<String>, fetcher: Arc<Fetcher>) -> Self {
        let credentials = match (
            std::env::var("WORDPRESS_USERNAME"),
            std::env::var("WORDPRESS_PASSWORD"),
        ) {
            (Ok(username), Ok(password)) => Some((username, password)),
            _ => None,
        };
        Self {
            url: url.into(),
            config: SourceConfig::new(fetcher),
            credentials,
        }
    }

    pub fn config_mut(&mut self) -> &mut SourceConfig {
        &mut self.config
    }

    fn subtype_url(&self, subtype: &str, suffix: &str) -> String {
        match Url::parse(&self.url) {
            Ok(base) => {
                let mut path = base.path().to_string();
                if !path.ends_with('/') {
                    path.push('/');
                }
                let relative = format!("{path}wp-json/wp/v2/{subtype}/{suffix}");
                base.join(&relative)
                    .map(|joined| joined.to_string())
                    .unwrap_or(relative)
            }
            Err(_) => format!(
                "{}/wp-json/wp/v2/{subtype}/{suffix}",
                self.url.trim_end_matches('/')
            ),
        }
    }

    /// One extra API call; a failed lookup silently degrades to no authors.
    async fn resolve_authors(&self, author_id: Option<&Value>) -> Vec<Author> {
        let Some(id) = text_of(author_id) else {
            return Vec::new();
        };
        let url = self.subtype_url("users", &id);
        let data = match self.fetch_data(&url, true).await {
            Ok(payload) => payload.into_value(),
            // Fetch logged the error upstream.
            Err(_) => return Vec::new(),
        };
        let Some(data) = data else {
            return Vec::new();
        };

        let avatar_url = data
            .get("avatar_urls")
            .and_then(Value::as_object)
            .and_then(|sizes| sizes.values().last())
            .and_then(Value::as_str)
            .map(|value| value.to_string());

        vec![Author {
            name: text_of(data.get("name")).unwrap_or_default(),
            url: text_of(data.get("url"))
                .filter(|value| !value.is_empty())
                .or_else(|| text_of(data.get("link"))),
            avatar_url,
        }]
    }

    /// One extra API call per id. Unlike author lookups these propagate
    /// failures, matching the enrichment error boundary.
    async fn resolve_names(
        &self,
        subtype: &str,
        ids: Option<&Value>,
    ) -> Result<Vec<String>, SourceError> {
        let mut names = Vec::new();
        for id in wrap_list(ids) {
            let Some(id) = text_of(Some(id)) else {
                continue;
            };
            let url = self.subtype_url(subtype, &id);
            let data = self
                .fetch_data(&url, true)
                .await?
                .into_value()
                .ok_or_else(|| SourceError::Payload { url: url.clone() })?;
            if let Some(name) = text_of(data.get("name")) {
                names.push(name);
            }
        }
        Ok(names)
    }

    async fn resolve_categories(&self, ids: Option<&Value>) -> Result<Vec<String>, SourceError> {
        let names = self.resolve_names("categories", ids).await?;
        Ok(names
            .into_iter()
            .filter(|name| !IGNORED_CATEGORIES.contains(&name.as_str()))
            .collect())
    }
}

#[async_trait]
impl DataSource for WordPressApi {
    fn kind(&self) -> SourceKind {
        SourceKind::WordPress
    }

    fn config(&self) -> &SourceConfig {
        &self.config
    }

    fn payload_type(&self) -> FetchType {
        FetchType::Json
    }

    fn url(&self) -> SourceUrl {
        // A configured window is also pushed upstream into the query; the
        // record-level filter still applies as a safety net.
        let within_query = self
            .config
            .within()
            .map(|window| {
                let start = (Utc::now() - window.duration())
                    .to_rfc3339_opts(SecondsFormat::Millis, true);
                format!("&after={start}&modified_after={start}")
            })
            .unwrap_or_default();

        // Only request drafts when authenticated.
        let status_query = if self.credentials.is_some() {
            "&status=publish%2Cdraft".to_string()
        } else {
            String::new()
        };

        let posts_url = self.subtype_url("posts", "");
        SourceUrl::Paged(Box::new(move |page_number| {
            format!("{posts_url}?page={page_number}&per_page=100{status_query}{within_query}")
        }))
    }

    fn headers(&self) -> Vec<(String, String)> {
        match &self.credentials {
            Some((username, password)) => {
                let token = STANDARD.encode(format!("{username}:{password}"));
                vec![
                    ("Content-Type".to_string(), "application/json".to_string()),
                    ("Authorization".to_string(), format!("Basic {token}")),
                ]
            }
            None => Vec::new(),
        }
    }

    /// `rest_post_invalid_page_number` just means we paged past the end.
    fn is_pagination_end_error(&self, err: &FetchError) -> bool {
        err.http_body()
            .and_then(|body| serde_json::from_str::<Value>(body).ok())
            .and_then(|data| data.get("code").and_then(Value::as_str).map(String::from))
            .is_some_and(|code| code == "rest_post_invalid_page_number")
    }

    fn entries_from_data<'a>(&self, data: &'a Value) -> Vec<&'a Value> {
        match data {
            Value::Array(items) => items.iter().collect(),
            _ => Vec::new(),
        }
    }

    fn unique_id(&self, raw_entry: &Value) -> String {
        let guid = text_of(raw_entry.pointer("/guid/rendered")).unwrap_or_default();
        format!("{UUID_PREFIX}::{}::{guid}", SourceKind::WordPress.as_str())
    }

    fn raw_entry_dates(&self, raw_entry: &Value) -> Option<RawDates> {
        Some(RawDates {
            created: text_of(raw_entry.get("date_gmt")).and_then(|value| parse_date(&value)),
            updated: text_of(raw_entry.get("modified_gmt")).and_then(|value| parse_date(&value)),
        })
    }

    // Supports: title, author, published/updated dates, categories, tags.
    async fn clean_entry(
        &self,
        raw_entry: &Value,
        _data: &Value,
    ) -> Result<ContentEntry, SourceError> {
        let status = text_of(raw_entry.get("status")).map(|value| EntryStatus::parse(&value));

        let mut metadata = Map::new();
        let og_image = text_of(raw_entry.pointer("/og_image/url"));
        let featured_image = text_of(raw_entry.get("jetpack_featured_media_url"));
        if og_image.is_some() || featured_image.is_some() {
            let mut media = Map::new();
            if let Some(og_image) = og_image {
                media.insert("opengraphImage".to_string(), json!(og_image));
            }
            if let Some(featured_image) = &featured_image {
                media.insert("featuredImage".to_string(), json!(featured_image));
                // backwards compatibility (not downloaded or optimized)
                metadata.insert("featuredImage".to_string(), json!(featured_image));
            }
            metadata.insert("media".to_string(), Value::Object(media));
        }

        let categories = self.resolve_categories(raw_entry.get("categories")).await?;
        if !categories.is_empty() {
            metadata.insert("categories".to_string(), json!(categories));
        }

        let tags = self.resolve_names("tags", raw_entry.get("tags")).await?;
        if !tags.is_empty() {
            metadata.insert("tags".to_string(), json!(tags));
        }

        let dates = self.raw_entry_dates(raw_entry).unwrap_or_default();

        let mut entry = ContentEntry::new(self.unique_id(raw_entry), SourceKind::WordPress);
        entry.title = text_of(raw_entry.pointer("/title/rendered")).unwrap_or_default();
        entry.url = text_of(raw_entry.get("link")).unwrap_or_default();
        entry.authors = self.resolve_authors(raw_entry.get("author")).await;
        entry.date = dates.created;
        entry.date_updated = dates.updated;
        entry.content = text_of(raw_entry.pointer("/content/rendered")).unwrap_or_default();
        entry.content_type = ContentType::Html;
        entry.status = status;
        // WordPress categories double as site tags; WordPress metadata tags
        // are a different thing and stay in metadata only.
        entry.tags = categories;
        entry.metadata = metadata;
        Ok(entry)
    }
}
