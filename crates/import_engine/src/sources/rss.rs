use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{
    readable_date, text_of, wrap_list, DataSource, RawDates, SourceConfig, SourceError, SourceUrl,
};
use crate::fetch::{FetchType, Fetcher};
use crate::types::{parse_date, Author, ContentEntry, SourceKind, UUID_PREFIX};

/// RSS 2.0 feed connector. The social profile variants (Fediverse,
/// Bluesky) wrap this connector and post-process its entries.
pub struct Rss {
    url: String,
    config: SourceConfig,
}

impl Rss {
    pub fn new(url: impl Into<String>, fetcher: Arc<Fetcher>) -> Self {
        Self {
            url: url.into(),
            config: SourceConfig::new(fetcher),
        }
    }

    pub fn config_mut(&mut self) -> &mut SourceConfig {
        &mut self.config
    }

    /// Inline media attachments become generated image tags, filtered to
    /// the `image` medium (or no declared medium).
    fn media_html(&self, media: &Value) -> String {
        wrap_list(Some(media))
            .into_iter()
            .filter(|source| match source.get("@_medium").and_then(Value::as_str) {
                None => true,
                Some(medium) => medium == "image",
            })
            .map(|source| {
                let url = text_of(source.get("@_url")).unwrap_or_default();
                let alt = text_of(source.get("media:description")).unwrap_or_default();
                format!("<img src=\"{url}\" alt=\"{alt}\">")
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
impl DataSource for Rss {
    fn kind(&self) -> SourceKind {
        SourceKind::Rss
    }

    fn config(&self) -> &SourceConfig {
        &self.config
    }

    fn payload_type(&self) -> FetchType {
        FetchType::Xml
    }

    fn url(&self) -> SourceUrl {
        SourceUrl::Single(self.url.clone())
    }

    fn entries_from_data<'a>(&self, data: &'a Value) -> Vec<&'a Value> {
        wrap_list(data.pointer("/rss/channel/item"))
    }

    fn unique_id(&self, raw_entry: &Value) -> String {
        let guid = text_of(raw_entry.get("guid")).unwrap_or_default();
        format!("{UUID_PREFIX}::{}::{guid}", SourceKind::Rss.as_str())
    }

    fn raw_entry_dates(&self, raw_entry: &Value) -> Option<RawDates> {
        Some(RawDates {
            created: text_of(raw_entry.get("pubDate")).and_then(|value| parse_date(&value)),
            updated: None,
        })
    }

    async fn clean_entry(
        &self,
        raw_entry: &Value,
        data: &Value,
    ) -> Result<ContentEntry, SourceError> {
        let mut authors = Vec::new();
        // https://www.rssboard.org/rss-profile#namespace-elements-dublin-creator
        match raw_entry.get("dc:creator") {
            Some(Value::Array(list)) => {
                for creator in list {
                    if let Some(name) = text_of(Some(creator)) {
                        authors.push(Author::named(name));
                    }
                }
            }
            Some(creator) => {
                if let Some(name) = text_of(Some(creator)) {
                    authors.push(Author::named(name));
                }
            }
            None => {
                // Fall back to the channel itself.
                authors.push(Author {
                    name: text_of(data.pointer("/rss/channel/title")).unwrap_or_default(),
                    url: text_of(data.pointer("/rss/channel/link")),
                    avatar_url: None,
                });
            }
        }

        let mut content = text_of(raw_entry.get("content:encoded"))
            .or_else(|| text_of(raw_entry.get("content")))
            .or_else(|| text_of(raw_entry.get("description")))
            .unwrap_or_default();

        if let Some(media) = raw_entry.get("media:content") {
            content.push('\n');
            content.push_str(&self.media_html(media));
        }

        let dates = self.raw_entry_dates(raw_entry).unwrap_or_default();

        let mut entry = ContentEntry::new(self.unique_id(raw_entry), SourceKind::Rss);
        entry.title = text_of(raw_entry.get("title"))
            .or_else(|| dates.created.map(readable_date))
            .unwrap_or_default();
        entry.url = text_of(raw_entry.get("link")).unwrap_or_default();
        entry.authors = authors;
        entry.date = dates.created;
        entry.content = content;
        Ok(entry)
    }
}
