use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use super::{
    is_valid_http_url, text_of, wrap_list, DataSource, RawDates, SourceConfig, SourceError,
    SourceUrl,
};
use crate::fetch::{FetchType, Fetcher};
use crate::types::{parse_date, Author, ContentEntry, ContentType, SourceKind, UUID_PREFIX};

/// Atom feed connector.
pub struct Atom {
    url: String,
    config: SourceConfig,
}

impl Atom {
    pub fn new(url: impl Into<String>, fetcher: Arc<Fetcher>) -> Self {
        Self {
            url: url.into(),
            config: SourceConfig::new(fetcher),
        }
    }

    pub fn config_mut(&mut self) -> &mut SourceConfig {
        &mut self.config
    }

    /// An Atom id is often a unique URL already; otherwise prefer the
    /// `rel="alternate"` link.
    fn url_from_entry(&self, raw_entry: &Value) -> String {
        let id = text_of(raw_entry.get("id")).unwrap_or_default();
        if is_valid_http_url(&id) {
            return id;
        }
        if let Some(link) = raw_entry.get("link") {
            let rel = link.get("@_rel").and_then(Value::as_str);
            let href = link.get("@_href").and_then(Value::as_str);
            if rel == Some("alternate") {
                if let Some(href) = href {
                    if is_valid_http_url(href) {
                        return href.to_string();
                    }
                }
            }
        }
        id
    }
}

#[async_trait]
impl DataSource for Atom {
    fn kind(&self) -> SourceKind {
        SourceKind::Atom
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
        wrap_list(data.pointer("/feed/entry"))
    }

    fn unique_id(&self, raw_entry: &Value) -> String {
        // id is a unique URL
        let id = text_of(raw_entry.get("id")).unwrap_or_default();
        format!("{UUID_PREFIX}::{}::{id}", SourceKind::Atom.as_str())
    }

    fn raw_entry_dates(&self, raw_entry: &Value) -> Option<RawDates> {
        let published = text_of(raw_entry.get("published"));
        let updated = text_of(raw_entry.get("updated"));
        Some(RawDates {
            created: published
                .or_else(|| updated.clone())
                .and_then(|value| parse_date(&value)),
            updated: updated.and_then(|value| parse_date(&value)),
        })
    }

    async fn clean_entry(
        &self,
        raw_entry: &Value,
        data: &Value,
    ) -> Result<ContentEntry, SourceError> {
        let mut authors = Vec::new();
        match raw_entry.get("author") {
            Some(Value::Array(list)) => {
                for author in list {
                    if let Some(name) =
                        text_of(author.get("name")).or_else(|| text_of(Some(author)))
                    {
                        authors.push(Author::named(name));
                    }
                }
            }
            author => {
                // Per-entry author, falling back to the feed-level author.
                let name = author
                    .and_then(|value| text_of(value.get("name")))
                    .or_else(|| text_of(data.pointer("/feed/author/name")));
                authors.push(Author::named(name.unwrap_or_default()));
            }
        }

        let dates = self.raw_entry_dates(raw_entry).unwrap_or_default();

        let mut entry = ContentEntry::new(self.unique_id(raw_entry), SourceKind::Atom);
        entry.title = text_of(raw_entry.get("title")).unwrap_or_default();
        entry.url = self.url_from_entry(raw_entry);
        entry.authors = authors;
        entry.date = dates.created;
        entry.date_updated = dates.updated;
        entry.content = text_of(raw_entry.get("content")).unwrap_or_default();
        entry.content_type = raw_entry
            .get("content")
            .and_then(|content| content.get("@_type"))
            .and_then(Value::as_str)
            .map(ContentType::parse)
            .unwrap_or(ContentType::Unknown);
        Ok(entry)
    }
}
