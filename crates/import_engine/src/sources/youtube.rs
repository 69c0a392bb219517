use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use url::Url;

use super::{text_of, wrap_list, DataSource, RawDates, SourceConfig, SourceError, SourceUrl};
use crate::fetch::{FetchType, Fetcher};
use crate::types::{parse_date, Author, ContentEntry, ContentType, SourceKind, UUID_PREFIX};

/// YouTube channel uploads, via the public Atom-shaped video feed.
pub struct YouTubeUser {
    channel_id: String,
    config: SourceConfig,
}

impl YouTubeUser {
    pub fn new(channel_id: impl Into<String>, fetcher: Arc<Fetcher>) -> Self {
        Self {
            channel_id: channel_id.into(),
            config: SourceConfig::new(fetcher),
        }
    }

    pub fn config_mut(&mut self) -> &mut SourceConfig {
        &mut self.config
    }

    /// Output path slug for a watch URL: the video id.
    pub fn file_path_from_url(url: &str) -> Option<String> {
        let parsed = Url::parse(url).ok()?;
        parsed
            .query_pairs()
            .find(|(name, _)| name == "v")
            .map(|(_, value)| value.into_owned())
    }

    fn video_id(raw_entry: &Value) -> String {
        text_of(raw_entry.get("yt:videoId")).unwrap_or_default()
    }
}

#[async_trait]
impl DataSource for YouTubeUser {
    fn kind(&self) -> SourceKind {
        SourceKind::YouTube
    }

    fn config(&self) -> &SourceConfig {
        &self.config
    }

    fn payload_type(&self) -> FetchType {
        FetchType::Xml
    }

    fn url(&self) -> SourceUrl {
        SourceUrl::Single(format!(
            "https://www.youtube.com/feeds/videos.xml?channel_id={}",
            self.channel_id
        ))
    }

    fn entries_from_data<'a>(&self, data: &'a Value) -> Vec<&'a Value> {
        wrap_list(data.pointer("/feed/entry"))
    }

    fn unique_id(&self, raw_entry: &Value) -> String {
        format!(
            "{UUID_PREFIX}::{}::{}",
            SourceKind::YouTube.as_str(),
            Self::video_id(raw_entry)
        )
    }

    fn raw_entry_dates(&self, raw_entry: &Value) -> Option<RawDates> {
        Some(RawDates {
            created: text_of(raw_entry.get("published")).and_then(|value| parse_date(&value)),
            updated: text_of(raw_entry.get("updated")).and_then(|value| parse_date(&value)),
        })
    }

    async fn clean_entry(
        &self,
        raw_entry: &Value,
        _data: &Value,
    ) -> Result<ContentEntry, SourceError> {
        let dates = self.raw_entry_dates(raw_entry).unwrap_or_default();

        let mut entry = ContentEntry::new(self.unique_id(raw_entry), SourceKind::YouTube);
        entry.title = text_of(raw_entry.get("title")).unwrap_or_default();
        entry.url = format!(
            "https://www.youtube.com/watch?v={}",
            Self::video_id(raw_entry)
        );
        entry.authors = vec![Author {
            name: text_of(raw_entry.pointer("/author/name")).unwrap_or_default(),
            url: text_of(raw_entry.pointer("/author/uri")),
            avatar_url: None,
        }];
        entry.date = dates.created;
        entry.date_updated = dates.updated;
        entry.content =
            text_of(raw_entry.pointer("/media:group/media:description")).unwrap_or_default();
        entry.content_type = ContentType::Text;
        Ok(entry)
    }
}
