use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};

/// Namespace prefix for all entry uuids, shared by every source variant.
pub const UUID_PREFIX: &str = "eleventy-import";

/// The closed set of source connectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    Atom,
    Rss,
    WordPress,
    HostedWordPress,
    YouTube,
    Fediverse,
    Bluesky,
}

impl SourceKind {
    /// Stable identifier used in uuids and serialized entries.
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Atom => "atom",
            SourceKind::Rss => "rss",
            SourceKind::WordPress => "wordpress",
            SourceKind::HostedWordPress => "wordpressapi-hosted",
            SourceKind::YouTube => "youtube",
            SourceKind::Fediverse => "fediverse",
            SourceKind::Bluesky => "bluesky",
        }
    }

    /// Human-readable provider name for log lines.
    pub fn friendly(&self) -> &'static str {
        match self {
            SourceKind::Atom => "Atom",
            SourceKind::Rss => "RSS",
            SourceKind::WordPress => "WordPress",
            SourceKind::HostedWordPress => "WordPress.com",
            SourceKind::YouTube => "YouTube",
            SourceKind::Fediverse => "Fediverse",
            SourceKind::Bluesky => "Bluesky",
        }
    }

    /// True for either WordPress variant. Several conversion rules
    /// (code block `brush:` classes, preformatted blocks) only apply to
    /// WordPress-origin content.
    pub fn is_wordpress(&self) -> bool {
        matches!(self, SourceKind::WordPress | SourceKind::HostedWordPress)
    }
}

impl Serialize for SourceKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Declared representation of an entry's `content` field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ContentType {
    Html,
    Text,
    Markdown,
    Other(String),
    #[default]
    Unknown,
}

impl ContentType {
    pub fn parse(value: &str) -> Self {
        match value {
            "html" | "xhtml" => ContentType::Html,
            "text" => ContentType::Text,
            "markdown" => ContentType::Markdown,
            "" => ContentType::Unknown,
            other => ContentType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ContentType::Html => "html",
            ContentType::Text => "text",
            ContentType::Markdown => "markdown",
            ContentType::Other(value) => value,
            ContentType::Unknown => "",
        }
    }

    pub fn is_html(&self) -> bool {
        matches!(self, ContentType::Html)
    }

    /// Whether the import pipeline should run the HTML transform and
    /// Markdown conversion. Feeds that do not declare a content type carry
    /// HTML bodies in practice; only declared text/markdown skips.
    pub fn treat_as_html(&self) -> bool {
        !matches!(self, ContentType::Text | ContentType::Markdown)
    }
}

impl Serialize for ContentType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

/// Publication status. WordPress distinguishes drafts from published posts;
/// draft entries are written locally but never persisted remotely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    Published,
    Draft,
}

impl EntryStatus {
    pub fn parse(value: &str) -> Self {
        if value == "draft" {
            EntryStatus::Draft
        } else {
            EntryStatus::Published
        }
    }
}

impl Serialize for EntryStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(match self {
            EntryStatus::Published => "publish",
            EntryStatus::Draft => "draft",
        })
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl Author {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: None,
            avatar_url: None,
        }
    }
}

/// Weak back-reference from an entry to its originating source.
///
/// Lookup-only: carries the kind and label needed for output-path decisions.
/// Never serialized and never an ownership edge.
#[derive(Debug, Clone)]
pub struct SourceRef {
    pub kind: SourceKind,
    pub label: Option<String>,
}

/// A normalized content record produced by a source connector.
///
/// Entries are immutable after `get_entries()` returns, except for the
/// `file_path` assignment made by the importer before the transform stage.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentEntry {
    pub uuid: String,
    #[serde(rename = "type")]
    pub kind: SourceKind,
    pub title: String,
    pub url: String,
    pub authors: Vec<Author>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_updated: Option<DateTime<Utc>>,
    pub content: String,
    pub content_type: ContentType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<EntryStatus>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_label: Option<String>,
    #[serde(skip)]
    pub origin: Option<SourceRef>,
}

impl ContentEntry {
    /// Starts a new entry with the identity fields; callers fill the rest.
    pub fn new(uuid: String, kind: SourceKind) -> Self {
        Self {
            uuid,
            kind,
            title: String::new(),
            url: String::new(),
            authors: Vec::new(),
            date: None,
            date_updated: None,
            content: String::new(),
            content_type: ContentType::Unknown,
            status: None,
            metadata: Map::new(),
            tags: Vec::new(),
            file_path: None,
            source_label: None,
            origin: None,
        }
    }

    pub fn is_draft(&self) -> bool {
        self.status == Some(EntryStatus::Draft)
    }
}

/// Parses provider date strings into materialized UTC timestamps.
///
/// Accepts RFC 3339 (Atom, WordPress.com), RFC 2822 (RSS `pubDate`), and the
/// timezone-less `date_gmt` format used by the self-hosted WordPress API.
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc2822(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_date_accepts_provider_formats() {
        assert!(parse_date("2024-03-01T10:00:00Z").is_some());
        assert!(parse_date("2024-03-01T10:00:00+02:00").is_some());
        assert!(parse_date("Fri, 01 Mar 2024 10:00:00 GMT").is_some());
        // WordPress `date_gmt` has no timezone designator.
        assert!(parse_date("2024-03-01T10:00:00").is_some());
        assert!(parse_date("").is_none());
        assert!(parse_date("not a date").is_none());
    }

    #[test]
    fn entry_serialization_skips_origin() {
        let mut entry = ContentEntry::new("eleventy-import::rss::1".into(), SourceKind::Rss);
        entry.origin = Some(SourceRef {
            kind: SourceKind::Rss,
            label: Some("My Blog".into()),
        });
        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["type"], "rss");
        assert!(json.get("origin").is_none());
        assert!(json.get("source").is_none());
    }

    #[test]
    fn status_parse_defaults_to_published() {
        assert_eq!(EntryStatus::parse("draft"), EntryStatus::Draft);
        assert_eq!(EntryStatus::parse("publish"), EntryStatus::Published);
        assert_eq!(EntryStatus::parse("future"), EntryStatus::Published);
    }
}
