//! Content import engine: polymorphic source ingestion, asset
//! localization, and HTML to Markdown conversion for static-site import.
mod client;
mod decode;
mod dirs;
mod fetch;
mod filename;
mod importer;
mod markdown;
mod persist;
mod sources;
mod transform;
mod types;
mod window;
mod xml;

pub use client::{CachedClient, CachedResponse, ClientError, ClientSettings, HttpCache};
pub use decode::decode_body;
pub use dirs::{path_join, DirectoryManager};
pub use fetch::{
    AssetLocation, FetchCounts, FetchError, FetchOptions, FetchType, Fetcher, Payload, Verbosity,
    USER_AGENT,
};
pub use filename::{asset_filename, url_hash};
pub use importer::{ImportError, ImportSummary, Importer};
pub use markdown::{AssetUsage, CodeFormatter, JsonCodeFormatter, MarkdownConverter, MarkdownError};
pub use persist::{Persist, PersistError, PersistMetadata, PersistTarget};
pub use sources::{
    wordpress_source, Atom, BlueskyUser, DataSource, FediverseUser, HostedWordPressApi, RawDates,
    Rss, SourceConfig, SourceError, SourceUrl, WordPressApi, YouTubeUser,
};
pub use transform::HtmlTransformer;
pub use types::{
    parse_date, Author, ContentEntry, ContentType, EntryStatus, SourceKind, SourceRef, UUID_PREFIX,
};
pub use window::{parse_duration_str, DurationParseError, TimeWindow};
pub use xml::{xml_to_value, XmlError, ATTRIBUTE_PREFIX};
