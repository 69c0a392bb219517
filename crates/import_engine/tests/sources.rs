use std::sync::Arc;

use chrono::{Duration, SecondsFormat, Utc};
use import_engine::{
    Atom, CachedClient, ClientSettings, ContentType, DataSource, Fetcher, HostedWordPressApi,
    HttpCache, Rss, SourceKind, WordPressApi,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_fetcher() -> Arc<Fetcher> {
    let client: Arc<dyn CachedClient> =
        Arc::new(HttpCache::new(ClientSettings::default()).expect("client"));
    let mut fetcher = Fetcher::new(client);
    fetcher.set_verbose(false);
    Arc::new(fetcher)
}

const ATOM_FEED: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Example Feed</title>
  <author><name>Site Author</name></author>
  <entry>
    <id>https://example.com/post-1</id>
    <title>First Post</title>
    <published>2024-03-01T10:00:00Z</published>
    <updated>2024-03-02T10:00:00Z</updated>
    <content type="html">&lt;p&gt;Hello&lt;/p&gt;</content>
  </entry>
</feed>
"#;

#[tokio::test]
async fn atom_single_entry_is_wrapped_and_normalized() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(ATOM_FEED, "application/atom+xml"))
        .mount(&server)
        .await;

    let source = Atom::new(format!("{}/feed.xml", server.uri()), test_fetcher());
    let entries = source.get_entries().await.expect("entries");

    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.uuid, "eleventy-import::atom::https://example.com/post-1");
    assert_eq!(entry.kind, SourceKind::Atom);
    assert_eq!(entry.title, "First Post");
    assert_eq!(entry.url, "https://example.com/post-1");
    // No per-entry author: falls back to the feed-level author.
    assert_eq!(entry.authors.len(), 1);
    assert_eq!(entry.authors[0].name, "Site Author");
    assert!(entry.date.is_some());
    assert!(entry.date_updated.is_some());
    assert_eq!(entry.content_type, ContentType::Html);
    assert!(entry.origin.is_some());
}

#[tokio::test]
async fn atom_uuid_is_deterministic_across_runs() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(ATOM_FEED, "application/atom+xml"))
        .mount(&server)
        .await;

    let first = Atom::new(format!("{}/feed.xml", server.uri()), test_fetcher())
        .get_entries()
        .await
        .expect("first run");
    let second = Atom::new(format!("{}/feed.xml", server.uri()), test_fetcher())
        .get_entries()
        .await
        .expect("second run");

    assert_eq!(first[0].uuid, second[0].uuid);
}

fn rss_feed(items: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/" xmlns:media="http://search.yahoo.com/mrss/">
<channel>
<title>My Blog</title>
<link>https://blog.example/</link>
{items}
</channel>
</rss>
"#
    )
}

#[tokio::test]
async fn rss_single_item_defensive_wrap_and_fallback_author() {
    let server = MockServer::start().await;
    let feed = rss_feed(
        r#"<item>
  <title>Post</title>
  <link>https://blog.example/post/</link>
  <guid isPermaLink="false">abc-123</guid>
  <pubDate>Fri, 01 Mar 2024 10:00:00 GMT</pubDate>
  <content:encoded><![CDATA[<p>Hi</p>]]></content:encoded>
  <media:content url="https://cdn.example/pic.png" medium="image" fileSize="879593">
    <media:description type="plain">A picture</media:description>
  </media:content>
  <media:content url="https://cdn.example/clip.mp4" medium="video">
    <media:description type="plain">A video</media:description>
  </media:content>
</item>"#,
    );
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(feed, "application/rss+xml"))
        .mount(&server)
        .await;

    let source = Rss::new(format!("{}/feed", server.uri()), test_fetcher());
    let entries = source.get_entries().await.expect("entries");

    assert_eq!(entries.len(), 1);
    let entry = &entries[0];
    assert_eq!(entry.uuid, "eleventy-import::rss::abc-123");
    // No dc:creator: the channel itself is the author.
    assert_eq!(entry.authors[0].name, "My Blog");
    assert_eq!(entry.authors[0].url.as_deref(), Some("https://blog.example/"));
    // Image attachments are appended as generated tags; video ones are not.
    assert!(entry.content.contains("<p>Hi</p>"));
    assert!(entry
        .content
        .contains(r#"<img src="https://cdn.example/pic.png" alt="A picture">"#));
    assert!(!entry.content.contains("clip.mp4"));
}

#[tokio::test]
async fn rss_title_falls_back_to_readable_date() {
    let server = MockServer::start().await;
    let feed = rss_feed(
        r#"<item>
  <link>https://blog.example/untitled/</link>
  <guid>xyz</guid>
  <pubDate>Fri, 01 Mar 2024 10:00:00 GMT</pubDate>
  <description>text</description>
</item>"#,
    );
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(feed, "application/rss+xml"))
        .mount(&server)
        .await;

    let source = Rss::new(format!("{}/feed", server.uri()), test_fetcher());
    let entries = source.get_entries().await.expect("entries");
    assert!(entries[0].title.contains("March 1, 2024"));
}

#[tokio::test]
async fn rss_window_excludes_items_outside_duration() {
    let server = MockServer::start().await;
    let recent = (Utc::now() - Duration::days(1)).to_rfc2822();
    let feed = rss_feed(&format!(
        r#"<item>
  <title>New</title><link>https://blog.example/new/</link><guid>new</guid>
  <pubDate>{recent}</pubDate><description>new post</description>
</item>
<item>
  <title>Old</title><link>https://blog.example/old/</link><guid>old</guid>
  <pubDate>Wed, 01 Jan 2020 00:00:00 GMT</pubDate><description>old post</description>
</item>"#
    ));
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(feed, "application/rss+xml"))
        .mount(&server)
        .await;

    let mut source = Rss::new(format!("{}/feed", server.uri()), test_fetcher());
    source.config_mut().set_within("7d").expect("window");
    let entries = source.get_entries().await.expect("entries");

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].title, "New");
}

#[test]
fn wordpress_window_is_a_union_of_created_and_updated() {
    let mut source = WordPressApi::new("https://blog.example/", test_fetcher());
    source.config_mut().set_within("7d").expect("window");

    let recent = (Utc::now() - Duration::days(1)).to_rfc3339_opts(SecondsFormat::Secs, true);
    let updated_inside = json!({
        "date_gmt": "2020-01-01T00:00:00",
        "modified_gmt": recent,
    });
    let both_outside = json!({
        "date_gmt": "2020-01-01T00:00:00",
        "modified_gmt": "2020-06-01T00:00:00",
    });

    assert!(source.is_within(&updated_inside));
    assert!(!source.is_within(&both_outside));
}

fn wordpress_post(id: u64, date_gmt: &str) -> serde_json::Value {
    json!({
        "guid": { "rendered": format!("https://blog.example/?p={id}") },
        "title": { "rendered": format!("Post {id}") },
        "link": format!("https://blog.example/post-{id}/"),
        "status": "publish",
        "date_gmt": date_gmt,
        "modified_gmt": date_gmt,
        "content": { "rendered": "<p>body</p>" },
        "author": 1,
        "categories": [],
        "tags": [],
    })
}

#[tokio::test]
async fn wordpress_pagination_ends_on_invalid_page_error() {
    let server = MockServer::start().await;
    let recent = (Utc::now() - Duration::days(1))
        .format("%Y-%m-%dT%H:%M:%S")
        .to_string();

    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/posts/"))
        .and(query_param("page", "1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            wordpress_post(1, &recent),
            wordpress_post(2, &recent),
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/posts/"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": "rest_post_invalid_page_number",
            "message": "The page number requested is larger than the number of pages available.",
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/users/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Author One",
            "url": "",
            "link": "https://blog.example/author/one/",
            "avatar_urls": { "24": "https://blog.example/a24.png", "96": "https://blog.example/a96.png" },
        })))
        .mount(&server)
        .await;

    let source = WordPressApi::new(server.uri(), test_fetcher());
    let entries = source.get_entries().await.expect("entries");

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].kind, SourceKind::WordPress);
    assert_eq!(entries[0].uuid, "eleventy-import::wordpress::https://blog.example/?p=1");
    assert_eq!(entries[0].authors[0].name, "Author One");
    // Empty author url degrades to the profile link.
    assert_eq!(
        entries[0].authors[0].url.as_deref(),
        Some("https://blog.example/author/one/")
    );
    assert_eq!(
        entries[0].authors[0].avatar_url.as_deref(),
        Some("https://blog.example/a96.png")
    );
    assert_eq!(entries[0].content_type, ContentType::Html);
}

#[tokio::test]
async fn wordpress_pagination_ends_on_first_all_filtered_page() {
    let server = MockServer::start().await;
    let recent = (Utc::now() - Duration::days(1))
        .format("%Y-%m-%dT%H:%M:%S")
        .to_string();

    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/posts/"))
        .and(query_param("page", "1"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!([wordpress_post(1, &recent)])),
        )
        .mount(&server)
        .await;
    // Page 2 is non-empty but every record is outside the window.
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/posts/"))
        .and(query_param("page", "2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([wordpress_post(2, "2020-01-01T00:00:00")])),
        )
        .mount(&server)
        .await;
    // Page 3 must never be requested.
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/posts/"))
        .and(query_param("page", "3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wp/v2/users/1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Author One",
            "url": "https://one.example/",
            "avatar_urls": {},
        })))
        .mount(&server)
        .await;

    let mut source = WordPressApi::new(server.uri(), test_fetcher());
    source.config_mut().set_within("30d").expect("window");
    let entries = source.get_entries().await.expect("entries");

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].title, "Post 1");
}

#[test]
fn hosted_wordpress_rejects_foreign_hostnames() {
    assert!(HostedWordPressApi::is_valid("https://someone.wordpress.com/"));
    assert!(!HostedWordPressApi::is_valid("https://example.com/"));

    let err = HostedWordPressApi::new("https://example.com/", test_fetcher());
    assert!(err.is_err());
    assert!(HostedWordPressApi::new("https://someone.wordpress.com/", test_fetcher()).is_ok());
}

#[tokio::test]
async fn source_label_is_stamped_on_every_entry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/feed.xml"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(ATOM_FEED, "application/atom+xml"))
        .mount(&server)
        .await;

    let mut source = Atom::new(format!("{}/feed.xml", server.uri()), test_fetcher());
    source.config_mut().set_label("Example");
    let entries = source.get_entries().await.expect("entries");
    assert_eq!(entries[0].source_label.as_deref(), Some("Example"));
}
