use std::fs;
use std::sync::Arc;

use import_engine::{
    CachedClient, ClientSettings, DataSource, Fetcher, HttpCache, Importer, Rss,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn feed_server() -> MockServer {
    let server = MockServer::start().await;
    for name in ["a.jpg", "b.jpg"] {
        Mock::given(method("GET"))
            .and(path(format!("/img/{name}")))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(name.as_bytes().to_vec(), "image/jpeg"),
            )
            .mount(&server)
            .await;
    }

    let feed = format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/">
<channel>
<title>My Blog</title>
<link>{uri}/</link>
<item>
  <title>Hello</title>
  <link>{uri}/blog/hello/</link>
  <guid>hello-1</guid>
  <pubDate>Fri, 01 Mar 2024 10:00:00 GMT</pubDate>
  <content:encoded><![CDATA[<p>Intro</p><img src="{uri}/img/b.jpg" srcset="{uri}/img/a.jpg 2x, {uri}/img/b.jpg 1x" alt="pic">]]></content:encoded>
</item>
</channel>
</rss>
"#,
        uri = server.uri()
    );
    Mock::given(method("GET"))
        .and(path("/feed"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(feed, "application/rss+xml"))
        .mount(&server)
        .await;

    server
}

fn pipeline_for(output: &TempDir) -> (Arc<Fetcher>, Importer) {
    let client: Arc<dyn CachedClient> =
        Arc::new(HttpCache::new(ClientSettings::default()).expect("client"));
    let mut fetcher = Fetcher::new(client);
    fetcher.set_verbose(false);
    fetcher.set_output_folder(output.path().to_str().unwrap());
    let fetcher = Arc::new(fetcher);

    let mut importer = Importer::new(fetcher.clone());
    importer.set_verbose(false);
    importer.set_output_folder(output.path().to_str().unwrap());
    (fetcher, importer)
}

#[tokio::test]
async fn full_pipeline_writes_markdown_and_reconciles_assets() {
    let server = feed_server().await;
    let output = TempDir::new().unwrap();
    let (fetcher, mut importer) = pipeline_for(&output);

    let source = Rss::new(format!("{}/feed", server.uri()), fetcher.clone());
    let mut entries = source.get_entries().await.expect("entries");
    assert_eq!(entries.len(), 1);

    let summary = importer.import_entries(&mut entries).await;

    let document_path = output.path().join("blog/hello.md");
    let document = fs::read_to_string(&document_path).expect("document written");

    assert!(document.contains("Intro"));
    // The Markdown references exactly one localized image, the
    // highest-resolution candidate.
    assert!(document.contains("![pic](assets/a-"));
    assert!(!document.contains("](assets/b-"));

    // Both srcset candidates were downloaded, the unused one cleaned up.
    let assets_dir = output.path().join("blog/assets");
    let remaining: Vec<_> = fs::read_dir(&assets_dir)
        .expect("assets dir")
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(remaining.len(), 1);
    assert!(remaining[0].starts_with("a-"));

    assert_eq!(summary.imported, 1);
    assert_eq!(summary.skipped, 0);
    assert_eq!(summary.assets, 2);
    assert_eq!(summary.cleaned, 1);
    assert_eq!(summary.failed, 0);
}

#[tokio::test]
async fn safe_mode_rerun_rewrites_nothing() {
    let server = feed_server().await;
    let output = TempDir::new().unwrap();

    {
        let (fetcher, mut importer) = pipeline_for(&output);
        let source = Rss::new(format!("{}/feed", server.uri()), fetcher.clone());
        let mut entries = source.get_entries().await.expect("entries");
        importer.import_entries(&mut entries).await;
    }

    let document_path = output.path().join("blog/hello.md");
    let before = fs::read_to_string(&document_path).expect("first run wrote");

    // A fresh run against the populated output directory.
    let (fetcher, mut importer) = pipeline_for(&output);
    let source = Rss::new(format!("{}/feed", server.uri()), fetcher.clone());
    let mut entries = source.get_entries().await.expect("entries");
    let summary = importer.import_entries(&mut entries).await;

    assert_eq!(summary.imported, 0);
    assert_eq!(summary.skipped, 1);
    assert_eq!(fs::read_to_string(&document_path).unwrap(), before);
}
