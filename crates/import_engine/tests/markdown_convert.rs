use std::fs;

use import_engine::{ContentEntry, ContentType, MarkdownConverter, SourceKind};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn entry_of_kind(kind: SourceKind) -> ContentEntry {
    let mut entry = ContentEntry::new("test-entry".into(), kind);
    entry.url = "https://blog.example/post/".to_string();
    entry.content_type = ContentType::Html;
    entry
}

#[test]
fn generic_blocks_convert_to_markdown() {
    let converter = MarkdownConverter::new();
    let entry = entry_of_kind(SourceKind::Rss);
    let html = r#"<h2>Title</h2><p>See <a href="https://x.example/">link</a> and <strong>bold</strong>.</p><ul><li>one</li><li>two</li></ul>"#;

    let (markdown, usage) = converter.to_markdown(html, &entry);

    assert!(markdown.contains("## Title"));
    assert!(markdown.contains("[link](https://x.example/)"));
    assert!(markdown.contains("**bold**"));
    assert!(markdown.contains("- one\n- two"));
    assert!(usage.keep.is_empty());
    assert!(usage.delete.is_empty());
}

#[test]
fn image_keeps_highest_resolution_candidate_only() {
    let converter = MarkdownConverter::new();
    let mut entry = entry_of_kind(SourceKind::Rss);
    entry.file_path = Some("out/post.md".to_string());

    // Highest-resolution candidate listed first.
    let html = r#"<p><img src="assets/b.jpg" srcset="assets/a.jpg 2x, assets/b.jpg 1x" alt="Alt
text"></p>"#;
    let (markdown, usage) = converter.to_markdown(html, &entry);

    assert!(markdown.contains("![Alt text](assets/a.jpg)"));
    assert!(!markdown.contains("b.jpg)"));
    assert!(usage.keep.contains("out/assets/a.jpg"));
    assert!(usage.delete.contains("out/assets/b.jpg"));
}

#[test]
fn remote_candidates_are_not_tracked_for_cleanup() {
    let converter = MarkdownConverter::new();
    let mut entry = entry_of_kind(SourceKind::Rss);
    entry.file_path = Some("out/post.md".to_string());

    let html = r#"<img src="https://cdn.example/far.jpg" alt="">"#;
    let (markdown, usage) = converter.to_markdown(html, &entry);

    assert!(markdown.contains("![](https://cdn.example/far.jpg)"));
    assert!(usage.keep.is_empty());
}

#[test]
fn picture_source_variants_are_deleted_and_keep_wins() {
    let temp = TempDir::new().unwrap();
    let assets = temp.path().join("assets");
    fs::create_dir_all(&assets).unwrap();
    fs::write(assets.join("a.jpg"), b"a").unwrap();
    fs::write(assets.join("b.jpg"), b"b").unwrap();

    let mut converter = MarkdownConverter::new();
    converter.set_verbose(false);
    let mut entry = entry_of_kind(SourceKind::Rss);
    entry.file_path = Some(temp.path().join("post.md").to_str().unwrap().to_string());

    // Both candidates are in the delete set via <source>; the <img> keeps
    // the same-resolution fallback.
    let html = r#"<picture><source srcset="assets/a.jpg 2x, assets/b.jpg 1x"><img src="assets/a.jpg" alt=""></picture>"#;
    let (markdown, usage) = converter.to_markdown(html, &entry);

    assert!(markdown.contains("![](assets/a.jpg)"));
    assert_eq!(usage.delete.len(), 2);
    assert_eq!(usage.keep.len(), 1);

    converter.cleanup(usage).unwrap();

    // Exactly one asset survives; the kept one is never deleted.
    assert!(assets.join("a.jpg").exists());
    assert!(!assets.join("b.jpg").exists());
    assert_eq!(converter.cleaned_count(), 1);
}

#[test]
fn language_class_yields_fenced_code_block() {
    let converter = MarkdownConverter::new();
    let entry = entry_of_kind(SourceKind::Rss);

    let html = "<pre class=\"language-rust\">fn main() {}</pre>";
    let (markdown, _) = converter.to_markdown(html, &entry);
    assert!(markdown.contains("```rust\nfn main() {}\n```"));
}

#[test]
fn wordpress_preformatted_passthrough_requires_wordpress_origin() {
    let converter = MarkdownConverter::new();
    let html = "<pre class=\"wp-block-preformatted\">plain  text</pre>";

    // WordPress-origin entries pass the block through unchanged.
    let wordpress = entry_of_kind(SourceKind::WordPress);
    let (markdown, _) = converter.to_markdown(html, &wordpress);
    assert!(!markdown.contains("```"));
    assert!(markdown.contains("plain  text"));

    // Any other origin still gets a fenced block.
    let rss = entry_of_kind(SourceKind::Rss);
    let (markdown, _) = converter.to_markdown(html, &rss);
    assert!(markdown.contains("```\nplain  text\n```"));
}

#[test]
fn brush_classes_only_apply_to_wordpress_origin() {
    let converter = MarkdownConverter::new();
    let html = "<pre class=\"brush: jscript; light: true\">var x = 1;</pre>";

    // Legacy highlighter names map to canonical ones.
    let wordpress = entry_of_kind(SourceKind::WordPress);
    let (markdown, _) = converter.to_markdown(html, &wordpress);
    assert!(markdown.contains("```js\nvar x = 1;\n```"));

    let rss = entry_of_kind(SourceKind::Rss);
    let (markdown, _) = converter.to_markdown(html, &rss);
    assert!(markdown.contains("```\nvar x = 1;\n```"));
}

#[test]
fn wordpress_backtick_bookends_are_unwrapped_before_formatting() {
    let converter = MarkdownConverter::new();
    let wordpress = entry_of_kind(SourceKind::WordPress);
    let html = "<pre class=\"language-json\">`{\"a\":1}`</pre>";
    let (markdown, _) = converter.to_markdown(html, &wordpress);
    assert!(markdown.contains("```json"));
    assert!(markdown.contains("\"a\": 1"));
}

#[test]
fn json_formatter_reformats_and_failures_fall_back() {
    let converter = MarkdownConverter::new();
    let entry = entry_of_kind(SourceKind::Rss);

    let html = r#"<pre class="language-json">{"b":1,"a":2}</pre>"#;
    let (markdown, _) = converter.to_markdown(html, &entry);
    assert!(markdown.contains("```json"));
    assert!(markdown.contains("\"a\": 2"));

    // Malformed JSON degrades to the unformatted content.
    let html = r#"<pre class="language-json">{not json}</pre>"#;
    let (markdown, _) = converter.to_markdown(html, &entry);
    assert!(markdown.contains("```json\n{not json}\n```"));
}

#[test]
fn keep_tags_survive_as_raw_markup() {
    let converter = MarkdownConverter::new();
    let entry = entry_of_kind(SourceKind::Rss);

    let html = "<table><tbody><tr><td>cell</td></tr></tbody></table>";
    let (markdown, _) = converter.to_markdown(html, &entry);
    assert!(markdown.contains("<table>"));
    assert!(markdown.contains("<td>cell</td>"));

    let html = "<p>press <kbd>Enter</kbd> now</p>";
    let (markdown, _) = converter.to_markdown(html, &entry);
    assert!(markdown.contains("<kbd>Enter</kbd>"));
}

#[test]
fn preserved_selectors_beat_conversion() {
    let mut converter = MarkdownConverter::new();
    converter.add_preserved_selector(".gallery").unwrap();
    assert!(converter.add_preserved_selector("#nope").is_err());

    let entry = entry_of_kind(SourceKind::Rss);
    let html = r#"<div class="gallery"><img src="assets/x.jpg" alt=""></div>"#;
    let (markdown, usage) = converter.to_markdown(html, &entry);

    assert!(markdown.contains(r#"<div class="gallery">"#));
    // Preserved subtrees are not converted, so nothing is tracked.
    assert!(usage.keep.is_empty());
    assert!(usage.delete.is_empty());
}

#[test]
fn icon_elements_survive_the_empty_element_drop() {
    let converter = MarkdownConverter::new();
    let entry = entry_of_kind(SourceKind::Rss);

    let html = r#"<p>star: <i class="fa-solid fa-star"></i></p>"#;
    let (markdown, _) = converter.to_markdown(html, &entry);
    assert!(markdown.contains(r#"<i class="fa-solid fa-star"></i>"#));

    let html = r#"<svg class="svg-inline--fa" data-icon="star" data-prefix="fas"><path d="m0 0"></path></svg>"#;
    let (markdown, _) = converter.to_markdown(html, &entry);
    assert!(markdown.contains(r#"<i class="fas fa-star"></i>"#));

    // A plain empty <i> still drops.
    let html = "<p>empty: <i></i>!</p>";
    let (markdown, _) = converter.to_markdown(html, &entry);
    assert!(!markdown.contains("<i>"));
}
