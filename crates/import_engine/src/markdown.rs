use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::Path;

use ego_tree::NodeRef;
use import_logging::{import_error, import_info};
use scraper::node::Node;
use scraper::{ElementRef, Html};
use thiserror::Error;

use crate::dirs::{path_join, DirectoryManager};
use crate::types::ContentEntry;

/// Inline semantic/media tags preserved verbatim as raw markup instead of
/// lossy-converted.
const TAGS_TO_KEEP: &[&str] = &[
    "abbr", "address", "audio", "cite", "dd", "del", "details", "dfn", "form", "iframe", "ins",
    "kbd", "object", "q", "sub", "s", "samp", "svg", "table", "time", "var", "video", "wbr",
];

/// Legacy syntax-highlighter names to canonical ones.
const WORDPRESS_TO_PRISM_LANGUAGE_TRANSLATION: &[(&str, &str)] =
    &[("jscript", "js"), ("markup", "html")];

#[derive(Debug, Error)]
pub enum MarkdownError {
    #[error("invalid preserved selector {0:?}: only class selectors are supported")]
    InvalidSelector(String),
    #[error("io error during asset cleanup: {0}")]
    Io(#[from] io::Error),
}

/// Reformats fenced code block content for languages it recognizes.
/// Formatting failures degrade to unformatted content, never fail a
/// document.
pub trait CodeFormatter: Send + Sync {
    fn supports(&self, language: &str) -> bool;
    fn format(&self, content: &str, language: &str) -> Result<String, String>;
}

/// Built-in formatter: pretty-prints `json` code blocks.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCodeFormatter;

impl CodeFormatter for JsonCodeFormatter {
    fn supports(&self, language: &str) -> bool {
        language == "json"
    }

    fn format(&self, content: &str, _language: &str) -> Result<String, String> {
        let value: serde_json::Value =
            serde_json::from_str(content).map_err(|err| err.to_string())?;
        serde_json::to_string_pretty(&value).map_err(|err| err.to_string())
    }
}

/// Asset bookkeeping for one conversion: paths referenced by the emitted
/// Markdown (`keep`) and paths the simplification dropped (`delete`). Both
/// are keyed by the recontextualized relative path. Per-call state; paths
/// never leak between entries.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AssetUsage {
    pub keep: HashSet<String>,
    pub delete: HashSet<String>,
}

/// HTML to Markdown conversion with a fixed simplification policy and
/// asset-usage tracking.
pub struct MarkdownConverter {
    preserved_selectors: Vec<String>,
    formatters: Vec<Box<dyn CodeFormatter>>,
    verbose: bool,
    cleaned_count: usize,
}

impl Default for MarkdownConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownConverter {
    pub fn new() -> Self {
        Self {
            preserved_selectors: Vec::new(),
            formatters: vec![Box::new(JsonCodeFormatter)],
            verbose: true,
            cleaned_count: 0,
        }
    }

    pub fn set_verbose(&mut self, verbose: bool) {
        self.verbose = verbose;
    }

    /// Registers a `.class` selector whose matching nodes are preserved as
    /// raw HTML instead of converted.
    pub fn add_preserved_selector(&mut self, selector: &str) -> Result<(), MarkdownError> {
        if !selector.starts_with('.') {
            return Err(MarkdownError::InvalidSelector(selector.to_string()));
        }
        self.preserved_selectors.push(selector.to_string());
        Ok(())
    }

    pub fn add_formatter(&mut self, formatter: Box<dyn CodeFormatter>) {
        self.formatters.push(formatter);
    }

    /// Files deleted across all cleanup passes so far.
    pub fn cleaned_count(&self) -> usize {
        self.cleaned_count
    }

    fn formatter_for(&self, language: &str) -> Option<&dyn CodeFormatter> {
        if language.is_empty() {
            return None;
        }
        self.formatters
            .iter()
            .find(|formatter| formatter.supports(language))
            .map(|formatter| formatter.as_ref())
    }

    /// Converts localized HTML to Markdown, returning the document plus the
    /// asset keep/delete sets accumulated across every node visited.
    pub fn to_markdown(&self, html: &str, entry: &ContentEntry) -> (String, AssetUsage) {
        let doc = Html::parse_fragment(html);
        let mut conversion = Conversion {
            converter: self,
            is_from_wordpress: entry.kind.is_wordpress(),
            file_path: entry.file_path.as_deref(),
            document_label: entry
                .file_path
                .clone()
                .unwrap_or_else(|| entry.url.clone()),
            usage: AssetUsage::default(),
        };

        let mut out = String::new();
        for child in doc.root_element().children() {
            out.push_str(&conversion.render_node(child));
        }

        (normalize_blank_lines(&out), conversion.usage)
    }

    /// Deletes every asset marked for deletion that was not also kept,
    /// removing files from disk when present. Run once per entry.
    pub fn cleanup(&mut self, mut usage: AssetUsage) -> Result<(), MarkdownError> {
        // An asset in both sets is never deleted.
        for asset in &usage.keep {
            usage.delete.remove(asset);
        }

        for asset in usage.delete {
            if Path::new(&asset).exists() {
                if self.verbose {
                    import_info!("Cleaning unused asset {asset}");
                }
                self.cleaned_count += 1;
                fs::remove_file(&asset)?;
            }
        }
        Ok(())
    }
}

/// Candidate URLs of a `srcset` attribute, highest resolution first.
/// Descriptor-less candidates sort last in declaration order.
pub(crate) fn srcset_urls(attr: Option<&str>) -> Vec<String> {
    let mut candidates: Vec<(String, f64)> = attr
        .unwrap_or("")
        .split(',')
        .filter_map(|candidate| {
            let mut parts = candidate.trim().split_whitespace();
            let url = parts.next()?.to_string();
            if url.is_empty() {
                return None;
            }
            let resolution = parts
                .next()
                .and_then(|descriptor| {
                    descriptor
                        .trim_end_matches(['w', 'x', 'h'])
                        .parse::<f64>()
                        .ok()
                })
                .unwrap_or(0.0);
            Some((url, resolution))
        })
        .collect();
    candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    candidates.into_iter().map(|(url, _)| url).collect()
}

/// All candidate URLs of an image: resolution-ordered `srcset` candidates,
/// then the plain `src`, deduplicated in order.
pub(crate) fn image_src_urls(srcset: Option<&str>, src: Option<&str>) -> Vec<String> {
    let mut urls = srcset_urls(srcset);
    if let Some(src) = src {
        if !src.is_empty() && !urls.iter().any(|url| url == src) {
            urls.push(src.to_string());
        }
    }
    urls
}

struct Conversion<'a> {
    converter: &'a MarkdownConverter,
    is_from_wordpress: bool,
    file_path: Option<&'a str>,
    document_label: String,
    usage: AssetUsage,
}

impl Conversion<'_> {
    fn render_node(&mut self, node: NodeRef<'_, Node>) -> String {
        match node.value() {
            Node::Text(text) => collapse_whitespace(text),
            Node::Element(_) => ElementRef::wrap(node)
                .map(|element| self.render_element(element))
                .unwrap_or_default(),
            _ => String::new(),
        }
    }

    fn render_children(&mut self, element: ElementRef<'_>) -> String {
        let mut out = String::new();
        for child in element.children() {
            out.push_str(&self.render_node(child));
        }
        out
    }

    fn render_element(&mut self, element: ElementRef<'_>) -> String {
        let tag = element.value().name().to_ascii_lowercase();

        // Caller-preserved class rules beat every other conversion rule.
        if self
            .converter
            .preserved_selectors
            .iter()
            .any(|selector| has_class(element, selector))
        {
            return element.html();
        }

        match tag.as_str() {
            "pre" => return self.render_code_block(element),
            "source" => return self.render_source(element),
            "img" => return self.render_image(element),
            "i" => return self.render_italic_or_icon(element),
            "svg" => return self.render_svg(element),
            _ => {}
        }

        if TAGS_TO_KEEP.contains(&tag.as_str()) {
            return if is_block_tag(&tag) {
                format!("\n\n{}\n\n", element.html())
            } else {
                element.html()
            };
        }

        match tag.as_str() {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level: usize = tag[1..].parse().unwrap_or(1);
                let content = self.render_children(element);
                format!("\n\n{} {}\n\n", "#".repeat(level), content.trim())
            }
            "p" => {
                let content = self.render_children(element);
                format!("\n\n{}\n\n", content.trim())
            }
            "br" => "\n".to_string(),
            "hr" => "\n\n---\n\n".to_string(),
            "strong" | "b" => {
                let content = self.render_children(element);
                let trimmed = content.trim();
                if trimmed.is_empty() {
                    String::new()
                } else {
                    format!("**{trimmed}**")
                }
            }
            "em" => {
                let content = self.render_children(element);
                let trimmed = content.trim();
                if trimmed.is_empty() {
                    String::new()
                } else {
                    format!("_{trimmed}_")
                }
            }
            "code" => {
                let content = self.render_children(element);
                let trimmed = content.trim();
                if trimmed.is_empty() {
                    String::new()
                } else {
                    format!("`{trimmed}`")
                }
            }
            "a" => {
                let content = self.render_children(element);
                match element.value().attr("href").map(str::trim) {
                    Some(href) if !href.is_empty() => {
                        format!("[{}]({href})", content.trim())
                    }
                    _ => content,
                }
            }
            "blockquote" => {
                let content = self.render_children(element);
                let quoted = content
                    .trim()
                    .lines()
                    .map(|line| format!("> {line}"))
                    .collect::<Vec<_>>()
                    .join("\n");
                format!("\n\n{quoted}\n\n")
            }
            "ul" => self.render_list(element, false),
            "ol" => self.render_list(element, true),
            "script" | "style" | "noscript" | "template" | "head" => String::new(),
            _ => {
                let content = self.render_children(element);
                // Unrecognized block-level tags get blank-line padding to
                // avoid run-together text.
                if is_block_tag(&tag) {
                    format!("\n\n{}\n\n", content.trim())
                } else {
                    content
                }
            }
        }
    }

    fn render_list(&mut self, element: ElementRef<'_>, ordered: bool) -> String {
        let mut out = String::from("\n\n");
        let mut index = 1usize;
        for child in element.children() {
            let Some(item) = ElementRef::wrap(child) else {
                continue;
            };
            if !item.value().name().eq_ignore_ascii_case("li") {
                continue;
            }
            let marker = if ordered {
                format!("{index}. ")
            } else {
                "- ".to_string()
            };
            let content = self.render_children(item);
            out.push_str(&marker);
            out.push_str(&indent_continuation_lines(content.trim(), marker.len()));
            out.push('\n');
            index += 1;
        }
        out.push('\n');
        out
    }

    /// `<picture>` srcset variants are intentionally dropped by the
    /// simplification; mark every candidate for deletion.
    fn render_source(&mut self, element: ElementRef<'_>) -> String {
        let parent_is_picture = element
            .parent()
            .and_then(ElementRef::wrap)
            .is_some_and(|parent| parent.value().name().eq_ignore_ascii_case("picture"));
        if parent_is_picture {
            for url in srcset_urls(element.value().attr("srcset")) {
                if let Some(asset) = self.recontextify(&url) {
                    self.usage.delete.insert(asset);
                }
            }
        }
        self.render_children(element)
    }

    /// Emits a single Markdown image from the highest-resolution candidate;
    /// every other candidate is marked for deletion.
    fn render_image(&mut self, element: ElementRef<'_>) -> String {
        let candidates = image_src_urls(
            element.value().attr("srcset"),
            element.value().attr("src"),
        );
        let Some((src, remaining)) = candidates.split_first() else {
            return String::new();
        };

        if let Some(asset) = self.recontextify(src) {
            self.usage.keep.insert(asset);
        }
        for url in remaining {
            if let Some(asset) = self.recontextify(url) {
                self.usage.delete.insert(asset);
            }
        }

        // Newlines are stripped by Markdown renderers anyway.
        let alt = element.value().attr("alt").unwrap_or("");
        let alt = collapse_newline_runs(alt);
        let alt = html_escape::encode_double_quoted_attribute(&alt);
        format!("![{alt}]({src})")
    }

    /// Icon-font `<i>` elements survive the drop-empty-elements rule.
    fn render_italic_or_icon(&mut self, element: ElementRef<'_>) -> String {
        if has_class(element, "|=fa") && is_blank(element) {
            return element.html();
        }
        let content = self.render_children(element);
        let trimmed = content.trim();
        if trimmed.is_empty() {
            String::new()
        } else {
            format!("_{trimmed}_")
        }
    }

    /// Recognized inline icon svgs are re-emitted as the equivalent `<i>`;
    /// other blank svgs drop, non-blank ones are kept raw.
    fn render_svg(&mut self, element: ElementRef<'_>) -> String {
        if has_class(element, "svg-inline--fa") {
            let icon = element.value().attr("data-icon");
            let prefix = element.value().attr("data-prefix");
            if let (Some(icon), Some(prefix)) = (icon, prefix) {
                return format!("<i class=\"{prefix} fa-{icon}\"></i>");
            }
        }
        if is_blank(element) {
            return String::new();
        }
        element.html()
    }

    fn render_code_block(&mut self, element: ElementRef<'_>) -> String {
        let class_attr = element.value().attr("class").unwrap_or("").to_string();
        let classes: Vec<&str> = class_attr.split(' ').collect();

        let is_preformatted_wordpress_block =
            classes.iter().any(|class| *class == "wp-block-preformatted");
        if is_preformatted_wordpress_block && self.is_from_wordpress {
            return element_text(element);
        }

        let mut language = classes
            .iter()
            .find_map(|class| class.strip_prefix("language-"))
            .map(|language| language.trim().to_string());
        if language.is_none() && self.is_from_wordpress {
            // Legacy SyntaxHighlighter convention: class="brush: php; light: true"
            language = class_attr
                .split(';')
                .find(|entry| entry.starts_with("brush:"))
                .and_then(|entry| entry.split(':').nth(1))
                .map(|language| language.trim().to_string());
        }
        let language = language.filter(|language| !language.is_empty());

        let mut final_language = language.clone().unwrap_or_default();
        let mut content = element_text(element);

        if self.is_from_wordpress {
            if let Some(language) = &language {
                final_language = WORDPRESS_TO_PRISM_LANGUAGE_TRANSLATION
                    .iter()
                    .find(|(from, _)| from == language)
                    .map(|(_, to)| to.to_string())
                    .unwrap_or_else(|| language.clone());
            }
            // Code blocks unnecessarily bookended with backticks.
            let trimmed = content.trim();
            if trimmed.len() >= 2 && trimmed.starts_with('`') && trimmed.ends_with('`') {
                content = trimmed[1..trimmed.len() - 1].to_string();
            }
        }

        let mislabeled_markup = self.is_from_wordpress
            && language.as_deref() == Some("markup")
            && !content.trim_start().starts_with('<');

        if mislabeled_markup {
            // Mislabeled as markup (hi WordPress); leave it alone.
        } else if let Some(formatter) = self.converter.formatter_for(&final_language) {
            match formatter.format(&content, &final_language) {
                Ok(formatted) => content = formatted,
                Err(err) => {
                    let language_note = language
                        .as_deref()
                        .map(|language| format!(" ({language})"))
                        .unwrap_or_default();
                    import_error!(
                        "Error running code formatting on code block from {}{language_note}. Returning unformatted code: {err}",
                        self.document_label
                    );
                }
            }
        } else {
            // No formatter: strip any remaining tags and decode entities,
            // preserving whitespace.
            content = html_escape::decode_html_entities(&strip_tags(&element.inner_html()))
                .into_owned();
        }

        format!("\n\n```{final_language}\n{}\n```\n\n", content.trim())
    }

    /// An asset path expressed relative to the importing document's own
    /// output directory. Absolute and remote paths are not tracked.
    fn recontextify(&self, asset_path: &str) -> Option<String> {
        if Path::new(asset_path).is_absolute()
            || asset_path.starts_with("https:")
            || asset_path.starts_with("http:")
        {
            return None;
        }
        match self.file_path {
            Some(file_path) => Some(path_join(&[
                &DirectoryManager::parent_directory(file_path),
                asset_path,
            ])),
            None => Some(asset_path.to_string()),
        }
    }
}

/// Supports `.class` selectors plus the `|=` prefix-match form
/// (equal, or equal followed by a hyphen).
fn has_class(element: ElementRef<'_>, selector: &str) -> bool {
    let expected = selector.strip_prefix('.').unwrap_or(selector);
    element
        .value()
        .attr("class")
        .is_some_and(|classes| classes.split(' ').any(|entry| matches_class_entry(entry, expected)))
}

fn matches_class_entry(value: &str, expected: &str) -> bool {
    if let Some(actual) = expected.strip_prefix("|=") {
        return value == actual || value.starts_with(&format!("{actual}-"));
    }
    value == expected
}

fn is_blank(element: ElementRef<'_>) -> bool {
    element.text().all(|text| text.trim().is_empty())
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect()
}

fn is_block_tag(tag: &str) -> bool {
    matches!(
        tag,
        "address"
            | "article"
            | "aside"
            | "audio"
            | "blockquote"
            | "details"
            | "div"
            | "dl"
            | "dd"
            | "dt"
            | "fieldset"
            | "figcaption"
            | "figure"
            | "footer"
            | "form"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "header"
            | "hr"
            | "iframe"
            | "li"
            | "main"
            | "nav"
            | "ol"
            | "p"
            | "picture"
            | "pre"
            | "section"
            | "table"
            | "ul"
            | "video"
    )
}

/// Lines after the first are indented under a list marker.
fn indent_continuation_lines(content: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    content
        .lines()
        .enumerate()
        .map(|(index, line)| {
            if index == 0 {
                line.to_string()
            } else {
                format!("{pad}{line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_whitespace = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !in_whitespace {
                out.push(' ');
            }
            in_whitespace = true;
        } else {
            out.push(ch);
            in_whitespace = false;
        }
    }
    out
}

fn collapse_newline_runs(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_newlines = false;
    for ch in text.chars() {
        if ch == '\n' || ch == '\r' {
            if !in_newlines {
                out.push(' ');
            }
            in_newlines = true;
        } else {
            out.push(ch);
            in_newlines = false;
        }
    }
    out
}

fn strip_tags(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' if in_tag => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}

/// Collapses runs of blank lines to one and trims the document, leaving
/// fenced code block interiors untouched.
fn normalize_blank_lines(markdown: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut blank_run = 0usize;
    let mut in_fence = false;

    for line in markdown.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            blank_run = 0;
            lines.push(line.trim_end().to_string());
            continue;
        }
        if in_fence {
            lines.push(line.to_string());
            continue;
        }
        let line = line.trim_end();
        if line.is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        lines.push(line.to_string());
    }

    let joined = lines.join("\n");
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{trimmed}\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn srcset_orders_highest_resolution_first() {
        assert_eq!(
            srcset_urls(Some("/small.jpg 375w, /medium.jpg 650w")),
            vec!["/medium.jpg".to_string(), "/small.jpg".to_string()]
        );
        assert_eq!(
            srcset_urls(Some("a.jpg 2x, b.jpg 1x")),
            vec!["a.jpg".to_string(), "b.jpg".to_string()]
        );
        assert!(srcset_urls(None).is_empty());
        assert!(srcset_urls(Some("")).is_empty());
    }

    #[test]
    fn image_urls_deduplicate_src_against_srcset() {
        let urls = image_src_urls(Some("a.jpg 2x, b.jpg 1x"), Some("a.jpg"));
        assert_eq!(urls, vec!["a.jpg".to_string(), "b.jpg".to_string()]);
    }

    #[test]
    fn class_matching_supports_prefix_form() {
        assert!(matches_class_entry("fa", "|=fa"));
        assert!(matches_class_entry("fa-solid", "|=fa"));
        assert!(!matches_class_entry("fancy", "|=fa"));
        assert!(matches_class_entry("note", "note"));
    }

    #[test]
    fn blank_line_normalization_preserves_fences() {
        let input = "a\n\n\n\nb\n\n```\nline1\n\n\nline2\n```\n\n\nc";
        let normalized = normalize_blank_lines(input);
        assert_eq!(
            normalized,
            "a\n\nb\n\n```\nline1\n\n\nline2\n```\n\nc\n"
        );
    }

    #[test]
    fn strip_tags_removes_markup_and_keeps_text() {
        assert_eq!(strip_tags("a <b>bold</b> move"), "a bold move");
        assert_eq!(strip_tags("no tags"), "no tags");
    }
}
