use std::sync::Arc;

use ego_tree::NodeId;
use scraper::node::Node;
use scraper::Html;

use crate::fetch::Fetcher;
use crate::types::ContentEntry;

/// Rewrites remote asset references in raw HTML to local fetched copies.
///
/// Must run strictly before Markdown conversion: the converter's keep/delete
/// bookkeeping works on the final, localized URLs.
pub struct HtmlTransformer {
    fetcher: Arc<Fetcher>,
}

/// URL-bearing attributes per asset-producing tag. Everything else passes
/// through untouched (notably `<a href>`).
fn asset_attributes(tag: &str) -> &'static [&'static str] {
    match tag {
        "img" => &["src", "srcset"],
        "video" => &["src", "poster"],
        "source" => &["src", "srcset"],
        "link" => &["href"],
        "script" => &["src"],
        "track" => &["src"],
        _ => &[],
    }
}

impl HtmlTransformer {
    pub fn new(fetcher: Arc<Fetcher>) -> Self {
        Self { fetcher }
    }

    pub async fn transform(&self, content: &str, entry: &ContentEntry) -> String {
        let mut doc = Html::parse_fragment(content);

        // Discover every rewritable attribute first; fetches happen after so
        // the tree walk stays borrow-only.
        let mut found: Vec<(NodeId, &'static str, String)> = Vec::new();
        for node in doc.tree.nodes() {
            let Node::Element(element) = node.value() else {
                continue;
            };
            for &attr in asset_attributes(element.name()) {
                if let Some(value) = element.attr(attr) {
                    if !value.trim().is_empty() {
                        found.push((node.id(), attr, value.to_string()));
                    }
                }
            }
        }

        let mut replacements: Vec<(NodeId, &'static str, String)> = Vec::new();
        for (id, attr, value) in found {
            let new_value = if attr == "srcset" {
                self.localize_srcset(&value, entry).await
            } else {
                self.fetcher.fetch_asset(&value, entry).await
            };
            replacements.push((id, attr, new_value));
        }

        for (id, attr, new_value) in replacements {
            let Some(mut node) = doc.tree.get_mut(id) else {
                continue;
            };
            if let Node::Element(element) = node.value() {
                for (name, value) in element.attrs.iter_mut() {
                    if name.local.as_ref() == attr {
                        *value = new_value.as_str().into();
                    }
                }
            }
        }

        doc.root_element().inner_html()
    }

    /// Rewrites each candidate of a `srcset` value, keeping descriptors.
    async fn localize_srcset(&self, value: &str, entry: &ContentEntry) -> String {
        let mut localized = Vec::new();
        for candidate in value.split(',') {
            let mut parts = candidate.trim().splitn(2, char::is_whitespace);
            let Some(url) = parts.next().filter(|url| !url.is_empty()) else {
                continue;
            };
            let descriptor = parts
                .next()
                .map(|descriptor| descriptor.trim())
                .filter(|descriptor| !descriptor.is_empty());
            let local = self.fetcher.fetch_asset(url, entry).await;
            match descriptor {
                Some(descriptor) => localized.push(format!("{local} {descriptor}")),
                None => localized.push(local),
            }
        }
        localized.join(", ")
    }
}
