use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use percent_encoding::percent_decode_str;
use sha2::{Digest, Sha256};
use url::Url;

// 255 total (hash + basename + extension)
const HASH_FILENAME_MAXLENGTH: usize = 12;
const MAXIMUM_URL_FILENAME_SIZE: usize = 30;

/// Compact alphanumeric digest of a source URL, fixed length.
///
/// sha256 → base64 → strip non-alphanumerics → truncate. The suffix keeps
/// two different remote assets with identical basenames from colliding
/// while the filename stays human-scannable.
pub fn url_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    STANDARD
        .encode(digest)
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .take(HASH_FILENAME_MAXLENGTH)
        .collect()
}

/// Deterministic local filename for a remote asset:
/// `<basename-truncated>-<hash>.<extension>`, with the extension falling
/// back to the content-type subtype when the URL's final path segment has
/// none. A pure function of the URL and content type.
pub fn asset_filename(src: &str, content_type: Option<&str>) -> String {
    let pathname = match Url::parse(src) {
        Ok(url) => url.path().to_string(),
        // Not an absolute URL; treat everything before query/fragment as path.
        Err(_) => src
            .split(['?', '#'])
            .next()
            .unwrap_or(src)
            .to_string(),
    };

    let raw_basename = pathname.rsplit('/').next().unwrap_or("");
    let basename = percent_decode_str(raw_basename)
        .decode_utf8_lossy()
        .into_owned();
    let hash = url_hash(src);

    if let Some(last_dot) = basename.rfind('.') {
        let stem = truncate_str(&basename, last_dot.min(MAXIMUM_URL_FILENAME_SIZE));
        let extension = &basename[last_dot + 1..];
        return format!("{stem}-{hash}.{extension}");
    }

    let stem = truncate_str(&basename, MAXIMUM_URL_FILENAME_SIZE);
    match extension_from_content_type(content_type) {
        Some(extension) => format!("{stem}-{hash}.{extension}"),
        None => format!("{stem}-{hash}"),
    }
}

fn extension_from_content_type(content_type: Option<&str>) -> Option<String> {
    let content_type = content_type?.split(';').next()?.trim();
    let subtype = content_type.split('/').nth(1)?;
    if subtype.is_empty() {
        return None;
    }
    Some(subtype.to_string())
}

/// Byte-capped prefix, adjusted down to a char boundary.
fn truncate_str(value: &str, max: usize) -> &str {
    if value.len() <= max {
        return value;
    }
    let mut end = max;
    while end > 0 && !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}
