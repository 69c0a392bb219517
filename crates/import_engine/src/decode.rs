use chardetng::EncodingDetector;
use encoding_rs::Encoding;

/// Decodes a response body into UTF-8 text: BOM → Content-Type charset →
/// chardetng detection. Malformed sequences are replaced rather than
/// failing; feed ingestion prefers a mangled character over a lost entry.
pub fn decode_body(bytes: &[u8], content_type: Option<&str>) -> String {
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        return decode_with(bytes, encoding);
    }

    if let Some(label) = content_type.and_then(extract_charset) {
        if let Some(encoding) = Encoding::for_label(label.as_bytes()) {
            return decode_with(bytes, encoding);
        }
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding = detector.guess(None, true);
    decode_with(bytes, encoding)
}

fn extract_charset(content_type: &str) -> Option<String> {
    content_type
        .split(';')
        .filter_map(|part| {
            let part = part.trim();
            let (key, value) = part.split_at_checked("charset=".len())?;
            if key.eq_ignore_ascii_case("charset=") {
                Some(value.trim_matches([' ', '"', '\'']).to_string())
            } else {
                None
            }
        })
        .next()
}

fn decode_with(bytes: &[u8], encoding: &'static Encoding) -> String {
    let (text, _, _) = encoding.decode(bytes);
    text.into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn respects_charset_header() {
        let bytes = b"caf\xe9"; // iso-8859-1
        let decoded = decode_body(bytes, Some("text/html; charset=ISO-8859-1"));
        assert_eq!(decoded, "café");
    }

    #[test]
    fn handles_utf8_bom() {
        let bytes = b"\xEF\xBB\xBFhello";
        assert_eq!(decode_body(bytes, Some("text/xml")), "hello");
    }

    #[test]
    fn falls_back_to_detection() {
        let decoded = decode_body("žluťoučký".as_bytes(), None);
        assert_eq!(decoded, "žluťoučký");
    }
}
