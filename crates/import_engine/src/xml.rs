use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::{Map, Value};
use thiserror::Error;

/// Attribute keys in decoded documents carry this prefix, so `<link
/// rel="alternate">` decodes as `{"link": {"@_rel": "alternate"}}`.
pub const ATTRIBUTE_PREFIX: &str = "@_";

#[derive(Debug, Error)]
pub enum XmlError {
    #[error("xml parse error: {0}")]
    Parse(#[from] quick_xml::Error),
    #[error("xml attribute error: {0}")]
    Attribute(#[from] quick_xml::events::attributes::AttrError),
}

/// Decodes an XML document into a dynamic JSON-shaped value.
///
/// Shape rules: single child elements decode as objects, repeated siblings
/// promote to arrays, attributes are `@_`-prefixed with boolean and numeric
/// value coercion, and element text lands under `#text` (or becomes a bare
/// string when the element has neither attributes nor children).
///
/// Entities are intentionally NOT expanded: `&amp;` stays `&amp;` in decoded
/// text so downstream HTML handling never double-decodes. Some providers
/// (notably Bluesky feeds) pre-encode entity sequences in ways that break
/// under a second expansion.
pub fn xml_to_value(content: &str) -> Result<Value, XmlError> {
    let mut reader = Reader::from_str(content);
    {
        let config = reader.config_mut();
        config.trim_text_start = true;
        config.trim_text_end = true;
        // Uniform Start/End pairs for `<link/>`-style empty elements.
        config.expand_empty_elements = true;
    }

    struct Frame {
        name: String,
        map: Map<String, Value>,
        text: String,
    }

    let mut root = Map::new();
    let mut stack: Vec<Frame> = Vec::new();

    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                let mut map = Map::new();
                for attribute in start.attributes() {
                    let attribute = attribute?;
                    let key = format!(
                        "{ATTRIBUTE_PREFIX}{}",
                        String::from_utf8_lossy(attribute.key.as_ref())
                    );
                    // Raw bytes, not unescaped: entity preservation.
                    let raw = String::from_utf8_lossy(&attribute.value).into_owned();
                    map.insert(key, coerce_attribute_value(&raw));
                }
                stack.push(Frame {
                    name,
                    map,
                    text: String::new(),
                });
            }
            Event::Text(text) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&String::from_utf8_lossy(&text));
                }
            }
            Event::CData(cdata) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&String::from_utf8_lossy(&cdata.into_inner()));
                }
            }
            Event::End(_) => {
                let frame = match stack.pop() {
                    Some(frame) => frame,
                    None => continue,
                };
                let value = finish_element(frame.map, frame.text);
                let parent = match stack.last_mut() {
                    Some(parent) => &mut parent.map,
                    None => &mut root,
                };
                insert_child(parent, frame.name, value);
            }
            Event::Eof => break,
            // Declarations, comments, doctypes, and PIs carry no content.
            _ => {}
        }
    }

    Ok(Value::Object(root))
}

fn finish_element(map: Map<String, Value>, text: String) -> Value {
    if map.is_empty() {
        return Value::String(text);
    }
    let mut map = map;
    if !text.is_empty() {
        map.insert("#text".to_string(), Value::String(text));
    }
    Value::Object(map)
}

/// Repeated sibling names promote the existing value to an array.
fn insert_child(map: &mut Map<String, Value>, key: String, value: Value) {
    match map.get_mut(&key) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            map.insert(key, value);
        }
    }
}

fn coerce_attribute_value(raw: &str) -> Value {
    match raw {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }
    if let Ok(integer) = raw.parse::<i64>() {
        return Value::Number(integer.into());
    }
    if let Ok(float) = raw.parse::<f64>() {
        if let Some(number) = serde_json::Number::from_f64(float) {
            return Value::Number(number);
        }
    }
    Value::String(raw.to_string())
}
