//! Structural extraction over serialized rich-text documents.
//!
//! Documents are JSON trees of nodes (`{"root": {"children": [...]}}`). Mention
//! nodes carry a `trigger` (`@` for users, `#` for tags), a display `value`
//! and an optional `data` object with metadata. Extraction never fails: a
//! document that cannot be parsed yields no references.

use serde_json::Value;

use crate::MentionRef;

const USER_TRIGGER: &str = "@";
const TAG_TRIGGER: &str = "#";

const BLOCK_TYPES: &[&str] = &["paragraph", "heading", "quote", "listitem", "code"];

/// Mentions and tags found in one document, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedRefs {
    pub mentions: Vec<MentionRef>,
    pub tags: Vec<MentionRef>,
}

/// Collect every `@user` mention and `#tag` reference in `serialized`.
///
/// References are de-duplicated by value; the first occurrence wins.
pub fn extract_mentions_and_tags(serialized: &str) -> ExtractedRefs {
    let mut refs = ExtractedRefs::default();
    let Some(doc) = parse(serialized) else {
        return refs;
    };
    walk(document_root(&doc), &mut refs);
    refs
}

/// Plain-text projection of a serialized document.
///
/// Text nodes are concatenated, mention nodes render as trigger + value and
/// block nodes end with a newline. Unparseable input projects to "".
pub fn plain_text(serialized: &str) -> String {
    let Some(doc) = parse(serialized) else {
        return String::new();
    };
    let mut out = String::new();
    collect_text(document_root(&doc), &mut out);
    out.trim_end().to_string()
}

fn parse(serialized: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(serialized) {
        Ok(doc) => Some(doc),
        Err(err) => {
            log::debug!("ignoring unparseable editor state: {}", err);
            None
        }
    }
}

fn document_root(doc: &Value) -> &Value {
    doc.get("root").unwrap_or(doc)
}

/// `(trigger, value)` when `node` is a mention node.
fn mention_parts(node: &Value) -> Option<(&str, &str)> {
    let trigger = node.get("trigger")?.as_str()?;
    let value = node.get("value")?.as_str()?;
    Some((trigger, value))
}

fn walk(node: &Value, refs: &mut ExtractedRefs) {
    match node {
        Value::Object(_) => {
            if let Some((trigger, value)) = mention_parts(node) {
                let target = match trigger {
                    USER_TRIGGER => Some(&mut refs.mentions),
                    TAG_TRIGGER => Some(&mut refs.tags),
                    _ => None,
                };
                if let Some(target) = target {
                    if !target.iter().any(|r| r.value == value) {
                        target.push(mention_ref(value, node.get("data")));
                    }
                }
            }
            if let Some(children) = node.get("children") {
                walk(children, refs);
            }
        }
        Value::Array(items) => {
            for item in items {
                walk(item, refs);
            }
        }
        _ => {}
    }
}

fn mention_ref(value: &str, data: Option<&Value>) -> MentionRef {
    let field = |name: &str| {
        data.and_then(|d| d.get(name))
            .and_then(Value::as_str)
            .map(String::from)
    };
    MentionRef {
        value: value.to_string(),
        id: field("id"),
        email: field("email"),
        description: field("description"),
        url: field("url"),
    }
}

fn collect_text(node: &Value, out: &mut String) {
    if let Some((trigger, value)) = mention_parts(node) {
        out.push_str(trigger);
        out.push_str(value);
        return;
    }

    let node_type = node.get("type").and_then(Value::as_str).unwrap_or("");
    match node_type {
        "text" => {
            if let Some(text) = node.get("text").and_then(Value::as_str) {
                out.push_str(text);
            }
        }
        "linebreak" => out.push('\n'),
        _ => {
            if let Some(children) = node.get("children").and_then(Value::as_array) {
                for child in children {
                    collect_text(child, out);
                }
            }
            if BLOCK_TYPES.contains(&node_type) && !out.ends_with('\n') {
                out.push('\n');
            }
        }
    }
}
