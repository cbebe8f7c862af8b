//! Tag-structure parser.
//!
//! Known tags are structural: an unterminated or overlapping known tag is a
//! [`PersonaError::Parse`]. Unknown tags become opaque elements when they are
//! closed later in the text and are treated as literal prose otherwise, so
//! that inline snippets like `Vec<T>` never break a document.

use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;
use regex::Regex;

use super::{Block, Document, OpaqueBlock, Tag};
use crate::error::{PersonaError, PersonaResult};

static TAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"<(/?)([A-Za-z][A-Za-z0-9_-]*)(\s[^<>]*?)?(/?)>").expect("tag pattern is valid")
});

struct OpenElement {
    name: String,
    known: Option<Tag>,
    open_at: usize,
    content_start: usize,
}

struct Element {
    name: String,
    known: Option<Tag>,
    content: std::ops::Range<usize>,
}

/// Parse raw DPML into a [`Document`].
///
/// Repeated occurrences of the same known tag are merged into one block in
/// source order.
pub fn parse_document(raw: &str) -> PersonaResult<Document> {
    let elements = scan_elements(raw)?;

    let mut texts: BTreeMap<Tag, Vec<&str>> = BTreeMap::new();
    let mut opaque = Vec::new();
    for element in &elements {
        let text = &raw[element.content.clone()];
        match element.known {
            Some(tag) => texts.entry(tag).or_default().push(text),
            None => opaque.push(OpaqueBlock {
                name: element.name.clone(),
                text: text.to_string(),
            }),
        }
    }

    let blocks = texts
        .into_iter()
        .map(|(tag, parts)| (tag, Block::new(tag, parts.join("\n\n"))))
        .collect();

    Ok(Document {
        raw: raw.to_string(),
        blocks,
        opaque,
    })
}

fn scan_elements(raw: &str) -> PersonaResult<Vec<Element>> {
    let mut stack: Vec<OpenElement> = Vec::new();
    let mut elements = Vec::new();
    let last_close = closing_positions(raw);

    for caps in TAG_RE.captures_iter(raw) {
        let Some(whole) = caps.get(0) else { continue };
        let closing = !caps[1].is_empty();
        let self_closing = !caps[4].is_empty();
        let name = caps[2].to_ascii_lowercase();
        let known = Tag::from_name(&name);

        if closing {
            match stack.iter().rposition(|open| open.name == name) {
                Some(idx) if idx + 1 == stack.len() => {
                    if let Some(open) = stack.pop() {
                        elements.push(Element {
                            name: open.name,
                            known: open.known,
                            content: open.content_start..whole.start(),
                        });
                    }
                }
                Some(_) => {
                    let inner = stack.last().map(|o| o.name.as_str()).unwrap_or_default();
                    return Err(PersonaError::parse(
                        whole.start(),
                        format!("</{name}> closes while <{inner}> is still open"),
                    ));
                }
                None if known.is_some() => {
                    return Err(PersonaError::parse(
                        whole.start(),
                        format!("unexpected closing tag </{name}>"),
                    ));
                }
                None => {}
            }
            continue;
        }

        if self_closing {
            elements.push(Element {
                name,
                known,
                content: whole.end()..whole.end(),
            });
            continue;
        }

        let closes_later = known.is_some()
            || last_close
                .get(&name)
                .is_some_and(|&at| at >= whole.end());
        if closes_later {
            stack.push(OpenElement {
                name,
                known,
                open_at: whole.start(),
                content_start: whole.end(),
            });
        }
    }

    if let Some(open) = stack.into_iter().next_back() {
        return Err(PersonaError::parse(
            open.open_at,
            format!("unterminated tag <{}>", open.name),
        ));
    }

    elements.sort_by_key(|e| e.content.start);
    Ok(elements)
}

/// Start of the last closing tag for each lowercased name.
fn closing_positions(raw: &str) -> HashMap<String, usize> {
    let mut last = HashMap::new();
    for caps in TAG_RE.captures_iter(raw) {
        if let Some(whole) = caps.get(0) {
            if !caps[1].is_empty() {
                last.insert(caps[2].to_ascii_lowercase(), whole.start());
            }
        }
    }
    last
}
