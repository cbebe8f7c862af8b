//! DPML: the tagged markup roles, thoughts and executions are written in.
//!
//! ```text
//! <role>
//!   <personality>@!thought://remember Curious and direct.</personality>
//!   <principle>@!execution://review</principle>
//!   <knowledge>@project://finance.md background info</knowledge>
//! </role>
//! ```
//!
//! [`parse_document`] turns raw text into a [`Document`]: one [`Block`] per
//! known tag, each carrying its raw text, the [`ReferenceToken`]s found in
//! it, and whether it holds prose beyond a bare reference list
//! (`full_semantics`). Parsing is a pure text transform.

mod parser;
pub mod reference;

pub use parser::parse_document;
pub use reference::{
    scan_references, LoadingSemantics, ReferenceToken, ResourceKey, ResourceRef,
};

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// The fixed tag vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tag {
    Role,
    Personality,
    Principle,
    Knowledge,
    Thought,
    Exploration,
    Reasoning,
    Challenge,
    Plan,
    Execution,
    Constraint,
    Rule,
    Guideline,
    Process,
    Criteria,
}

impl Tag {
    pub const ALL: [Tag; 15] = [
        Tag::Role,
        Tag::Personality,
        Tag::Principle,
        Tag::Knowledge,
        Tag::Thought,
        Tag::Exploration,
        Tag::Reasoning,
        Tag::Challenge,
        Tag::Plan,
        Tag::Execution,
        Tag::Constraint,
        Tag::Rule,
        Tag::Guideline,
        Tag::Process,
        Tag::Criteria,
    ];

    /// Sections a role is composed from, in rendering order.
    pub const ROLE_SECTIONS: [Tag; 3] = [Tag::Personality, Tag::Principle, Tag::Knowledge];

    pub fn as_str(self) -> &'static str {
        match self {
            Tag::Role => "role",
            Tag::Personality => "personality",
            Tag::Principle => "principle",
            Tag::Knowledge => "knowledge",
            Tag::Thought => "thought",
            Tag::Exploration => "exploration",
            Tag::Reasoning => "reasoning",
            Tag::Challenge => "challenge",
            Tag::Plan => "plan",
            Tag::Execution => "execution",
            Tag::Constraint => "constraint",
            Tag::Rule => "rule",
            Tag::Guideline => "guideline",
            Tag::Process => "process",
            Tag::Criteria => "criteria",
        }
    }

    pub fn from_name(name: &str) -> Option<Tag> {
        let lower = name.to_ascii_lowercase();
        Tag::ALL.into_iter().find(|t| t.as_str() == lower)
    }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A tagged section of a parsed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub tag: Tag,
    pub text: String,
    pub references: Vec<ReferenceToken>,
    pub full_semantics: bool,
}

impl Block {
    pub fn new(tag: Tag, text: impl Into<String>) -> Self {
        let text = text.into();
        let references = scan_references(&text);
        let full_semantics = has_prose(&text, &references);
        Self {
            tag,
            text,
            references,
            full_semantics,
        }
    }
}

/// True when `text` contains anything besides reference tokens, whitespace
/// and list separators.
fn has_prose(text: &str, references: &[ReferenceToken]) -> bool {
    let mut cursor = 0;
    let mut rest = String::with_capacity(text.len());
    for token in references {
        rest.push_str(&text[cursor..token.span.start]);
        cursor = token.span.end;
    }
    rest.push_str(&text[cursor..]);
    rest.chars().any(|c| !c.is_whitespace() && !is_separator(c))
}

fn is_separator(c: char) -> bool {
    matches!(c, ',' | ';' | '|' | '*' | '-' | '•' | '，' | '；' | '、')
}

/// An element whose tag is outside the known vocabulary. Kept verbatim, never composed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpaqueBlock {
    pub name: String,
    pub text: String,
}

/// Raw text plus its parsed blocks. Lives for one resolve request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    pub raw: String,
    pub blocks: BTreeMap<Tag, Block>,
    pub opaque: Vec<OpaqueBlock>,
}

impl Document {
    pub fn block(&self, tag: Tag) -> Option<&Block> {
        self.blocks.get(&tag)
    }

    /// Whether the text contained any markup element at all.
    pub fn has_markup(&self) -> bool {
        !self.blocks.is_empty() || !self.opaque.is_empty()
    }

    /// Every reference in the raw text, independent of block structure.
    pub fn references(&self) -> Vec<ReferenceToken> {
        scan_references(&self.raw)
    }
}
