//! `@protocol://id` reference tokens and resource URLs.

use std::fmt;
use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{PersonaError, PersonaResult};

static TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"@([!?])?([A-Za-z][A-Za-z0-9_-]*)://([^\s<>()\[\]{}"'`,;]+)"#)
        .expect("token pattern is valid")
});

static URL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(@[!?]?)?([A-Za-z][A-Za-z0-9_-]*)://(\S+)$").expect("url pattern is valid")
});

/// Loading marker in front of a reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadingSemantics {
    /// `@`: inline the content.
    #[default]
    Default,
    /// `@!`: inline the content, loaded eagerly.
    Eager,
    /// `@?`: leave a pointer, fetch on demand.
    Lazy,
}

impl LoadingSemantics {
    fn from_marker(marker: Option<&str>) -> Self {
        match marker {
            Some("!") | Some("@!") => Self::Eager,
            Some("?") | Some("@?") => Self::Lazy,
            _ => Self::Default,
        }
    }

    pub fn prefix(self) -> &'static str {
        match self {
            Self::Default => "@",
            Self::Eager => "@!",
            Self::Lazy => "@?",
        }
    }

    /// Whether a token with this marker is fetched and inlined during composition.
    pub fn inlines(self) -> bool {
        !matches!(self, Self::Lazy)
    }
}

/// Identity used for the cycle/duplicate guard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub protocol: String,
    pub id: String,
}

impl ResourceKey {
    pub fn new(protocol: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.protocol, self.id)
    }
}

/// A parsed resource URL: `(@[!?]?)?protocol://resourceId`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResourceRef {
    pub loading: LoadingSemantics,
    pub protocol: String,
    pub resource: String,
}

impl ResourceRef {
    pub fn new(protocol: impl Into<String>, resource: impl Into<String>) -> Self {
        Self {
            loading: LoadingSemantics::Default,
            protocol: protocol.into(),
            resource: resource.into(),
        }
    }

    pub fn parse(url: &str) -> PersonaResult<Self> {
        let url = url.trim();
        let caps = URL_RE
            .captures(url)
            .ok_or_else(|| PersonaError::InvalidReference(url.to_string()))?;
        Ok(Self {
            loading: LoadingSemantics::from_marker(caps.get(1).map(|m| m.as_str())),
            protocol: caps[2].to_string(),
            resource: caps[3].to_string(),
        })
    }

    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(&self.protocol, &self.resource)
    }
}

impl fmt::Display for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}://{}",
            self.loading.prefix(),
            self.protocol,
            self.resource
        )
    }
}

/// A reference found inside a block, with its byte span in that block's text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceToken {
    pub target: ResourceRef,
    pub span: Range<usize>,
}

impl ReferenceToken {
    pub fn protocol(&self) -> &str {
        &self.target.protocol
    }

    pub fn resource(&self) -> &str {
        &self.target.resource
    }

    pub fn loading(&self) -> LoadingSemantics {
        self.target.loading
    }

    pub fn key(&self) -> ResourceKey {
        self.target.key()
    }
}

/// Find every reference token in `text`, in source order.
///
/// Trailing sentence punctuation is not part of an identifier, and an `@`
/// glued to a preceding word (`user@host://`) does not start a token.
pub fn scan_references(text: &str) -> Vec<ReferenceToken> {
    let mut tokens = Vec::new();
    for caps in TOKEN_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let glued = text[..whole.start()]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_alphanumeric());
        if glued {
            continue;
        }

        let raw_id = &caps[3];
        let id = raw_id.trim_end_matches(['.', ':', '!', '?', '。', '，', '、']);
        if id.is_empty() {
            continue;
        }
        let end = whole.end() - (raw_id.len() - id.len());

        tokens.push(ReferenceToken {
            target: ResourceRef {
                loading: LoadingSemantics::from_marker(caps.get(1).map(|m| m.as_str())),
                protocol: caps[2].to_string(),
                resource: id.to_string(),
            },
            span: whole.start()..end,
        });
    }
    tokens
}
