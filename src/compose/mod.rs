//! Semantic composition: recursive resolution and inlining of references.
//!
//! Composition walks reference tokens depth first in source order. Every
//! `(protocol, id)` is emitted at most once per top-level call; a
//! [`CompositionPass`] carries that visited set and is created fresh for each
//! call, so nothing leaks between requests. A token that cannot be resolved
//! is replaced by an inline marker and composition moves on. Failures that
//! are not about one token, such as a registry that cannot bootstrap, are
//! returned instead.

mod role;

pub use role::{ComposedRole, LoadedSkill, RoleInfo};

use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::ComposeConfig;
use crate::dpml::{parse_document, Block, ReferenceToken, ResourceKey, ResourceRef};
use crate::error::{PersonaError, PersonaResult};
use crate::resource::ResourceManager;

/// One reference that could not be inlined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComposeFailure {
    pub reference: String,
    pub error: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositionStatus {
    Composed,
    /// Usable text with inline markers for the failed references.
    PartiallyFailed,
}

/// State local to one top-level composition call.
#[derive(Debug, Default)]
pub struct CompositionPass {
    visited: HashSet<ResourceKey>,
    failures: Vec<ComposeFailure>,
    suppressed: Vec<ResourceKey>,
}

impl CompositionPass {
    pub fn new() -> Self {
        Self::default()
    }

    /// A pass that treats `keys` as already emitted.
    pub fn with_visited(keys: impl IntoIterator<Item = ResourceKey>) -> Self {
        Self {
            visited: keys.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Mark `key` visited. Returns false when it already was.
    pub fn visit(&mut self, key: ResourceKey) -> bool {
        self.visited.insert(key)
    }

    pub fn is_visited(&self, key: &ResourceKey) -> bool {
        self.visited.contains(key)
    }

    pub fn failures(&self) -> &[ComposeFailure] {
        &self.failures
    }

    pub fn suppressed(&self) -> &[ResourceKey] {
        &self.suppressed
    }

    pub fn status(&self) -> CompositionStatus {
        if self.failures.is_empty() {
            CompositionStatus::Composed
        } else {
            CompositionStatus::PartiallyFailed
        }
    }

    fn into_report(self) -> (Vec<ComposeFailure>, Vec<ResourceKey>) {
        (self.failures, self.suppressed)
    }
}

/// Outcome of inlining a single reference.
#[derive(Debug)]
pub enum Inline {
    Content(String),
    /// Already emitted earlier in this pass.
    Suppressed,
    /// Rendered as an inline marker.
    Failed(PersonaError),
}

/// Text shown in place of a reference that failed to resolve.
pub fn inline_marker(error: &PersonaError) -> String {
    format!("[unresolved: {error}]")
}

pub struct SemanticComposer {
    resources: Arc<ResourceManager>,
    config: ComposeConfig,
}

impl SemanticComposer {
    pub fn new(resources: Arc<ResourceManager>) -> Self {
        Self {
            resources,
            config: ComposeConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ComposeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn resources(&self) -> &Arc<ResourceManager> {
        &self.resources
    }

    /// Compose a block's text with its references inlined in source order.
    pub async fn compose_block(
        &self,
        block: &Block,
        pass: &mut CompositionPass,
    ) -> PersonaResult<String> {
        self.compose_text(&block.text, &block.references, pass, 0).await
    }

    /// Resolve one reference, recursing into its content. Token-level
    /// failures come back as [`Inline::Failed`]; anything else is an error.
    pub async fn compose_reference(
        &self,
        reference: &ResourceRef,
        pass: &mut CompositionPass,
        depth: usize,
    ) -> PersonaResult<Inline> {
        let key = reference.key();
        if !pass.visit(key.clone()) {
            debug!(%key, "duplicate reference suppressed");
            pass.suppressed.push(key);
            return Ok(Inline::Suppressed);
        }

        match self.fetch(reference, pass, depth).await {
            Ok(content) => Ok(Inline::Content(content)),
            Err(error) if !error.is_token_level() => Err(error),
            Err(error) => {
                let error = match error {
                    wrapped @ PersonaError::Compose { .. } => wrapped,
                    other => PersonaError::compose(reference.to_string(), other),
                };
                warn!(%reference, "reference left unresolved: {error}");
                pass.failures.push(ComposeFailure {
                    reference: reference.to_string(),
                    error: error.to_string(),
                });
                Ok(Inline::Failed(error))
            }
        }
    }

    async fn fetch(
        &self,
        reference: &ResourceRef,
        pass: &mut CompositionPass,
        depth: usize,
    ) -> PersonaResult<String> {
        if depth >= self.config.max_depth {
            return Err(PersonaError::DepthExceeded {
                limit: self.config.max_depth,
            });
        }
        let resolved = self.resources.load(reference).await?;
        // A malformed nested document only spoils its own token.
        let document = parse_document(&resolved.content)
            .map_err(|e| PersonaError::compose(reference.to_string(), e))?;
        let nested = document.references();
        if nested.is_empty() {
            return Ok(resolved.content);
        }
        self.compose_text(&resolved.content, &nested, pass, depth + 1)
            .await
    }

    fn compose_text<'a>(
        &'a self,
        text: &'a str,
        references: &'a [ReferenceToken],
        pass: &'a mut CompositionPass,
        depth: usize,
    ) -> Pin<Box<dyn Future<Output = PersonaResult<String>> + Send + 'a>> {
        Box::pin(async move {
            let mut out = String::with_capacity(text.len());
            let mut cursor = 0;
            for token in references {
                if token.span.start < cursor {
                    continue;
                }
                out.push_str(&text[cursor..token.span.start]);
                cursor = token.span.end;

                if !token.loading().inlines() {
                    out.push_str(&text[token.span.clone()]);
                    continue;
                }
                match self.compose_reference(&token.target, pass, depth).await? {
                    Inline::Content(content) => out.push_str(content.trim()),
                    Inline::Suppressed => {}
                    Inline::Failed(error) => out.push_str(&inline_marker(&error)),
                }
            }
            out.push_str(&text[cursor..]);
            Ok(out)
        })
    }
}
