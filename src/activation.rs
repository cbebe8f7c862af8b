//! Role activation: lookup, parse, compose, prime.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::cognition::ConceptGraphBuilder;
use crate::compose::{ComposedRole, RoleInfo, SemanticComposer};
use crate::config::EngineConfig;
use crate::dpml::{parse_document, ResourceRef};
use crate::error::{PersonaError, PersonaResult};
use crate::resource::ResourceManager;

/// Everything produced for one activated role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activation {
    pub role: ComposedRole,
    /// Mermaid mindmap of the role's concepts. `None` when the graph could not be built.
    pub prime: Option<String>,
    /// Mermaid flowchart of execution steps. Empty when there is none.
    pub procedural: String,
    pub prime_error: Option<String>,
}

impl Activation {
    /// Composed text followed by the fenced diagrams.
    pub fn to_markdown(&self) -> String {
        let mut out = self.role.composed_text.clone();
        if let Some(prime) = &self.prime {
            out.push_str("\n## Concept map\n\n```mermaid\n");
            out.push_str(prime);
            out.push_str("```\n");
        }
        if let Some(error) = &self.prime_error {
            out.push_str(&format!("\n[concept map unavailable: {error}]\n"));
        }
        if !self.procedural.is_empty() {
            out.push_str("\n## Procedures\n\n```mermaid\n");
            out.push_str(&self.procedural);
            out.push_str("```\n");
        }
        out
    }
}

pub struct RoleActivator {
    composer: SemanticComposer,
    concepts: ConceptGraphBuilder,
}

impl RoleActivator {
    pub fn new(resources: Arc<ResourceManager>) -> Self {
        Self {
            composer: SemanticComposer::new(resources),
            concepts: ConceptGraphBuilder::default(),
        }
    }

    pub fn with_config(resources: Arc<ResourceManager>, config: &EngineConfig) -> Self {
        Self {
            composer: SemanticComposer::new(resources).with_config(config.compose.clone()),
            concepts: ConceptGraphBuilder::new(config.concepts.clone()),
        }
    }

    #[cfg(feature = "native")]
    pub fn from_config(config: &EngineConfig) -> PersonaResult<Self> {
        let resources = Arc::new(ResourceManager::from_config(config)?);
        Ok(Self::with_config(resources, config))
    }

    pub fn resources(&self) -> &Arc<ResourceManager> {
        self.composer.resources()
    }

    pub fn composer(&self) -> &SemanticComposer {
        &self.composer
    }

    /// Look up, parse and compose a role. Token-level failures are inline;
    /// a missing role, a parse error or a failed bootstrap is returned.
    pub async fn compose(&self, role_id: &str) -> PersonaResult<ComposedRole> {
        let resources = self.resources();
        resources.initialize().await?;
        let descriptor = resources
            .registry()
            .find("role", role_id)
            .ok_or_else(|| PersonaError::not_found("role", role_id))?;

        let resolved = resources.load(&ResourceRef::new("role", role_id)).await?;
        let document = parse_document(&resolved.content)?;
        self.composer
            .compose_role(&RoleInfo::from(&descriptor), &document)
            .await
    }

    pub async fn activate(&self, role_id: &str) -> PersonaResult<Activation> {
        let role = self.compose(role_id).await?;

        let (prime, prime_error) = match self.concepts.build_graph(&role) {
            Ok(graph) => (Some(self.concepts.serialize(&graph)), None),
            Err(e) => {
                warn!(role = %role_id, "concept graph unavailable: {e}");
                (None, Some(e.to_string()))
            }
        };
        let procedural = self.concepts.derive_procedural_patterns(&role);

        info!(
            role = %role_id,
            status = ?role.status,
            primed = prime.is_some(),
            "role activated"
        );
        Ok(Activation {
            role,
            prime,
            procedural,
            prime_error,
        })
    }
}
