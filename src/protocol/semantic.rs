//! Registry-backed protocols: an id is looked up, then its reference is followed.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Location, ProtocolResolver, ProtocolTable};
use crate::dpml::ResourceRef;
use crate::error::{PersonaError, PersonaResult};
use crate::registry::ResourceRegistry;

/// Protocols whose ids are looked up in the registry.
pub const SEMANTIC_PROTOCOLS: [&str; 7] = [
    "role",
    "thought",
    "execution",
    "personality",
    "principle",
    "knowledge",
    "memory",
];

/// Location used for descriptor references given as a bare path.
pub const DEFAULT_LOCATION: &str = "package";

/// Resolves `thought://analysis` by finding the `thought` descriptor with id
/// `analysis` and following its reference to a storage location.
///
/// A reference without `://` (for example `thought/plain.md`) is a path
/// under the default location protocol.
pub struct RegistryProtocol {
    name: String,
    registry: Arc<ResourceRegistry>,
    default_location: String,
}

impl RegistryProtocol {
    pub fn new(name: impl Into<String>, registry: Arc<ResourceRegistry>) -> Self {
        Self {
            name: name.into(),
            registry,
            default_location: DEFAULT_LOCATION.to_string(),
        }
    }

    pub fn with_default_location(mut self, protocol: impl Into<String>) -> Self {
        self.default_location = protocol.into();
        self
    }

    fn target(&self, reference: &str) -> PersonaResult<ResourceRef> {
        let reference = reference.trim();
        if reference.contains("://") {
            return ResourceRef::parse(reference);
        }
        let path = reference.trim_start_matches(['@', '!', '?']);
        if path.is_empty() {
            return Err(PersonaError::InvalidReference(format!(
                "{}://{}: empty reference",
                self.name, reference
            )));
        }
        Ok(ResourceRef::new(&self.default_location, path))
    }
}

#[async_trait]
impl ProtocolResolver for RegistryProtocol {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_location(&self) -> bool {
        false
    }

    async fn resolve(&self, path: &str, table: &ProtocolTable) -> PersonaResult<Location> {
        self.registry.initialize().await?;
        let descriptor = self
            .registry
            .find(&self.name, path)
            .ok_or_else(|| PersonaError::not_found(&self.name, path))?;
        let target = self.target(&descriptor.reference)?;
        table.resolve_location(&target).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DirectoryProtocol;
    use crate::registry::{ResourceDescriptor, StaticSource};
    use crate::storage::{MemoryStore, ResourceStore};

    fn setup(reference: &str) -> ProtocolTable {
        let store: Arc<dyn ResourceStore> = Arc::new(
            MemoryStore::new()
                .with_file("thought/analysis.thought.md", "think")
                .with_file("thought/plain.md", "PLAIN CONTENT"),
        );
        let registry = Arc::new(ResourceRegistry::new().with_source(Arc::new(StaticSource::new(
            "static",
            vec![ResourceDescriptor::new("thought", "analysis", reference)],
        ))));
        let table = ProtocolTable::new();
        table.register(Arc::new(DirectoryProtocol::new("package", store)));
        table.register(Arc::new(RegistryProtocol::new("thought", registry.clone())));
        table.register(Arc::new(RegistryProtocol::new("execution", registry)));
        table
    }

    #[tokio::test]
    async fn follows_descriptor_reference() {
        let table = setup("@package://thought/analysis.thought.md");
        let location = table
            .resolve(&ResourceRef::new("thought", "analysis"))
            .await
            .unwrap();
        assert_eq!(location.protocol, "package");
        assert_eq!(location.read().await.unwrap(), "think");
    }

    #[tokio::test]
    async fn unknown_id_is_resource_not_found() {
        let table = setup("@package://thought/analysis.thought.md");
        let err = table
            .resolve(&ResourceRef::new("thought", "nope"))
            .await
            .unwrap_err();
        assert!(matches!(err, PersonaError::ResourceNotFound { .. }));
    }

    #[tokio::test]
    async fn refuses_registry_to_registry_hops() {
        let table = setup("@execution://analysis");
        let err = table
            .resolve(&ResourceRef::new("thought", "analysis"))
            .await
            .unwrap_err();
        assert!(matches!(err, PersonaError::InvalidReference(_)));
    }

    #[tokio::test]
    async fn bare_path_uses_default_location() {
        let table = setup("thought/plain.md");
        let location = table
            .resolve(&ResourceRef::new("thought", "analysis"))
            .await
            .unwrap();
        assert_eq!(location.protocol, "package");
        assert_eq!(location.read().await.unwrap(), "PLAIN CONTENT");
    }

    #[tokio::test]
    async fn bare_path_honours_configured_location() {
        let store: Arc<dyn ResourceStore> =
            Arc::new(MemoryStore::new().with_file("notes/plain.md", "PROJECT NOTES"));
        let registry = Arc::new(ResourceRegistry::new().with_source(Arc::new(StaticSource::new(
            "static",
            vec![ResourceDescriptor::new("knowledge", "notes", "notes/plain.md")],
        ))));
        let table = ProtocolTable::new();
        table.register(Arc::new(DirectoryProtocol::new("project", store)));
        table.register(Arc::new(
            RegistryProtocol::new("knowledge", registry).with_default_location("project"),
        ));

        let location = table
            .resolve(&ResourceRef::new("knowledge", "notes"))
            .await
            .unwrap();
        assert_eq!(location.read().await.unwrap(), "PROJECT NOTES");
    }

    #[tokio::test]
    async fn empty_reference_is_invalid() {
        let table = setup("  ");
        let err = table
            .resolve(&ResourceRef::new("thought", "analysis"))
            .await
            .unwrap_err();
        assert!(matches!(err, PersonaError::InvalidReference(_)));
    }
}
