//! Generic resolve entrypoint: `(@[!?]?)protocol://resourceId` → content.

use std::sync::Arc;

use tracing::debug;

use crate::dpml::ResourceRef;
use crate::error::{PersonaError, PersonaResult};
use crate::protocol::{
    Location, ProtocolResolver, ProtocolTable, RegistryProtocol, SEMANTIC_PROTOCOLS,
};
use crate::registry::ResourceRegistry;

/// Content fetched for one reference.
#[derive(Debug, Clone)]
pub struct ResolvedResource {
    pub reference: ResourceRef,
    pub location: Location,
    pub content: String,
}

/// Owns the protocol table and shares the process-wide registry.
pub struct ResourceManager {
    registry: Arc<ResourceRegistry>,
    protocols: ProtocolTable,
}

impl ResourceManager {
    /// A manager with every semantic protocol bound to `registry`. Location
    /// protocols are added with [`with_protocol`](Self::with_protocol).
    pub fn new(registry: Arc<ResourceRegistry>) -> Self {
        let protocols = ProtocolTable::new();
        for name in SEMANTIC_PROTOCOLS {
            protocols.register(Arc::new(RegistryProtocol::new(name, registry.clone())));
        }
        Self {
            registry,
            protocols,
        }
    }

    pub fn with_protocol(self, resolver: Arc<dyn ProtocolResolver>) -> Self {
        self.protocols.register(resolver);
        self
    }

    pub fn register_protocol(&self, resolver: Arc<dyn ProtocolResolver>) {
        self.protocols.register(resolver);
    }

    pub fn registry(&self) -> &Arc<ResourceRegistry> {
        &self.registry
    }

    pub fn protocols(&self) -> &ProtocolTable {
        &self.protocols
    }

    pub async fn initialize(&self) -> PersonaResult<()> {
        self.registry.initialize().await
    }

    /// Parse `url` and load its content.
    pub async fn resolve(&self, url: &str) -> PersonaResult<ResolvedResource> {
        let reference = ResourceRef::parse(url)?;
        self.load(&reference).await
    }

    pub async fn load(&self, reference: &ResourceRef) -> PersonaResult<ResolvedResource> {
        self.registry.initialize().await?;
        let location = self.protocols.resolve(reference).await?;
        let content = location.read().await.map_err(|e| match e {
            PersonaError::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                PersonaError::not_found(&reference.protocol, &reference.resource)
            }
            other => other,
        })?;
        debug!(
            %reference,
            location = %location.absolute(),
            bytes = content.len(),
            "resource loaded"
        );
        Ok(ResolvedResource {
            reference: reference.clone(),
            location,
            content,
        })
    }

    /// Wire native stores, scanners and manifests for every configured root.
    #[cfg(feature = "native")]
    pub fn from_config(config: &crate::config::EngineConfig) -> PersonaResult<Self> {
        use crate::protocol::DirectoryProtocol;
        use crate::registry::{DirectoryScanner, ManifestSource};
        use crate::storage::{DirStore, ResourceStore};

        config.validate()?;
        let mut registry = ResourceRegistry::new();
        let mut locations = Vec::new();
        for (name, root) in config.roots() {
            let store: Arc<dyn ResourceStore> = Arc::new(DirStore::new(root));
            registry.add_source(Arc::new(DirectoryScanner::new(
                name,
                store.clone(),
                &config.resource_dir,
            )));
            registry.add_source(Arc::new(
                ManifestSource::new(format!("{name}-manifest"), store.clone(), &config.manifest)
                    .with_location_protocol(name),
            ));
            locations.push(DirectoryProtocol::new(name, store));
        }

        let manager = Self::new(Arc::new(registry));
        for location in locations {
            manager.register_protocol(Arc::new(location));
        }
        Ok(manager)
    }
}
