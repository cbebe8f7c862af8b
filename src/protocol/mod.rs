//! Protocol resolvers and the table that dispatches to them.
//!
//! Every `@protocol://path` is resolved by looking `protocol` up in a
//! [`ProtocolTable`] and handing the path to that [`ProtocolResolver`].
//! Two families exist:
//!
//! | Resolver | Protocols | Resolves to |
//! |----------|-----------|-------------|
//! | [`DirectoryProtocol`] | `package`, `project`, `user` | a file inside its store |
//! | [`RegistryProtocol`] | `role`, `thought`, `execution`, `knowledge`, ... | registry entry → location protocol |

mod directory;
mod semantic;

pub use directory::DirectoryProtocol;
pub use semantic::{RegistryProtocol, DEFAULT_LOCATION, SEMANTIC_PROTOCOLS};

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;

use crate::dpml::ResourceRef;
use crate::error::{PersonaError, PersonaResult};
use crate::storage::ResourceStore;

/// An absolute, fetchable location produced by a resolver.
#[derive(Clone)]
pub struct Location {
    pub protocol: String,
    pub path: String,
    store: Arc<dyn ResourceStore>,
}

impl Location {
    pub fn new(
        protocol: impl Into<String>,
        path: impl Into<String>,
        store: Arc<dyn ResourceStore>,
    ) -> Self {
        Self {
            protocol: protocol.into(),
            path: path.into(),
            store,
        }
    }

    pub fn absolute(&self) -> String {
        self.store.locate(&self.path)
    }

    pub async fn read(&self) -> PersonaResult<String> {
        self.store.read_to_string(&self.path).await
    }
}

impl fmt::Debug for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Location")
            .field("protocol", &self.protocol)
            .field("path", &self.path)
            .field("absolute", &self.absolute())
            .finish()
    }
}

/// One addressing scheme.
#[async_trait]
pub trait ProtocolResolver: Send + Sync {
    /// Protocol name as written in references (`package`, `thought`, ...).
    fn name(&self) -> &str;

    /// Whether this resolver maps paths straight onto storage. Registry-backed
    /// resolvers may only delegate to location resolvers.
    fn is_location(&self) -> bool {
        true
    }

    /// Turn a protocol-relative path into an absolute location.
    async fn resolve(&self, path: &str, table: &ProtocolTable) -> PersonaResult<Location>;
}

/// Registration table: protocol name → resolver.
#[derive(Default)]
pub struct ProtocolTable {
    resolvers: DashMap<String, Arc<dyn ProtocolResolver>>,
}

impl ProtocolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the resolver for its protocol name.
    pub fn register(&self, resolver: Arc<dyn ProtocolResolver>) {
        self.resolvers.insert(resolver.name().to_string(), resolver);
    }

    pub fn get(&self, protocol: &str) -> PersonaResult<Arc<dyn ProtocolResolver>> {
        self.resolvers
            .get(protocol)
            .map(|r| r.value().clone())
            .ok_or_else(|| PersonaError::ProtocolNotFound {
                protocol: protocol.to_string(),
            })
    }

    pub fn contains(&self, protocol: &str) -> bool {
        self.resolvers.contains_key(protocol)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.resolvers.iter().map(|r| r.key().clone()).collect();
        names.sort();
        names
    }

    pub async fn resolve(&self, reference: &ResourceRef) -> PersonaResult<Location> {
        let resolver = self.get(&reference.protocol)?;
        resolver.resolve(&reference.resource, self).await
    }

    /// Like [`resolve`](Self::resolve) but only through a location resolver.
    pub async fn resolve_location(&self, reference: &ResourceRef) -> PersonaResult<Location> {
        let resolver = self.get(&reference.protocol)?;
        if !resolver.is_location() {
            return Err(PersonaError::InvalidReference(format!(
                "{reference} does not point at a storage location"
            )));
        }
        resolver.resolve(&reference.resource, self).await
    }
}
