//! Location protocols backed by a single store.

use std::sync::Arc;

use async_trait::async_trait;

use super::{Location, ProtocolResolver, ProtocolTable};
use crate::error::{PersonaError, PersonaResult};
use crate::storage::{normalize_path, ResourceStore};

/// A protocol rooted in one store: `package`, `project`, `user`.
pub struct DirectoryProtocol {
    name: String,
    store: Arc<dyn ResourceStore>,
}

impl DirectoryProtocol {
    pub fn new(name: impl Into<String>, store: Arc<dyn ResourceStore>) -> Self {
        Self {
            name: name.into(),
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn ResourceStore> {
        &self.store
    }
}

#[async_trait]
impl ProtocolResolver for DirectoryProtocol {
    fn name(&self) -> &str {
        &self.name
    }

    async fn resolve(&self, path: &str, _table: &ProtocolTable) -> PersonaResult<Location> {
        let normalized = normalize_path(path)?;
        if normalized.is_empty() || !self.store.exists(&normalized).await? {
            return Err(PersonaError::not_found(&self.name, path));
        }
        Ok(Location::new(&self.name, normalized, self.store.clone()))
    }
}
