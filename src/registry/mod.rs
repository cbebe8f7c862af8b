//! Process-wide index of known resources, grouped by protocol.
//!
//! The registry is bootstrapped lazily from its [`RegistrySource`]s exactly
//! once. Concurrent first calls to [`ResourceRegistry::initialize`] share one
//! bootstrap (single-flight) and all observe the same `Ready` index; calls
//! after success are no-ops. A failed or abandoned bootstrap leaves the
//! registry `Uninitialized` so the next caller can retry.

mod discovery;

pub use discovery::{DirectoryScanner, ManifestSource, RegistrySource, StaticSource};

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::{PersonaError, PersonaResult};

/// A known resource. `reference` is usually itself a location URL such as
/// `@package://resource/thought/analysis.thought.md`, or a bare path read
/// from the default location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDescriptor {
    pub id: String,
    pub protocol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub reference: String,
    /// Which discovery source contributed this entry.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
}

impl ResourceDescriptor {
    pub fn new(
        protocol: impl Into<String>,
        id: impl Into<String>,
        reference: impl Into<String>,
    ) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            protocol: protocol.into(),
            description: String::new(),
            reference: reference.into(),
            source: String::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Bootstrap state machine: `Uninitialized → Initializing → Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegistryState {
    Uninitialized,
    Initializing,
    Ready,
}

const UNINITIALIZED: u8 = 0;
const INITIALIZING: u8 = 1;
const READY: u8 = 2;

#[derive(Debug)]
struct RegistryIndex {
    by_protocol: HashMap<String, Vec<ResourceDescriptor>>,
    loaded_at: DateTime<Utc>,
}

impl Default for RegistryIndex {
    fn default() -> Self {
        Self {
            by_protocol: HashMap::new(),
            loaded_at: Utc::now(),
        }
    }
}

impl RegistryIndex {
    /// Later entries replace earlier ones with the same id, keeping the
    /// original position.
    fn insert(&mut self, descriptor: ResourceDescriptor) {
        let entries = self
            .by_protocol
            .entry(descriptor.protocol.clone())
            .or_default();
        match entries.iter_mut().find(|d| d.id == descriptor.id) {
            Some(existing) => {
                debug!(
                    protocol = %descriptor.protocol,
                    id = %descriptor.id,
                    from = %existing.source,
                    to = %descriptor.source,
                    "resource overridden"
                );
                *existing = descriptor;
            }
            None => entries.push(descriptor),
        }
    }

    fn len(&self) -> usize {
        self.by_protocol.values().map(Vec::len).sum()
    }
}

/// Resets the state to `Uninitialized` unless the bootstrap completed, so an
/// abandoned or failed bootstrap never leaves the registry stuck.
struct BootstrapGuard<'a> {
    state: &'a AtomicU8,
    done: bool,
}

impl Drop for BootstrapGuard<'_> {
    fn drop(&mut self) {
        if !self.done {
            self.state.store(UNINITIALIZED, Ordering::SeqCst);
        }
    }
}

pub struct ResourceRegistry {
    sources: Vec<Arc<dyn RegistrySource>>,
    index: OnceCell<RegistryIndex>,
    state: AtomicU8,
}

impl ResourceRegistry {
    pub fn new() -> Self {
        Self {
            sources: Vec::new(),
            index: OnceCell::new(),
            state: AtomicU8::new(UNINITIALIZED),
        }
    }

    /// Add a discovery source. Sources added later take precedence on id clashes.
    pub fn with_source(mut self, source: Arc<dyn RegistrySource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn add_source(&mut self, source: Arc<dyn RegistrySource>) {
        self.sources.push(source);
    }

    pub fn state(&self) -> RegistryState {
        if self.index.initialized() {
            return RegistryState::Ready;
        }
        match self.state.load(Ordering::SeqCst) {
            READY => RegistryState::Ready,
            INITIALIZING => RegistryState::Initializing,
            _ => RegistryState::Uninitialized,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state() == RegistryState::Ready
    }

    /// Load every source once. Idempotent and safe to call concurrently.
    pub async fn initialize(&self) -> PersonaResult<()> {
        self.index.get_or_try_init(|| self.bootstrap()).await?;
        self.state.store(READY, Ordering::SeqCst);
        Ok(())
    }

    async fn bootstrap(&self) -> PersonaResult<RegistryIndex> {
        self.state.store(INITIALIZING, Ordering::SeqCst);
        let mut guard = BootstrapGuard {
            state: &self.state,
            done: false,
        };

        let mut index = RegistryIndex::default();
        for source in &self.sources {
            let found = source.discover().await.map_err(|e| match e {
                PersonaError::Initialization(_) => e,
                other => PersonaError::Initialization(format!(
                    "source {:?} failed: {other}",
                    source.name()
                )),
            })?;
            debug!(source = source.name(), count = found.len(), "resources discovered");
            for mut descriptor in found {
                if descriptor.source.is_empty() {
                    descriptor.source = source.name().to_string();
                }
                index.insert(descriptor);
            }
        }

        info!(
            sources = self.sources.len(),
            protocols = index.by_protocol.len(),
            resources = index.len(),
            "resource registry ready"
        );
        index.loaded_at = Utc::now();
        guard.done = true;
        Ok(index)
    }

    /// Resources registered under `protocol`, in discovery order.
    /// Empty until the registry is initialized.
    pub fn resources_by_protocol(&self, protocol: &str) -> Vec<ResourceDescriptor> {
        self.index
            .get()
            .and_then(|idx| idx.by_protocol.get(protocol))
            .cloned()
            .unwrap_or_default()
    }

    pub fn find(&self, protocol: &str, id: &str) -> Option<ResourceDescriptor> {
        self.index
            .get()?
            .by_protocol
            .get(protocol)?
            .iter()
            .find(|d| d.id == id)
            .cloned()
    }

    /// Whether any resource is registered under `protocol`.
    pub fn has_protocol(&self, protocol: &str) -> bool {
        self.index
            .get()
            .is_some_and(|idx| idx.by_protocol.contains_key(protocol))
    }

    pub fn protocols(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .index
            .get()
            .map(|idx| idx.by_protocol.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// When the bootstrap completed.
    pub fn ready_since(&self) -> Option<DateTime<Utc>> {
        self.index.get().map(|idx| idx.loaded_at)
    }

    pub fn len(&self) -> usize {
        self.index.get().map(RegistryIndex::len).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ResourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}
