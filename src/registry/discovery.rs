//! Discovery sources feeding the registry bootstrap.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

use super::ResourceDescriptor;
use crate::error::{PersonaError, PersonaResult};
use crate::storage::{walk_files, ResourceStore};

/// Something that can enumerate resources during registry bootstrap.
#[async_trait]
pub trait RegistrySource: Send + Sync {
    fn name(&self) -> &str;

    async fn discover(&self) -> PersonaResult<Vec<ResourceDescriptor>>;
}

/// A fixed list of descriptors.
pub struct StaticSource {
    name: String,
    resources: Vec<ResourceDescriptor>,
}

impl StaticSource {
    pub fn new(name: impl Into<String>, resources: Vec<ResourceDescriptor>) -> Self {
        Self {
            name: name.into(),
            resources,
        }
    }
}

#[async_trait]
impl RegistrySource for StaticSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn discover(&self) -> PersonaResult<Vec<ResourceDescriptor>> {
        Ok(self.resources.clone())
    }
}

#[derive(Deserialize)]
struct Manifest {
    #[serde(default)]
    resources: Vec<ResourceDescriptor>,
}

/// A JSON manifest (`{"resources": [...]}`) stored next to the resources.
///
/// A missing manifest contributes nothing; a malformed one fails the bootstrap.
/// Entries whose reference is a bare path are bound to `location_protocol`
/// when one is set.
pub struct ManifestSource {
    name: String,
    store: Arc<dyn ResourceStore>,
    path: String,
    location_protocol: Option<String>,
}

impl ManifestSource {
    pub fn new(
        name: impl Into<String>,
        store: Arc<dyn ResourceStore>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            path: path.into(),
            location_protocol: None,
        }
    }

    pub fn with_location_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.location_protocol = Some(protocol.into());
        self
    }
}

#[async_trait]
impl RegistrySource for ManifestSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn discover(&self) -> PersonaResult<Vec<ResourceDescriptor>> {
        if !self.store.exists(&self.path).await? {
            return Ok(Vec::new());
        }
        let raw = self.store.read_to_string(&self.path).await?;
        let manifest: Manifest = serde_json::from_str(&raw).map_err(|e| {
            PersonaError::Initialization(format!(
                "invalid manifest {}: {e}",
                self.store.locate(&self.path)
            ))
        })?;

        let Some(location) = &self.location_protocol else {
            return Ok(manifest.resources);
        };
        Ok(manifest
            .resources
            .into_iter()
            .map(|mut descriptor| {
                let bare = descriptor.reference.trim();
                if !bare.is_empty() && !bare.contains("://") {
                    descriptor.reference = format!("@{location}://{bare}");
                }
                descriptor
            })
            .collect())
    }
}

/// Walks a resource directory for files named `<id>.<kind>.md` and registers
/// each under protocol `<kind>`, referenced through `location_protocol`.
///
/// ```text
/// resource/role/dev/dev.role.md             → role://dev
/// resource/role/dev/thought/plan.thought.md → thought://plan
/// ```
pub struct DirectoryScanner {
    location_protocol: String,
    store: Arc<dyn ResourceStore>,
    dir: String,
}

impl DirectoryScanner {
    pub fn new(
        location_protocol: impl Into<String>,
        store: Arc<dyn ResourceStore>,
        dir: impl Into<String>,
    ) -> Self {
        Self {
            location_protocol: location_protocol.into(),
            store,
            dir: dir.into(),
        }
    }

    async fn describe(&self, path: &str, id: &str, kind: &str) -> ResourceDescriptor {
        let mut descriptor = ResourceDescriptor::new(
            kind,
            id,
            format!("@{}://{path}", self.location_protocol),
        );
        match self.store.read_to_string(path).await {
            Ok(content) => {
                let (name, description) = summarize(&content);
                if let Some(name) = name {
                    descriptor.name = name;
                }
                descriptor.description = description.unwrap_or_default();
            }
            Err(e) => warn!(path, "could not read resource for metadata: {e}"),
        }
        descriptor
    }
}

#[async_trait]
impl RegistrySource for DirectoryScanner {
    fn name(&self) -> &str {
        &self.location_protocol
    }

    async fn discover(&self) -> PersonaResult<Vec<ResourceDescriptor>> {
        if !self.store.exists(&self.dir).await? {
            return Ok(Vec::new());
        }
        let mut found = Vec::new();
        for path in walk_files(self.store.as_ref(), &self.dir).await? {
            let file = path.rsplit('/').next().unwrap_or(&path);
            if let Some((id, kind)) = split_resource_name(file) {
                found.push(self.describe(&path, id, kind).await);
            }
        }
        Ok(found)
    }
}

/// `analysis.thought.md` → `("analysis", "thought")`.
fn split_resource_name(file: &str) -> Option<(&str, &str)> {
    let stem = file.strip_suffix(".md")?;
    let (id, kind) = stem.rsplit_once('.')?;
    let valid_kind = !kind.is_empty() && kind.chars().all(|c| c.is_ascii_alphabetic());
    (valid_kind && !id.is_empty()).then_some((id, kind))
}

/// First markdown heading as the name, first prose line as the description.
fn summarize(content: &str) -> (Option<String>, Option<String>) {
    let mut name = None;
    let mut description = None;
    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('<') || line.starts_with('@') {
            continue;
        }
        if let Some(heading) = line.strip_prefix('#') {
            if name.is_none() {
                name = Some(heading.trim_start_matches('#').trim().to_string());
            }
            continue;
        }
        if description.is_none() {
            description = Some(line.chars().take(120).collect());
        }
        if name.is_some() && description.is_some() {
            break;
        }
    }
    (name, description)
}
