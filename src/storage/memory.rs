//! In-memory store for tests and embedded resource packs.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{PersonaError, PersonaResult};

use super::{ResourceStore, StoreEntry};

/// Document tree backed by a `BTreeMap`. Directories are implied by file paths.
pub struct MemoryStore {
    root: String,
    files: RwLock<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_root("memory:/")
    }

    pub fn with_root(root: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            files: RwLock::new(BTreeMap::new()),
        }
    }

    fn normalize(path: &str) -> String {
        path.trim_matches('/').to_string()
    }

    /// Insert or replace a document.
    pub fn insert(&self, path: &str, contents: impl Into<String>) {
        let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
        files.insert(Self::normalize(path), contents.into());
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with_file(self, path: &str, contents: impl Into<String>) -> Self {
        self.insert(path, contents);
        self
    }

    pub fn len(&self) -> usize {
        self.files.read().map(|f| f.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn not_found(path: &str) -> PersonaError {
        PersonaError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("not found: {path}"),
        ))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    fn root(&self) -> String {
        self.root.clone()
    }

    async fn read_to_string(&self, path: &str) -> PersonaResult<String> {
        let normalized = Self::normalize(path);
        let files = self.files.read().unwrap_or_else(|e| e.into_inner());
        files
            .get(&normalized)
            .cloned()
            .ok_or_else(|| Self::not_found(&normalized))
    }

    async fn exists(&self, path: &str) -> PersonaResult<bool> {
        let normalized = Self::normalize(path);
        if normalized.is_empty() || normalized == "." {
            return Ok(true);
        }
        let prefix = format!("{normalized}/");
        let files = self.files.read().unwrap_or_else(|e| e.into_inner());
        Ok(files.contains_key(&normalized) || files.keys().any(|k| k.starts_with(&prefix)))
    }

    async fn read_dir(&self, path: &str) -> PersonaResult<Vec<StoreEntry>> {
        let normalized = Self::normalize(path);
        let prefix = if normalized.is_empty() || normalized == "." {
            String::new()
        } else {
            format!("{normalized}/")
        };

        let files = self.files.read().unwrap_or_else(|e| e.into_inner());
        let mut dirs = BTreeSet::new();
        let mut leaves = BTreeSet::new();
        for key in files.keys() {
            if let Some(rest) = key.strip_prefix(&prefix) {
                match rest.split_once('/') {
                    Some((dir, _)) => {
                        dirs.insert(dir.to_string());
                    }
                    None => {
                        leaves.insert(rest.to_string());
                    }
                }
            }
        }

        if !prefix.is_empty() && dirs.is_empty() && leaves.is_empty() {
            return Err(Self::not_found(&normalized));
        }

        let mut entries: Vec<StoreEntry> = dirs
            .into_iter()
            .map(|name| StoreEntry { name, is_dir: true })
            .chain(leaves.into_iter().map(|name| StoreEntry {
                name,
                is_dir: false,
            }))
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}
