//! Resource storage: where protocol resolvers actually read bytes from.
//!
//! A [`ResourceStore`] is a rooted, read-mostly tree of UTF-8 documents
//! addressed by logical forward-slash paths. [`DirStore`] (behind the
//! `native` feature, default) maps a directory on disk; [`MemoryStore`]
//! keeps everything in a map for tests and embedded use.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{PersonaError, PersonaResult};

/// A single directory entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Read access to a rooted document tree.
#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Human-readable root, used when rendering absolute locations.
    fn root(&self) -> String;

    /// Read a document as UTF-8.
    async fn read_to_string(&self, path: &str) -> PersonaResult<String>;

    /// Whether a file or directory exists at `path`.
    async fn exists(&self, path: &str) -> PersonaResult<bool>;

    /// Direct children of a directory, sorted by name.
    async fn read_dir(&self, path: &str) -> PersonaResult<Vec<StoreEntry>>;

    /// Absolute location of `path` inside this store.
    fn locate(&self, path: &str) -> String {
        let root = self.root();
        let path = path.trim_start_matches('/');
        if root.is_empty() {
            path.to_string()
        } else {
            format!("{}/{path}", root.trim_end_matches('/'))
        }
    }
}

/// Normalize a store-relative path.
///
/// Rejects absolute paths and any `..` segment so that a reference can never
/// climb out of its store root.
pub fn normalize_path(path: &str) -> PersonaResult<String> {
    if path.starts_with('/') || path.starts_with('\\') || path.contains(':') {
        return Err(PersonaError::InvalidReference(format!(
            "path must be relative: {path}"
        )));
    }
    let mut parts = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => continue,
            ".." => {
                return Err(PersonaError::InvalidReference(format!(
                    "path escapes its root: {path}"
                )))
            }
            s => parts.push(s),
        }
    }
    Ok(parts.join("/"))
}

/// Recursively collect every file path below `dir`, depth first, sorted.
pub async fn walk_files(store: &dyn ResourceStore, dir: &str) -> PersonaResult<Vec<String>> {
    let mut files = Vec::new();
    let mut stack = vec![dir.trim_matches('/').to_string()];
    while let Some(current) = stack.pop() {
        let entries = store.read_dir(&current).await?;
        let mut subdirs = Vec::new();
        for entry in entries {
            let path = if current.is_empty() || current == "." {
                entry.name.clone()
            } else {
                format!("{current}/{}", entry.name)
            };
            if entry.is_dir {
                subdirs.push(path);
            } else {
                files.push(path);
            }
        }
        // reversed so the lexicographically first directory is visited first
        stack.extend(subdirs.into_iter().rev());
    }
    files.sort();
    Ok(files)
}

mod memory;
pub use memory::MemoryStore;

#[cfg(feature = "native")]
mod native;
#[cfg(feature = "native")]
pub use native::DirStore;
