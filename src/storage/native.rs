//! On-disk store using `tokio::fs`.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::error::PersonaResult;

use super::{ResourceStore, StoreEntry};

/// Directory on the native filesystem. All paths resolve below `root`.
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

#[async_trait]
impl ResourceStore for DirStore {
    fn root(&self) -> String {
        self.root.to_string_lossy().to_string()
    }

    async fn read_to_string(&self, path: &str) -> PersonaResult<String> {
        let content = tokio::fs::read_to_string(self.resolve(path)).await?;
        Ok(content)
    }

    async fn exists(&self, path: &str) -> PersonaResult<bool> {
        Ok(tokio::fs::try_exists(self.resolve(path)).await?)
    }

    async fn read_dir(&self, path: &str) -> PersonaResult<Vec<StoreEntry>> {
        let mut entries = Vec::new();
        let mut reader = tokio::fs::read_dir(self.resolve(path)).await?;
        while let Some(entry) = reader.next_entry().await? {
            let file_type = entry.file_type().await?;
            entries.push(StoreEntry {
                name: entry.file_name().to_string_lossy().to_string(),
                is_dir: file_type.is_dir(),
            });
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}
