//! Engine configuration: resource roots, composition and concept limits.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{PersonaError, PersonaResult};

fn default_resource_dir() -> String {
    "resource".to_string()
}

fn default_manifest() -> String {
    "registry.json".to_string()
}

fn default_max_depth() -> usize {
    8
}

fn default_max_nodes() -> usize {
    200
}

fn default_max_label_chars() -> usize {
    48
}

/// Engine wiring: where the three location protocols live on disk and how
/// composition and priming are bounded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub package_root: Option<PathBuf>,
    #[serde(default)]
    pub project_root: Option<PathBuf>,
    #[serde(default)]
    pub user_root: Option<PathBuf>,
    /// Directory scanned for `<id>.<kind>.md` files inside each root.
    #[serde(default = "default_resource_dir")]
    pub resource_dir: String,
    /// Optional JSON manifest file inside each root.
    #[serde(default = "default_manifest")]
    pub manifest: String,
    #[serde(default)]
    pub compose: ComposeConfig,
    #[serde(default)]
    pub concepts: ConceptConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            package_root: None,
            project_root: None,
            user_root: None,
            resource_dir: default_resource_dir(),
            manifest: default_manifest(),
            compose: ComposeConfig::default(),
            concepts: ConceptConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_yaml_str(raw: &str) -> PersonaResult<Self> {
        let config: Self = serde_yaml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(raw: &str) -> PersonaResult<Self> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PersonaResult<()> {
        if self.compose.max_depth == 0 {
            return Err(PersonaError::Config("compose.max_depth must be at least 1".into()));
        }
        if self.concepts.max_label_chars < 4 {
            return Err(PersonaError::Config(
                "concepts.max_label_chars must be at least 4".into(),
            ));
        }
        Ok(())
    }

    /// Configured location roots in precedence order (lowest first).
    pub fn roots(&self) -> Vec<(&'static str, &PathBuf)> {
        [
            ("package", self.package_root.as_ref()),
            ("project", self.project_root.as_ref()),
            ("user", self.user_root.as_ref()),
        ]
        .into_iter()
        .filter_map(|(name, root)| root.map(|r| (name, r)))
        .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposeConfig {
    /// Hard bound on reference nesting, backing the visited-set guard.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptConfig {
    #[serde(default = "default_max_nodes")]
    pub max_nodes: usize,
    /// Longer candidate labels are not concepts, they are sentences.
    #[serde(default = "default_max_label_chars")]
    pub max_label_chars: usize,
}

impl Default for ConceptConfig {
    fn default() -> Self {
        Self {
            max_nodes: default_max_nodes(),
            max_label_chars: default_max_label_chars(),
        }
    }
}
