//! Role composition: flat skill sets plus sections composed in place.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{
    inline_marker, ComposeFailure, CompositionPass, CompositionStatus, Inline, SemanticComposer,
};
use crate::dpml::{Block, Document, ResourceKey, ResourceRef, Tag};
use crate::error::PersonaResult;
use crate::registry::ResourceDescriptor;

/// Identity of the role being composed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleInfo {
    pub id: String,
    pub name: String,
    pub description: String,
}

impl RoleInfo {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            description: String::new(),
        }
    }
}

impl From<&ResourceDescriptor> for RoleInfo {
    fn from(descriptor: &ResourceDescriptor) -> Self {
        let name = if descriptor.name.is_empty() {
            descriptor.id.clone()
        } else {
            descriptor.name.clone()
        };
        Self {
            id: descriptor.id.clone(),
            name,
            description: descriptor.description.clone(),
        }
    }
}

/// A hoisted thought or execution, loaded standalone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadedSkill {
    pub key: ResourceKey,
    pub content: String,
}

/// Result of composing a role document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComposedRole {
    pub role_id: String,
    pub name: String,
    pub description: String,
    pub composed_text: String,
    /// Thought ids hoisted from reference-only blocks.
    pub thoughts: BTreeSet<String>,
    /// Execution ids hoisted from reference-only blocks.
    pub executions: BTreeSet<String>,
    pub knowledge: Vec<String>,
    /// Composed text of each block that carried prose.
    pub sections: BTreeMap<Tag, String>,
    pub skills: Vec<LoadedSkill>,
    pub failures: Vec<ComposeFailure>,
    pub suppressed: Vec<ResourceKey>,
    pub status: CompositionStatus,
}

impl ComposedRole {
    pub fn skill(&self, protocol: &str, id: &str) -> Option<&LoadedSkill> {
        self.skills
            .iter()
            .find(|s| s.key.protocol == protocol && s.key.id == id)
    }
}

/// What one role section contributes before anything is loaded.
struct SectionPlan {
    tag: Tag,
    /// A block with prose, composed in place.
    full: Option<Block>,
    /// References in a reference-only block that are neither thoughts nor executions.
    residual: Vec<ResourceRef>,
}

impl SemanticComposer {
    /// Compose a role's `personality`, `principle` and `knowledge` blocks.
    ///
    /// Blocks with prose are composed in place. Reference-only blocks have
    /// their thought and execution references hoisted into flat sets, which
    /// are loaded once each as standalone skills. Everything shares one
    /// visited set, seeded with the role itself, so no `(protocol, id)` is
    /// emitted twice. A registry that cannot bootstrap fails the call.
    pub async fn compose_role(
        &self,
        role: &RoleInfo,
        document: &Document,
    ) -> PersonaResult<ComposedRole> {
        self.resources.initialize().await?;
        let mut pass = CompositionPass::with_visited([ResourceKey::new("role", &role.id)]);
        let mut thoughts = BTreeSet::new();
        let mut executions = BTreeSet::new();
        let mut plans = Vec::new();

        for tag in Tag::ROLE_SECTIONS {
            let Some(block) = document.block(tag) else {
                continue;
            };
            if block.full_semantics {
                plans.push(SectionPlan {
                    tag,
                    full: Some(block.clone()),
                    residual: Vec::new(),
                });
                continue;
            }
            let mut residual = Vec::new();
            for token in &block.references {
                if !token.loading().inlines() {
                    continue;
                }
                match token.protocol() {
                    "thought" => {
                        thoughts.insert(token.resource().to_string());
                    }
                    "execution" => {
                        executions.insert(token.resource().to_string());
                    }
                    _ => residual.push(token.target.clone()),
                }
            }
            plans.push(SectionPlan {
                tag,
                full: None,
                residual,
            });
        }

        let mut out = String::new();
        out.push_str(&format!("# Role: {}", role.name));
        if role.name != role.id {
            out.push_str(&format!(" ({})", role.id));
        }
        out.push('\n');
        if !role.description.is_empty() {
            out.push('\n');
            out.push_str(&role.description);
            out.push('\n');
        }

        let mut skills = Vec::new();
        let mut sections = BTreeMap::new();

        self.render_skills("thought", "Thinking", &thoughts, &mut pass, &mut skills, &mut out)
            .await?;
        if let Some(plan) = plans.iter().find(|p| p.tag == Tag::Personality) {
            self.render_section(plan, &mut pass, &mut sections, &mut out).await?;
        }
        self.render_skills(
            "execution",
            "Execution",
            &executions,
            &mut pass,
            &mut skills,
            &mut out,
        )
        .await?;
        for plan in plans.iter().filter(|p| p.tag != Tag::Personality) {
            self.render_section(plan, &mut pass, &mut sections, &mut out).await?;
        }

        let status = pass.status();
        out.push_str("\n---\n");
        out.push_str(&format!(
            "Thoughts: {} | Executions: {} | Sections: {} | Status: {}\n",
            join_or_none(thoughts.iter().map(String::as_str)),
            join_or_none(executions.iter().map(String::as_str)),
            join_or_none(sections.keys().map(|t: &Tag| t.as_str())),
            match status {
                CompositionStatus::Composed => "composed",
                CompositionStatus::PartiallyFailed => "partially failed",
            }
        ));

        let (failures, suppressed) = pass.into_report();
        info!(
            role = %role.id,
            thoughts = thoughts.len(),
            executions = executions.len(),
            failures = failures.len(),
            "role composed"
        );

        Ok(ComposedRole {
            role_id: role.id.clone(),
            name: role.name.clone(),
            description: role.description.clone(),
            composed_text: out,
            thoughts,
            executions,
            knowledge: vec![role.id.clone()],
            sections,
            skills,
            failures,
            suppressed,
            status,
        })
    }

    async fn render_skills(
        &self,
        protocol: &str,
        heading: &str,
        ids: &BTreeSet<String>,
        pass: &mut CompositionPass,
        skills: &mut Vec<LoadedSkill>,
        out: &mut String,
    ) -> PersonaResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        out.push_str(&format!("\n## {heading}\n"));
        for id in ids {
            let reference = ResourceRef::new(protocol, id);
            match self.compose_reference(&reference, pass, 0).await? {
                Inline::Content(content) => {
                    let content = content.trim().to_string();
                    out.push_str(&format!("\n### {}\n\n{content}\n", reference.key()));
                    skills.push(LoadedSkill {
                        key: reference.key(),
                        content,
                    });
                }
                Inline::Suppressed => {
                    debug!(skill = %reference.key(), "skill already inlined elsewhere");
                }
                Inline::Failed(error) => {
                    out.push_str(&format!(
                        "\n### {}\n\n{}\n",
                        reference.key(),
                        inline_marker(&error)
                    ));
                }
            }
        }
        Ok(())
    }

    async fn render_section(
        &self,
        plan: &SectionPlan,
        pass: &mut CompositionPass,
        sections: &mut BTreeMap<Tag, String>,
        out: &mut String,
    ) -> PersonaResult<()> {
        let text = match &plan.full {
            Some(block) => self.compose_block(block, pass).await?,
            None if plan.residual.is_empty() => return Ok(()),
            None => {
                let mut parts = Vec::new();
                for reference in &plan.residual {
                    match self.compose_reference(reference, pass, 0).await? {
                        Inline::Content(content) => parts.push(content.trim().to_string()),
                        Inline::Suppressed => {}
                        Inline::Failed(error) => parts.push(inline_marker(&error)),
                    }
                }
                parts.join("\n\n")
            }
        };
        let text = text.trim().to_string();
        if text.is_empty() {
            return Ok(());
        }
        out.push_str(&format!("\n## {}\n\n{text}\n", title(plan.tag)));
        sections.insert(plan.tag, text);
        Ok(())
    }
}

fn title(tag: Tag) -> String {
    let name = tag.as_str();
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

fn join_or_none<'a>(items: impl Iterator<Item = &'a str>) -> String {
    let joined: Vec<&str> = items.collect();
    if joined.is_empty() {
        "none".to_string()
    } else {
        joined.join(", ")
    }
}
