//! Term extraction and the procedural pass over a composed role.

use anyhow::anyhow;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::{mermaid_text, ConceptGraph, ConceptId, ConceptKind, RelationKind};
use crate::compose::ComposedRole;
use crate::config::ConceptConfig;
use crate::dpml::{parse_document, Tag};
use crate::error::PersonaResult;

static HEADING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]{0,3}#{1,6}[ \t]+(.+?)[ \t#]*$").expect("heading pattern is valid")
});

static BOLD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\*\*([^*\n]+)\*\*").expect("bold pattern is valid"));

static LEAD_TERM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:[-*+•]|\d+[.)])[ \t]+([^:：\n]+?)[ \t]*[:：]")
        .expect("lead term pattern is valid")
});

static STEP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*(\d+)[.)][ \t]+(.+?)[ \t]*$").expect("step pattern is valid")
});

/// Builds the concept graph for a composed role and derives procedural flows
/// from its execution skills.
#[derive(Debug, Clone, Default)]
pub struct ConceptGraphBuilder {
    config: ConceptConfig,
}

impl ConceptGraphBuilder {
    pub fn new(config: ConceptConfig) -> Self {
        Self { config }
    }

    pub fn build_graph(&self, role: &ComposedRole) -> PersonaResult<ConceptGraph> {
        if role.sections.is_empty() && role.skills.is_empty() {
            return Err(
                anyhow!("role {} has no composed content to index", role.role_id).into(),
            );
        }

        let mut graph = ConceptGraph::new();
        let root = graph.add_node(&role.name, ConceptKind::Role);

        for (tag, text) in &role.sections {
            if let Some(section) = self.add(&mut graph, tag.as_str(), ConceptKind::Section) {
                graph.add_edge(&root, &section, RelationKind::Contains);
                self.index_terms(&mut graph, &section, text);
            }
        }
        for skill in &role.skills {
            let label = skill.key.to_string();
            if let Some(node) = self.add(&mut graph, &label, ConceptKind::Skill) {
                graph.add_edge(&root, &node, RelationKind::Contains);
                self.index_terms(&mut graph, &node, &skill.content);
            }
        }

        debug!(
            role = %role.role_id,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            "concept graph built"
        );
        Ok(graph)
    }

    pub fn serialize(&self, graph: &ConceptGraph) -> String {
        graph.to_mermaid()
    }

    /// Best-effort flowchart of the role's numbered execution steps. Any
    /// failure yields an empty string.
    pub fn derive_procedural_patterns(&self, role: &ComposedRole) -> String {
        match self.try_derive_procedural_patterns(role) {
            Ok(text) => text,
            Err(e) => {
                debug!(role = %role.role_id, "procedural pass skipped: {e}");
                String::new()
            }
        }
    }

    /// Fallible form of [`derive_procedural_patterns`](Self::derive_procedural_patterns).
    pub fn try_derive_procedural_patterns(&self, role: &ComposedRole) -> PersonaResult<String> {
        let mut flows = Vec::new();
        let executions = role.skills.iter().filter(|s| s.key.protocol == "execution");
        for (n, skill) in executions.enumerate() {
            let document = parse_document(&skill.content)?;
            let source = document
                .block(Tag::Process)
                .map(|b| b.text.as_str())
                .unwrap_or(&skill.content);

            // Ids are positional; the skill id only appears in quoted labels.
            let prefix = format!("flow{}", n + 1);
            let steps: Vec<String> = STEP_RE
                .captures_iter(source)
                .enumerate()
                .map(|(i, caps)| {
                    format!(
                        "{prefix}_{}[\"{}\"]",
                        i + 1,
                        clip(&mermaid_text(&caps[2]), self.config.max_label_chars)
                    )
                })
                .collect();
            if steps.is_empty() {
                continue;
            }
            flows.push(format!(
                "    subgraph {prefix}[\"{}\"]\n        {}\n    end\n",
                skill.key,
                steps.join(" --> ")
            ));
        }

        if flows.is_empty() {
            return Ok(String::new());
        }
        Ok(format!("flowchart LR\n{}", flows.concat()))
    }

    fn add(&self, graph: &mut ConceptGraph, label: &str, kind: ConceptKind) -> Option<ConceptId> {
        let full = graph.node_count() >= self.config.max_nodes;
        if full && !graph.contains(&ConceptGraph::key(label)) {
            return None;
        }
        Some(graph.add_node(label, kind))
    }

    fn index_terms(&self, graph: &mut ConceptGraph, parent: &str, text: &str) {
        for term in extract_terms(text, self.config.max_label_chars) {
            if let Some(id) = self.add(graph, &term, ConceptKind::Term) {
                graph.add_edge(parent, &id, RelationKind::Mentions);
            }
        }
    }
}

/// Headings, bold phrases and list lead terms, in source order.
fn extract_terms(text: &str, max_chars: usize) -> Vec<String> {
    let mut found: Vec<(usize, String)> = Vec::new();
    for re in [&*HEADING_RE, &*BOLD_RE, &*LEAD_TERM_RE] {
        for caps in re.captures_iter(text) {
            if let Some(m) = caps.get(1) {
                found.push((m.start(), m.as_str().to_string()));
            }
        }
    }
    found.sort_by_key(|(pos, _)| *pos);

    found
        .into_iter()
        .map(|(_, raw)| {
            mermaid_text(raw.trim_matches(|c: char| c == '*' || c == '_' || c.is_whitespace()))
        })
        .map(|label| label.trim_end_matches(['.', ',', ';', '!', '?']).to_string())
        .filter(|label| !label.is_empty() && !label.contains("://"))
        .filter(|label| label.chars().count() <= max_chars)
        .collect()
}

fn clip(label: &str, max_chars: usize) -> String {
    if label.chars().count() <= max_chars {
        return label.to_string();
    }
    let mut clipped: String = label.chars().take(max_chars.saturating_sub(1)).collect();
    clipped.push('…');
    clipped
}
