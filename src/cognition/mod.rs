//! Concept graph: a retrieval index over a composed role.
//!
//! Each role, section, skill and salient term is a node. Edges say which
//! part contains which, and which part mentions a term. The graph is
//! serialized as a mermaid `mindmap`, compact enough to prime a model with
//! the shape of a role without its full prose.

mod builder;

pub use builder::ConceptGraphBuilder;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Stable node key: the lowercased label.
pub type ConceptId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConceptKind {
    Role,
    /// A composed section such as personality or knowledge
    Section,
    /// A thought or execution loaded standalone
    Skill,
    /// A heading, bold phrase or list lead term
    Term,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    Contains,
    Mentions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConceptNode {
    pub id: ConceptId,
    pub label: String,
    pub kind: ConceptKind,
    /// How many times the concept was seen while building.
    pub weight: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptEdge {
    pub from: ConceptId,
    pub to: ConceptId,
    pub kind: RelationKind,
}

/// Node/edge structure with an outgoing-edge index. Insertion order is kept
/// so serialization is deterministic.
#[derive(Debug, Clone, Default)]
pub struct ConceptGraph {
    nodes: HashMap<ConceptId, ConceptNode>,
    order: Vec<ConceptId>,
    edges: Vec<ConceptEdge>,
    outgoing: HashMap<ConceptId, Vec<usize>>,
    root: Option<ConceptId>,
}

impl ConceptGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key(label: &str) -> ConceptId {
        label.trim().to_lowercase()
    }

    /// Add a node, or bump the weight of the existing one. Returns its id.
    pub fn add_node(&mut self, label: &str, kind: ConceptKind) -> ConceptId {
        let id = Self::key(label);
        if let Some(node) = self.nodes.get_mut(&id) {
            node.weight += 1;
            return id;
        }
        if kind == ConceptKind::Role && self.root.is_none() {
            self.root = Some(id.clone());
        }
        self.order.push(id.clone());
        self.nodes.insert(
            id.clone(),
            ConceptNode {
                id: id.clone(),
                label: label.trim().to_string(),
                kind,
                weight: 1,
            },
        );
        id
    }

    /// Add an edge between two existing nodes. Duplicates and self-loops are ignored.
    pub fn add_edge(&mut self, from: &str, to: &str, kind: RelationKind) -> bool {
        if from == to || !self.nodes.contains_key(from) || !self.nodes.contains_key(to) {
            return false;
        }
        let exists = self
            .outgoing
            .get(from)
            .map(|idx| idx.iter().any(|&i| self.edges[i].to == to))
            .unwrap_or(false);
        if exists {
            return false;
        }
        self.edges.push(ConceptEdge {
            from: from.to_string(),
            to: to.to_string(),
            kind,
        });
        self.outgoing
            .entry(from.to_string())
            .or_default()
            .push(self.edges.len() - 1);
        true
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node(&self, id: &str) -> Option<&ConceptNode> {
        self.nodes.get(id)
    }

    pub fn root(&self) -> Option<&ConceptNode> {
        self.root.as_deref().and_then(|id| self.nodes.get(id))
    }

    /// Nodes reachable by one outgoing edge, in insertion order.
    pub fn children(&self, id: &str) -> Vec<&ConceptNode> {
        self.outgoing
            .get(id)
            .map(|idx| {
                idx.iter()
                    .filter_map(|&i| self.nodes.get(&self.edges[i].to))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ConceptNode> {
        self.order.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn edges(&self) -> &[ConceptEdge] {
        &self.edges
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Mermaid `mindmap` rooted at the role node. Each node is printed once,
    /// under the first parent that reaches it.
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("mindmap\n");
        let Some(root) = self.root() else {
            return out;
        };
        out.push_str(&format!("  root(({}))\n", mermaid_text(&root.label)));
        let mut seen = HashSet::from([root.id.clone()]);
        self.write_children(&root.id, 2, &mut seen, &mut out);
        out
    }

    fn write_children(
        &self,
        id: &str,
        depth: usize,
        seen: &mut HashSet<ConceptId>,
        out: &mut String,
    ) {
        for child in self.children(id) {
            if !seen.insert(child.id.clone()) {
                continue;
            }
            out.push_str(&"  ".repeat(depth));
            out.push_str(&mermaid_text(&child.label));
            out.push('\n');
            self.write_children(&child.id, depth + 1, seen, out);
        }
    }
}

/// Strip characters mermaid reads as node shapes or string delimiters.
pub(crate) fn mermaid_text(label: &str) -> String {
    label
        .chars()
        .map(|c| match c {
            '(' | ')' | '[' | ']' | '{' | '}' | '"' | '`' | '<' | '>' => ' ',
            other => other,
        })
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nodes_merge_by_normalized_label() {
        let mut graph = ConceptGraph::new();
        let a = graph.add_node("Risk Analysis", ConceptKind::Term);
        let b = graph.add_node("risk analysis", ConceptKind::Term);
        assert_eq!(a, b);
        assert_eq!(graph.node_count(), 1);
        assert_eq!(graph.node(&a).unwrap().weight, 2);
        assert_eq!(graph.node(&a).unwrap().label, "Risk Analysis");
    }

    #[test]
    fn edges_dedupe_and_require_nodes() {
        let mut graph = ConceptGraph::new();
        let role = graph.add_node("dev", ConceptKind::Role);
        let term = graph.add_node("Testing", ConceptKind::Term);
        assert!(graph.add_edge(&role, &term, RelationKind::Mentions));
        assert!(!graph.add_edge(&role, &term, RelationKind::Mentions));
        assert!(!graph.add_edge(&role, "missing", RelationKind::Mentions));
        assert!(!graph.add_edge(&role, &role, RelationKind::Contains));
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn mindmap_prints_each_node_once() {
        let mut graph = ConceptGraph::new();
        let role = graph.add_node("Developer", ConceptKind::Role);
        let section = graph.add_node("Personality", ConceptKind::Section);
        let skill = graph.add_node("thought://analysis", ConceptKind::Skill);
        let term = graph.add_node("Curiosity (core)", ConceptKind::Term);
        graph.add_edge(&role, &section, RelationKind::Contains);
        graph.add_edge(&role, &skill, RelationKind::Contains);
        graph.add_edge(&section, &term, RelationKind::Mentions);
        graph.add_edge(&skill, &term, RelationKind::Mentions);

        let text = graph.to_mermaid();
        assert_eq!(
            text,
            "mindmap\n  root((Developer))\n    Personality\n      Curiosity core\n    thought://analysis\n"
        );
    }

    #[test]
    fn empty_graph_serializes_header_only() {
        assert_eq!(ConceptGraph::new().to_mermaid(), "mindmap\n");
    }
}
