//! Reconciliation of the live scene against a new snapshot

use std::collections::{HashMap, HashSet};

use crate::adapter::{ElementData, SceneElement, edge_data, edge_element, node_data, node_element};
use crate::model::{GraphEdge, GraphNode};

/// Identifiers currently present in the live scene.
///
/// This is all the reconciler ever reads from a scene, which also makes it
/// the test double for one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SceneIds {
    pub nodes: HashSet<String>,
    pub edges: HashSet<String>,
}

impl SceneIds {
    pub fn new<N, E>(nodes: N, edges: E) -> Self
    where
        N: IntoIterator,
        N::Item: Into<String>,
        E: IntoIterator,
        E::Item: Into<String>,
    {
        SceneIds {
            nodes: nodes.into_iter().map(Into::into).collect(),
            edges: edges.into_iter().map(Into::into).collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len() + self.edges.len()
    }

    /// Apply a diff's structural operations, as a scene would.
    pub fn apply(&mut self, diff: &GraphDiff) {
        for id in &diff.to_remove {
            self.nodes.remove(id);
            self.edges.remove(id);
        }
        for element in &diff.to_add {
            if element.is_node() {
                self.nodes.insert(element.id().to_string());
            } else {
                self.edges.insert(element.id().to_string());
            }
        }
    }
}

/// Full replacement of one element's attribute record.
#[derive(Debug, Clone, PartialEq)]
pub struct ElementUpdate {
    pub id: String,
    pub data: ElementData,
}

/// Operations that turn the live scene into the target snapshot's shape.
#[derive(Debug, Clone, Default)]
pub struct GraphDiff {
    /// Monotonically increasing reconciliation sequence number.
    pub sequence: u64,
    /// Elements to insert; nodes precede edges.
    pub to_add: Vec<SceneElement>,
    /// Node and edge ids to remove.
    pub to_remove: HashSet<String>,
    pub node_updates: Vec<ElementUpdate>,
    pub edge_updates: Vec<ElementUpdate>,
    /// Added node ids that were not present in the scene.
    pub new_node_ids: HashSet<String>,
}

impl GraphDiff {
    pub fn new(sequence: u64) -> Self {
        GraphDiff {
            sequence,
            ..Default::default()
        }
    }

    pub fn has_additions(&self) -> bool {
        !self.to_add.is_empty()
    }

    pub fn has_removals(&self) -> bool {
        !self.to_remove.is_empty()
    }

    pub fn has_updates(&self) -> bool {
        !self.node_updates.is_empty() || !self.edge_updates.is_empty()
    }

    /// True when the diff neither adds nor removes anything.
    ///
    /// Updates are full idempotent rewrites, so a structurally empty diff
    /// leaves an already reconciled scene unchanged.
    pub fn is_structurally_empty(&self) -> bool {
        !self.has_additions() && !self.has_removals()
    }

    pub fn summary(&self) -> DiffSummary {
        DiffSummary {
            sequence: self.sequence,
            added: self.to_add.len(),
            removed: self.to_remove.len(),
            updated_nodes: self.node_updates.len(),
            updated_edges: self.edge_updates.len(),
            new_nodes: self.new_node_ids.len(),
        }
    }
}

/// Operation counts of a diff, for logging and reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize)]
pub struct DiffSummary {
    pub sequence: u64,
    pub added: usize,
    pub removed: usize,
    pub updated_nodes: usize,
    pub updated_edges: usize,
    pub new_nodes: usize,
}

/// Compute the diff between the live scene ids and a target snapshot.
///
/// `edges` must already be free of dangling edges. The result depends only
/// on the sets of ids involved, never on input order; duplicated ids keep
/// their last record. Runs in time linear in scene plus target size.
pub fn compute_diff(live: &SceneIds, nodes: &[GraphNode], edges: &[GraphEdge]) -> GraphDiff {
    let mut diff = GraphDiff::new(0);

    if nodes.is_empty() {
        // Edges cannot outlive their endpoints.
        diff.to_remove.extend(live.nodes.iter().cloned());
        diff.to_remove.extend(live.edges.iter().cloned());
        return diff;
    }

    let target_nodes: HashMap<&str, &GraphNode> = nodes.iter().map(|n| (n.id.as_str(), n)).collect();
    let edge_ids: Vec<String> = edges.iter().map(GraphEdge::scene_id).collect();
    let target_edges: HashMap<&str, &GraphEdge> = edge_ids
        .iter()
        .map(String::as_str)
        .zip(edges.iter())
        .collect();

    let mut seen: HashSet<&str> = HashSet::with_capacity(target_nodes.len());
    for node in nodes {
        let id = node.id.as_str();
        if !seen.insert(id) {
            continue;
        }
        let latest = target_nodes[id];
        if live.nodes.contains(id) {
            diff.node_updates.push(ElementUpdate {
                id: id.to_string(),
                data: node_data(latest),
            });
        } else {
            diff.new_node_ids.insert(id.to_string());
            diff.to_add.push(node_element(latest));
        }
    }

    let mut seen: HashSet<&str> = HashSet::with_capacity(target_edges.len());
    for id in &edge_ids {
        let id = id.as_str();
        if !seen.insert(id) {
            continue;
        }
        let latest = target_edges[id];
        if live.edges.contains(id) {
            diff.edge_updates.push(ElementUpdate {
                id: id.to_string(),
                data: edge_data(latest),
            });
        } else {
            diff.to_add.push(edge_element(latest));
        }
    }

    diff.to_remove.extend(
        live.nodes
            .iter()
            .filter(|id| !target_nodes.contains_key(id.as_str()))
            .cloned(),
    );
    diff.to_remove.extend(
        live.edges
            .iter()
            .filter(|id| !target_edges.contains_key(id.as_str()))
            .cloned(),
    );

    diff
}

/// Sequenced reconciler.
#[derive(Debug)]
pub struct DiffEngine {
    sequence: u64,
}

impl DiffEngine {
    pub fn new() -> Self {
        DiffEngine { sequence: 0 }
    }

    /// Compute the diff and stamp it with the next sequence number.
    pub fn compute_diff(&mut self, live: &SceneIds, nodes: &[GraphNode], edges: &[GraphEdge]) -> GraphDiff {
        let mut diff = compute_diff(live, nodes, edges);
        self.sequence += 1;
        diff.sequence = self.sequence;

        let summary = diff.summary();
        tracing::debug!(
            sequence = summary.sequence,
            added = summary.added,
            removed = summary.removed,
            updated_nodes = summary.updated_nodes,
            updated_edges = summary.updated_edges,
            new_nodes = summary.new_nodes,
            "Reconciled scene"
        );
        diff
    }

    /// Get current sequence number.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids<'a>(it: impl IntoIterator<Item = &'a String>) -> Vec<&'a str> {
        let mut v: Vec<&str> = it.into_iter().map(String::as_str).collect();
        v.sort_unstable();
        v
    }

    fn added_ids(diff: &GraphDiff) -> Vec<&str> {
        let mut v: Vec<&str> = diff.to_add.iter().map(SceneElement::id).collect();
        v.sort_unstable();
        v
    }

    #[test]
    fn test_first_population_adds_everything() {
        let nodes = vec![GraphNode::new("a", "Service", "A"), GraphNode::new("b", "Service", "B")];
        let edges = vec![GraphEdge::new("a", "b", "calls")];
        let diff = compute_diff(&SceneIds::default(), &nodes, &edges);

        assert_eq!(added_ids(&diff), vec!["a", "a::b::calls", "b"]);
        assert!(diff.to_add[0].is_node() && diff.to_add[1].is_node());
        assert!(!diff.to_add[2].is_node());
        assert_eq!(ids(&diff.new_node_ids), vec!["a", "b"]);
        assert!(!diff.has_removals());
        assert!(!diff.has_updates());
    }

    #[test]
    fn test_empty_target_removes_everything() {
        let live = SceneIds::new(["a", "b"], ["a::b::calls"]);
        let edges = vec![GraphEdge::new("a", "b", "calls")];
        let diff = compute_diff(&live, &[], &edges);

        assert_eq!(ids(&diff.to_remove), vec!["a", "a::b::calls", "b"]);
        assert!(diff.to_add.is_empty());
        assert!(!diff.has_updates());
    }

    #[test]
    fn test_duplicate_edge_triples_collapse() {
        let nodes = vec![GraphNode::new("a", "Service", "A"), GraphNode::new("b", "Service", "B")];
        let edges = vec![
            GraphEdge::new("a", "b", "calls").with_property("rps", 1),
            GraphEdge::new("a", "b", "calls").with_property("rps", 2),
            GraphEdge::new("a", "b", "dependson"),
        ];
        let diff = compute_diff(&SceneIds::default(), &nodes, &edges);

        let edge_adds: Vec<&SceneElement> = diff.to_add.iter().filter(|e| !e.is_node()).collect();
        assert_eq!(edge_adds.len(), 2);
        let calls = edge_adds.iter().find(|e| e.id() == "a::b::calls").unwrap();
        assert_eq!(calls.data["rps"], serde_json::json!(2));
    }

    #[test]
    fn test_sequence_increments() {
        let mut engine = DiffEngine::new();
        let nodes = vec![GraphNode::new("a", "Service", "A")];
        assert_eq!(engine.compute_diff(&SceneIds::default(), &nodes, &[]).sequence, 1);
        assert_eq!(engine.compute_diff(&SceneIds::default(), &nodes, &[]).sequence, 2);
        assert_eq!(engine.sequence(), 2);
    }

    #[test]
    fn test_applied_diff_is_structurally_idempotent() {
        let nodes = vec![GraphNode::new("a", "Service", "A"), GraphNode::new("b", "Pod", "B")];
        let edges = vec![GraphEdge::new("a", "b", "deployedon")];
        let mut live = SceneIds::new(["a", "stale"], ["stale::a::calls"]);

        let first = compute_diff(&live, &nodes, &edges);
        live.apply(&first);
        let second = compute_diff(&live, &nodes, &edges);

        assert!(second.is_structurally_empty());
        assert!(second.new_node_ids.is_empty());
        assert_eq!(second.node_updates.len(), 2);
        assert_eq!(second.edge_updates.len(), 1);
    }
}
