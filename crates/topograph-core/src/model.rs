//! Core data structures for the topology snapshot

use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, ViewError};

/// Open-ended extra properties carried by nodes and edges.
pub type Properties = Map<String, Value>;

/// Joins source id, target id and edge type into an edge's scene id.
/// Node identifiers must not contain it.
pub const EDGE_ID_SEPARATOR: &str = "::";

/// Node categories the style rules know about.
pub const NODE_TYPES: [&str; 15] = [
    "Service",
    "Endpoint",
    "Deployment",
    "Pod",
    "Node",
    "Database",
    "Table",
    "QueueTopic",
    "Cache",
    "ExternalAPI",
    "SecretConfig",
    "Library",
    "TeamOwner",
    "SLASLO",
    "RegionCluster",
];

/// Edge categories the style rules know about.
pub const EDGE_TYPES: [&str; 11] = [
    "calls",
    "publishesto",
    "consumesfrom",
    "reads",
    "writes",
    "dependson",
    "deployedon",
    "ownedby",
    "authenticatesvia",
    "ratelimitedby",
    "fails_over_to",
];

/// A single infrastructure entity (service, pod, database, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphNode {
    /// Globally unique and stable for the lifetime of the entity.
    pub id: String,
    /// Type tag; opaque to the engine apart from style lookup.
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
    #[serde(default)]
    pub properties: Properties,
}

impl GraphNode {
    pub fn new(id: impl Into<String>, kind: impl Into<String>, name: impl Into<String>) -> Self {
        GraphNode {
            id: id.into(),
            kind: kind.into(),
            name: name.into(),
            status: None,
            environment: None,
            properties: Properties::new(),
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }
}

/// A directed relationship between two nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    pub source_id: String,
    pub target_id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default)]
    pub properties: Properties,
}

impl GraphEdge {
    pub fn new(
        source_id: impl Into<String>,
        target_id: impl Into<String>,
        kind: impl Into<String>,
    ) -> Self {
        GraphEdge {
            source_id: source_id.into(),
            target_id: target_id.into(),
            kind: kind.into(),
            status: None,
            properties: Properties::new(),
        }
    }

    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = Some(status.into());
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Scene identifier: `source::target::type`.
    ///
    /// Parallel edges of different types stay distinct; duplicate
    /// (source, target, type) triples collapse into one scene element.
    pub fn scene_id(&self) -> String {
        edge_scene_id(&self.source_id, &self.target_id, &self.kind)
    }
}

/// Build an edge scene id from its parts.
pub fn edge_scene_id(source_id: &str, target_id: &str, kind: &str) -> String {
    format!("{source_id}{EDGE_ID_SEPARATOR}{target_id}{EDGE_ID_SEPARATOR}{kind}")
}

/// One complete, atomic replacement of the authoritative node/edge lists.
///
/// Deserializes from the backend's graph response; `node_count`,
/// `edge_count` and any other extra fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub nodes: Vec<GraphNode>,
    #[serde(default)]
    pub edges: Vec<GraphEdge>,
}

impl Snapshot {
    pub fn new(nodes: Vec<GraphNode>, edges: Vec<GraphEdge>) -> Self {
        Snapshot { nodes, edges }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Parse a snapshot from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| ViewError::json("snapshot", e))
    }

    /// Read and parse a snapshot file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ViewError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&text).map_err(|e| ViewError::json(path.display().to_string(), e))
    }

    /// Edges whose endpoints are both present in this snapshot.
    pub fn renderable_edges(&self) -> Vec<GraphEdge> {
        filter_dangling_edges(&self.nodes, &self.edges)
    }
}

/// Drop edges whose source or target is missing from `nodes`.
///
/// Partial neighbourhoods are a normal query result, so dropped edges are
/// only logged at debug level.
pub fn filter_dangling_edges(nodes: &[GraphNode], edges: &[GraphEdge]) -> Vec<GraphEdge> {
    let node_ids: HashSet<&str> = nodes.iter().map(|n| n.id.as_str()).collect();
    let kept: Vec<GraphEdge> = edges
        .iter()
        .filter(|e| node_ids.contains(e.source_id.as_str()) && node_ids.contains(e.target_id.as_str()))
        .cloned()
        .collect();

    let dropped = edges.len() - kept.len();
    if dropped > 0 {
        tracing::debug!("Dropped {} dangling edges", dropped);
    }
    kept
}
