//! Translation of snapshot nodes/edges into scene element records

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::model::{GraphEdge, GraphNode};

/// Attribute record of a scene element.
pub type ElementData = Map<String, Value>;

/// Structural fields of a node record that extra properties may not overwrite.
pub const RESERVED_NODE_KEYS: [&str; 5] = ["id", "label", "parent", "source", "target"];

/// Structural fields of an edge record that extra properties may not overwrite.
pub const RESERVED_EDGE_KEYS: [&str; 3] = ["id", "source", "target"];

const DEFAULT_STATUS: &str = "active";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementGroup {
    Nodes,
    Edges,
}

/// A record ready for insertion into a scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneElement {
    pub group: ElementGroup,
    pub data: ElementData,
}

impl SceneElement {
    pub fn id(&self) -> &str {
        self.str_field("id").unwrap_or_default()
    }

    pub fn source(&self) -> Option<&str> {
        self.str_field("source")
    }

    pub fn target(&self) -> Option<&str> {
        self.str_field("target")
    }

    pub fn is_node(&self) -> bool {
        self.group == ElementGroup::Nodes
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.data.get(key).and_then(Value::as_str)
    }
}

/// Build the attribute record for a node.
///
/// Extra properties follow the fixed fields, so a property named `type`,
/// `status` or `environment` overrides the base value. Properties colliding
/// with a reserved key are dropped.
pub fn node_data(node: &GraphNode) -> ElementData {
    let mut data = ElementData::new();
    data.insert("id".into(), Value::String(node.id.clone()));
    data.insert("label".into(), Value::String(node.name.clone()));
    data.insert("type".into(), Value::String(node.kind.clone()));
    data.insert(
        "status".into(),
        Value::String(node.status.clone().unwrap_or_else(|| DEFAULT_STATUS.to_string())),
    );
    data.insert(
        "environment".into(),
        Value::String(node.environment.clone().unwrap_or_default()),
    );
    merge_properties(&mut data, &node.properties, &RESERVED_NODE_KEYS, &node.id);
    data
}

/// Build the attribute record for an edge, keyed by its scene id.
pub fn edge_data(edge: &GraphEdge) -> ElementData {
    let id = edge.scene_id();
    let mut data = ElementData::new();
    data.insert("id".into(), Value::String(id.clone()));
    data.insert("source".into(), Value::String(edge.source_id.clone()));
    data.insert("target".into(), Value::String(edge.target_id.clone()));
    data.insert("type".into(), Value::String(edge.kind.clone()));
    data.insert(
        "status".into(),
        Value::String(edge.status.clone().unwrap_or_else(|| DEFAULT_STATUS.to_string())),
    );
    merge_properties(&mut data, &edge.properties, &RESERVED_EDGE_KEYS, &id);
    data
}

pub fn node_element(node: &GraphNode) -> SceneElement {
    SceneElement {
        group: ElementGroup::Nodes,
        data: node_data(node),
    }
}

pub fn edge_element(edge: &GraphEdge) -> SceneElement {
    SceneElement {
        group: ElementGroup::Edges,
        data: edge_data(edge),
    }
}

/// Adapt a node list and a (non-dangling) edge list, nodes first.
pub fn to_scene_elements(nodes: &[GraphNode], edges: &[GraphEdge]) -> Vec<SceneElement> {
    nodes
        .iter()
        .map(node_element)
        .chain(edges.iter().map(edge_element))
        .collect()
}

fn merge_properties(data: &mut ElementData, properties: &ElementData, reserved: &[&str], owner: &str) {
    for (key, value) in properties {
        if reserved.contains(&key.as_str()) {
            tracing::debug!("Dropping reserved property key '{}' on {}", key, owner);
            continue;
        }
        data.insert(key.clone(), value.clone());
    }
}
