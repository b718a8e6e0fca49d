//! Test fixtures for Topograph

use crate::config::ViewConfig;
use crate::model::{GraphEdge, GraphNode, Snapshot};
use crate::scene::MemoryScene;
use crate::store::GraphStore;
use crate::view::GraphView;

pub fn node(id: &str, kind: &str) -> GraphNode {
    GraphNode::new(id, kind, id.to_uppercase())
}

pub fn edge(source: &str, target: &str, kind: &str) -> GraphEdge {
    GraphEdge::new(source, target, kind)
}

/// A small checkout stack: two services, a database and a queue.
pub fn checkout_topology() -> Snapshot {
    Snapshot::new(
        vec![
            node("api", "Service").with_environment("prod"),
            node("cart", "Service"),
            node("orders-db", "Database").with_status("degraded"),
            node("events", "QueueTopic"),
        ],
        vec![
            edge("api", "cart", "calls"),
            edge("api", "orders-db", "writes"),
            edge("cart", "orders-db", "reads"),
            edge("cart", "events", "publishesto"),
        ],
    )
}

/// Defaults with smaller iteration budgets so tests stay quick.
pub fn fast_config() -> ViewConfig {
    let mut config = ViewConfig::default();
    config.layout.full_iterations = 300;
    config.layout.incremental_iterations = 300;
    config.layout.exclude_iterations = 150;
    config.animation.frame_iterations = 100;
    config.animation.tween_frames = 3;
    config
}

/// A store holding `snapshot` with a view attached to a fresh scene.
pub fn attached(snapshot: Snapshot) -> (GraphStore, GraphView<MemoryScene>) {
    let mut store = GraphStore::new();
    store.replace_snapshot(snapshot);
    let config = fast_config();
    let scene = MemoryScene::from_config(&config.viewport);
    let view = GraphView::attach(scene, &mut store, config);
    (store, view)
}
