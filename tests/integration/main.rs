//! Integration tests for Topograph
//!
//! These tests drive the store, view, position file and watcher together
//! the way the CLI does.

use std::path::Path;
use std::time::Duration;

use tempfile::TempDir;
use topograph_core::{
    FilterMode, GraphStore, GraphView, LayoutAction, LayoutKind, MemoryScene, PositionCache, Reaction, Snapshot,
    ViewConfig,
};
use topograph_watcher::SnapshotWatcher;

const BASE: &str = r#"{
  "nodes": [
    {"id": "gateway", "type": "Service", "name": "Gateway", "environment": "prod"},
    {"id": "orders", "type": "Service", "name": "Orders", "properties": {"team": "checkout", "id": "spoofed"}},
    {"id": "orders-db", "type": "Database", "name": "Orders DB"}
  ],
  "edges": [
    {"source_id": "gateway", "target_id": "orders", "type": "calls"},
    {"source_id": "orders", "target_id": "orders-db", "type": "writes"},
    {"source_id": "orders", "target_id": "payments", "type": "calls"}
  ],
  "node_count": 3,
  "edge_count": 3
}"#;

const GROWN: &str = r#"{
  "nodes": [
    {"id": "gateway", "type": "Service", "name": "Gateway"},
    {"id": "orders", "type": "Service", "name": "Orders"},
    {"id": "orders-db", "type": "Database", "name": "Orders DB"},
    {"id": "payments", "type": "Service", "name": "Payments", "status": "degraded"}
  ],
  "edges": [
    {"source_id": "gateway", "target_id": "orders", "type": "calls"},
    {"source_id": "orders", "target_id": "orders-db", "type": "writes"},
    {"source_id": "orders", "target_id": "payments", "type": "calls"}
  ]
}"#;

fn write_config(root: &Path) {
    std::fs::write(
        root.join("topograph.toml"),
        "[layout]\nfull_iterations = 300\nincremental_iterations = 300\nexclude_iterations = 100\n",
    )
    .unwrap();
}

fn open_view(root: &Path) -> (ViewConfig, GraphStore, GraphView<MemoryScene>) {
    let config = ViewConfig::load_or_default(root).unwrap();
    let positions = PositionCache::load(&config.positions_path(root)).unwrap();
    let mut store = GraphStore::with_positions(positions);
    let view = GraphView::attach(MemoryScene::from_config(&config.viewport), &mut store, config.clone());
    (config, store, view)
}

fn action_of(reactions: &[Reaction]) -> Option<LayoutAction> {
    reactions.iter().find_map(|r| match r {
        Reaction::Synced { action, .. } => Some(action.clone()),
        _ => None,
    })
}

/// Positions survive a restart through the on-disk cache
#[test]
fn test_positions_persist_across_sessions() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write_config(root);

    let (config, mut store, mut view) = open_view(root);
    assert_eq!(config.layout.full_iterations, 300);
    store.replace_snapshot(Snapshot::from_json(BASE).unwrap());
    assert_eq!(action_of(&view.pump(&mut store)), Some(LayoutAction::FullLayout));
    // The edge to the missing payments node is dropped.
    assert_eq!(view.scene().edge_count(), 2);

    let first = view.scene().positions();
    store.positions().persist(&config.positions_path(root)).unwrap();
    assert!(root.join(".topograph/positions.json").exists());

    let (_, mut store, mut view) = open_view(root);
    store.replace_snapshot(Snapshot::from_json(BASE).unwrap());
    assert_eq!(action_of(&view.pump(&mut store)), Some(LayoutAction::Restore));
    assert_eq!(view.scene().positions(), first);
    assert_eq!(view.layouts_started(), 0);
}

/// Growing the snapshot places only the new node
#[test]
fn test_grown_snapshot_places_only_new_node() {
    let temp_dir = TempDir::new().unwrap();
    write_config(temp_dir.path());
    let (_, mut store, mut view) = open_view(temp_dir.path());

    store.replace_snapshot(Snapshot::from_json(BASE).unwrap());
    view.pump(&mut store);
    let before = view.scene().positions();

    store.replace_snapshot(Snapshot::from_json(GROWN).unwrap());
    let action = action_of(&view.pump(&mut store)).unwrap();
    assert!(matches!(action, LayoutAction::Scoped { ref place, .. } if place.len() == 1 && place.contains("payments")));

    let after = view.scene().positions();
    for id in ["gateway", "orders", "orders-db"] {
        assert_eq!(after[id], before[id], "{id} moved");
    }
    assert_eq!(view.scene().edge_count(), 3);
}

/// Reserved keys in properties never overwrite structural fields
#[test]
fn test_reserved_property_keys_are_dropped() {
    let temp_dir = TempDir::new().unwrap();
    let (_, mut store, mut view) = open_view(temp_dir.path());
    store.replace_snapshot(Snapshot::from_json(BASE).unwrap());
    view.pump(&mut store);

    use topograph_core::SceneSurface;
    let data = view.scene().node_data("orders").unwrap();
    assert_eq!(data["id"], "orders");
    assert_eq!(data["team"], "checkout");
    assert_eq!(data["status"], "active");
    assert_eq!(view.scene().node_data("gateway").unwrap()["environment"], "prod");
}

/// Exclude mode relays out once, clear removes the cache file
#[test]
fn test_exclude_and_clear() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    write_config(root);
    let (config, mut store, mut view) = open_view(root);
    store.replace_snapshot(Snapshot::from_json(GROWN).unwrap());
    view.pump(&mut store);
    let started = view.layouts_started();

    store.set_filter_mode(FilterMode::Exclude);
    store.set_hidden_node_types(["Database".to_string()]);
    assert_eq!(view.pump(&mut store), vec![Reaction::Filtered { relayout: true }]);
    assert_eq!(view.layouts_started(), started + 1);

    view.run_layout(LayoutKind::Grid).unwrap();
    view.settle(&mut store);

    let path = config.positions_path(root);
    store.positions().persist(&path).unwrap();
    PositionCache::remove_file(&path).unwrap();
    assert!(PositionCache::load(&path).unwrap().is_empty());
}

/// The watcher reads the current file and shuts down cleanly
#[tokio::test]
async fn test_snapshot_watcher() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("graph.json");
    std::fs::write(&path, BASE).unwrap();

    let mut watcher = SnapshotWatcher::new(&path).unwrap().with_debounce(Duration::from_millis(50));
    let snapshot = watcher.current().unwrap();
    assert_eq!(snapshot.nodes.len(), 3);

    std::fs::write(&path, GROWN).unwrap();
    match tokio::time::timeout(Duration::from_secs(2), watcher.next_snapshot()).await {
        Ok(Some(snapshot)) => assert_eq!(snapshot.nodes.len(), 4),
        Ok(None) => panic!("watcher shut down before delivering a snapshot"),
        Err(_) => eprintln!("no file event within 2s"),
    }
    watcher.stop().unwrap();
}
