//! CLI command implementations

use anyhow::Context;
use std::path::{Path, PathBuf};
use topograph_core::{
    GraphStore, GraphView, LayoutAction, LayoutKind, MemoryScene, PositionCache, Reaction, Snapshot, ViewConfig,
};
use topograph_watcher::SnapshotWatcher;

use crate::OverlayArgs;

/// Store, view and config shared by the commands that drive a scene.
struct Session {
    root: PathBuf,
    config: ViewConfig,
    store: GraphStore,
    view: GraphView<MemoryScene>,
}

impl Session {
    fn open(root: PathBuf, overlay: OverlayArgs) -> anyhow::Result<Self> {
        let config = ViewConfig::load_or_default(&root)?;
        let positions_path = config.positions_path(&root);
        let positions = PositionCache::load(&positions_path)?;
        tracing::info!("Loaded {} cached positions", positions.len());

        let mut store = GraphStore::with_positions(positions);
        store.set_hidden_node_types(overlay.hidden_node_types);
        store.set_hidden_edge_types(overlay.hidden_edge_types);
        store.set_filter_mode(overlay.filter_mode);
        if let Some(query) = overlay.search {
            store.set_search_query(query);
        }

        let scene = MemoryScene::from_config(&config.viewport);
        let view = GraphView::attach(scene, &mut store, config.clone());
        Ok(Self {
            root,
            config,
            store,
            view,
        })
    }

    /// Replace the snapshot and let the view settle.
    fn apply(&mut self, snapshot: Snapshot) -> Vec<Reaction> {
        self.store.replace_snapshot(snapshot);
        let reactions = self.view.pump(&mut self.store);
        self.view.settle(&mut self.store);
        reactions
    }

    fn persist(&self) -> anyhow::Result<()> {
        let path = self.config.positions_path(&self.root);
        self.store.positions().persist(&path)?;
        Ok(())
    }
}

pub fn replay(
    root: PathBuf,
    files: Vec<PathBuf>,
    json: bool,
    layout: Option<LayoutKind>,
    overlay: OverlayArgs,
) -> anyhow::Result<()> {
    let mut session = Session::open(root, overlay)?;

    for (step, file) in files.iter().enumerate() {
        let snapshot = Snapshot::load(file).with_context(|| format!("failed to load {}", file.display()))?;
        let reactions = session.apply(snapshot);
        report(step + 1, file, &reactions, &session, json);
    }

    if let Some(kind) = layout {
        session.view.run_layout(kind);
        session.view.settle(&mut session.store);
        tracing::info!("Ran {} layout", kind);
    }

    session.persist()?;
    tracing::info!(
        "Saved {} positions to {}",
        session.store.positions().len(),
        session.config.positions_path(&session.root).display()
    );
    Ok(())
}

pub async fn watch(root: PathBuf, file: PathBuf, overlay: OverlayArgs) -> anyhow::Result<()> {
    let mut session = Session::open(root, overlay)?;
    let mut watcher = SnapshotWatcher::new(&file)?;

    let mut step = 0;
    if let Some(snapshot) = watcher.current() {
        step += 1;
        let reactions = session.apply(snapshot);
        report(step, &file, &reactions, &session, false);
        session.persist()?;
    }

    loop {
        tokio::select! {
            next = watcher.next_snapshot() => {
                let Some(snapshot) = next else {
                    tracing::warn!("Watcher stopped");
                    break;
                };
                step += 1;
                let reactions = session.apply(snapshot);
                report(step, &file, &reactions, &session, false);
                session.persist()?;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    watcher.stop()?;
    session.persist()?;
    Ok(())
}

pub fn clear(root: PathBuf) -> anyhow::Result<()> {
    let config = ViewConfig::load_or_default(&root)?;
    let path = config.positions_path(&root);
    tracing::info!("Clearing position cache: {}", path.display());

    PositionCache::remove_file(&path)?;

    tracing::info!("Cache cleared");
    Ok(())
}

fn report(step: usize, file: &Path, reactions: &[Reaction], session: &Session, json: bool) {
    let synced = reactions.iter().find_map(|r| match r {
        Reaction::Synced { summary, action } => Some((summary, action)),
        _ => None,
    });
    let Some((summary, action)) = synced else {
        tracing::info!("Step {}: {} changed nothing", step, file.display());
        return;
    };

    let scene = session.view.scene();
    if json {
        let line = serde_json::json!({
            "step": step,
            "file": file.display().to_string(),
            "diff": summary,
            "action": action.name(),
            "nodes": scene.node_count(),
            "edges": scene.edge_count(),
            "cached_positions": session.store.positions().len(),
        });
        println!("{line}");
        return;
    }

    let placed = match action {
        LayoutAction::Scoped { place, .. } => format!(" ({} placed)", place.len()),
        _ => String::new(),
    };
    println!(
        "step {step}: {} | +{} -{} ~{} nodes ~{} edges | {}{} | scene {} nodes, {} edges",
        file.display(),
        summary.added,
        summary.removed,
        summary.updated_nodes,
        summary.updated_edges,
        action.name(),
        placed,
        scene.node_count(),
        scene.edge_count(),
    );
}
