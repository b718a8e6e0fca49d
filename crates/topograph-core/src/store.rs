//! State container for the snapshot, overlay inputs and cached positions
//!
//! All mutation goes through the setters below. Each one is idempotent:
//! writing the current value changes nothing and notifies nobody. Graph
//! replacement is the exception, since every completed query is a new
//! snapshot even when its content repeats.

use std::collections::{BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;

use crate::model::{GraphEdge, GraphNode, Snapshot};
use crate::overlay::{FilterMode, OverlayState};
use crate::positions::PositionCache;

/// Notification buffer per subscriber.
pub const EVENT_CAPACITY: usize = 256;

/// What changed in the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    GraphReplaced { generation: u64 },
    SelectionChanged,
    HoverChanged,
    HighlightChanged,
    SearchChanged,
    FilterChanged,
    PositionsChanged,
    Reset,
}

#[derive(Debug)]
pub struct GraphStore {
    snapshot: Snapshot,
    overlay: OverlayState,
    positions: PositionCache,
    generation: u64,
    refreshed_at: Option<DateTime<Utc>>,
    events: broadcast::Sender<StoreEvent>,
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        GraphStore {
            snapshot: Snapshot::default(),
            overlay: OverlayState::default(),
            positions: PositionCache::new(),
            generation: 0,
            refreshed_at: None,
            events,
        }
    }

    /// Start from previously persisted positions.
    pub fn with_positions(positions: PositionCache) -> Self {
        GraphStore {
            positions,
            ..Self::new()
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn overlay(&self) -> &OverlayState {
        &self.overlay
    }

    pub fn positions(&self) -> &PositionCache {
        &self.positions
    }

    /// Number of snapshots delivered so far.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn refreshed_at(&self) -> Option<DateTime<Utc>> {
        self.refreshed_at
    }

    fn emit(&self, event: StoreEvent) {
        tracing::trace!(?event, "Store event");
        // No subscribers is fine; the store is usable on its own.
        let _ = self.events.send(event);
    }

    /// Replace the authoritative graph.
    pub fn set_graph(&mut self, nodes: Vec<GraphNode>, edges: Vec<GraphEdge>) {
        self.replace_snapshot(Snapshot::new(nodes, edges));
    }

    pub fn replace_snapshot(&mut self, snapshot: Snapshot) {
        self.snapshot = snapshot;
        self.generation += 1;
        self.refreshed_at = Some(Utc::now());
        tracing::debug!(
            generation = self.generation,
            nodes = self.snapshot.nodes.len(),
            edges = self.snapshot.edges.len(),
            "Graph replaced"
        );
        self.emit(StoreEvent::GraphReplaced {
            generation: self.generation,
        });
    }

    pub fn select_node(&mut self, id: Option<String>) -> bool {
        if self.overlay.selected == id {
            return false;
        }
        self.overlay.selected = id;
        self.emit(StoreEvent::SelectionChanged);
        true
    }

    pub fn hover_node(&mut self, id: Option<String>) -> bool {
        if self.overlay.hovered == id {
            return false;
        }
        self.overlay.hovered = id;
        self.emit(StoreEvent::HoverChanged);
        true
    }

    pub fn set_highlighted_nodes(&mut self, ids: impl IntoIterator<Item = String>) -> bool {
        let ids: HashSet<String> = ids.into_iter().collect();
        if self.overlay.highlighted == ids {
            return false;
        }
        self.overlay.highlighted = ids;
        self.emit(StoreEvent::HighlightChanged);
        true
    }

    pub fn set_search_query(&mut self, query: impl Into<String>) -> bool {
        let query = query.into();
        if self.overlay.search_query == query {
            return false;
        }
        self.overlay.search_query = query;
        self.emit(StoreEvent::SearchChanged);
        true
    }

    /// Flip one node type between shown and hidden.
    pub fn toggle_node_type(&mut self, kind: &str) {
        let hidden = &mut self.overlay.hidden_node_types;
        if !hidden.remove(kind) {
            hidden.insert(kind.to_string());
        }
        self.emit(StoreEvent::FilterChanged);
    }

    /// Flip one edge type between shown and hidden.
    pub fn toggle_edge_type(&mut self, kind: &str) {
        let hidden = &mut self.overlay.hidden_edge_types;
        if !hidden.remove(kind) {
            hidden.insert(kind.to_string());
        }
        self.emit(StoreEvent::FilterChanged);
    }

    pub fn set_hidden_node_types(&mut self, kinds: impl IntoIterator<Item = String>) -> bool {
        let kinds: BTreeSet<String> = kinds.into_iter().collect();
        if self.overlay.hidden_node_types == kinds {
            return false;
        }
        self.overlay.hidden_node_types = kinds;
        self.emit(StoreEvent::FilterChanged);
        true
    }

    pub fn set_hidden_edge_types(&mut self, kinds: impl IntoIterator<Item = String>) -> bool {
        let kinds: BTreeSet<String> = kinds.into_iter().collect();
        if self.overlay.hidden_edge_types == kinds {
            return false;
        }
        self.overlay.hidden_edge_types = kinds;
        self.emit(StoreEvent::FilterChanged);
        true
    }

    pub fn set_filter_mode(&mut self, mode: FilterMode) -> bool {
        if self.overlay.filter_mode == mode {
            return false;
        }
        self.overlay.filter_mode = mode;
        self.emit(StoreEvent::FilterChanged);
        true
    }

    pub fn set_node_positions(&mut self, positions: PositionCache) -> bool {
        if self.positions == positions {
            return false;
        }
        self.positions = positions;
        self.emit(StoreEvent::PositionsChanged);
        true
    }

    /// Forget every cached coordinate. The next population lays out afresh.
    pub fn clear_node_positions(&mut self) -> bool {
        if self.positions.is_empty() {
            return false;
        }
        self.positions.clear();
        self.emit(StoreEvent::PositionsChanged);
        true
    }

    /// Back to the initial state: no graph, default overlay, no positions.
    pub fn reset(&mut self) {
        self.snapshot = Snapshot::default();
        self.overlay = OverlayState::default();
        self.positions.clear();
        self.refreshed_at = None;
        self.generation += 1;
        tracing::debug!("Store reset");
        self.emit(StoreEvent::Reset);
    }
}
