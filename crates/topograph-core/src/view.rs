//! The graph view: keeps one scene in step with a [`GraphStore`]
//!
//! Store notifications are drained by [`GraphView::pump`] and turned into
//! scene work in a fixed order: filter style, snapshot reconciliation, the
//! exclude re-layout, search, highlight, selection.

use std::collections::HashSet;

use tokio::sync::broadcast::{self, error::TryRecvError};

use crate::config::ViewConfig;
use crate::diff::{DiffEngine, DiffSummary};
use crate::layout::LayoutKind;
use crate::overlay::{StyleRules, apply_filter, apply_highlight, apply_search, apply_selection};
use crate::scene::{Point, SceneSurface, fit_scene};
use crate::scheduler::{LayoutAction, LayoutHandle, LayoutScheduler, TickOutcome, plan};
use crate::store::{GraphStore, StoreEvent};

/// Pointer input on the rendered scene.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PointerEvent {
    /// Tap on a node, or on the background when `node` is `None`.
    Tap { node: Option<String> },
    Over { node: String },
    Out,
}

/// Notifications the view raises towards the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewEvent {
    NodeSelected(Option<String>),
    NodeHovered(Option<String>),
}

/// Scene work performed while pumping store notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reaction {
    Synced { summary: DiffSummary, action: LayoutAction },
    Filtered { relayout: bool },
    Searched { matches: usize },
    Highlighted { count: usize },
    Selected { id: Option<String> },
}

#[derive(Debug, Default)]
struct Pending {
    graph: bool,
    filter: bool,
    search: bool,
    highlight: bool,
    selection: bool,
    resync: bool,
}

impl Pending {
    fn everything() -> Self {
        Pending {
            graph: true,
            filter: true,
            search: true,
            highlight: true,
            selection: true,
            resync: true,
        }
    }
}

#[derive(Debug)]
pub struct GraphView<S: SceneSurface> {
    scene: S,
    config: ViewConfig,
    engine: DiffEngine,
    scheduler: LayoutScheduler,
    events: broadcast::Receiver<StoreEvent>,
    applied_rules: Option<StyleRules>,
}

impl<S: SceneSurface> GraphView<S> {
    /// Bind a scene to a store and bring it fully up to date.
    pub fn attach(scene: S, store: &mut GraphStore, config: ViewConfig) -> Self {
        let mut view = GraphView {
            scene,
            scheduler: LayoutScheduler::new(config.clone()),
            config,
            engine: DiffEngine::new(),
            events: store.subscribe(),
            applied_rules: None,
        };
        view.react(store, Pending::everything());
        view
    }

    pub fn scene(&self) -> &S {
        &self.scene
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    pub fn is_alive(&self) -> bool {
        self.scene.is_alive()
    }

    pub fn is_layout_running(&self) -> bool {
        self.scheduler.is_running()
    }

    /// Number of layout runs started on this view.
    pub fn layouts_started(&self) -> u64 {
        self.scheduler.started()
    }

    /// Process every store notification received since the last call.
    pub fn pump(&mut self, store: &mut GraphStore) -> Vec<Reaction> {
        let mut pending = Pending::default();
        loop {
            match self.events.try_recv() {
                Ok(StoreEvent::GraphReplaced { .. }) => pending.graph = true,
                Ok(StoreEvent::FilterChanged) => pending.filter = true,
                Ok(StoreEvent::SearchChanged) => pending.search = true,
                Ok(StoreEvent::HighlightChanged) => pending.highlight = true,
                Ok(StoreEvent::SelectionChanged) => pending.selection = true,
                Ok(StoreEvent::HoverChanged | StoreEvent::PositionsChanged) => {}
                Ok(StoreEvent::Reset) => pending = Pending::everything(),
                Err(TryRecvError::Lagged(missed)) => {
                    tracing::debug!("Missed {} store events, resynchronising", missed);
                    pending = Pending::everything();
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        self.react(store, pending)
    }

    fn react(&mut self, store: &mut GraphStore, pending: Pending) -> Vec<Reaction> {
        let mut reactions = Vec::new();
        if !self.scene.is_alive() {
            tracing::debug!("Ignoring store changes for disposed scene");
            return reactions;
        }

        let mut relayout = false;
        if pending.filter {
            let rules = store.overlay().style_rules();
            if self.applied_rules.as_ref() != Some(&rules) {
                let effect = apply_filter(&mut self.scene, &rules);
                self.applied_rules = Some(rules);
                relayout = effect.relayout;
                reactions.push(Reaction::Filtered { relayout });
            }
        }

        let mut synced = false;
        if pending.graph {
            if let Some(reaction) = self.sync_snapshot(store) {
                synced = true;
                reactions.push(reaction);
            }
        }

        if relayout && !self.scene.is_empty() && self.scheduler.relayout_visible(&mut self.scene).is_some() {
            self.save_positions(store);
        }

        // New elements need the current marks; empty inputs would only
        // clear marks that other overlays set.
        let overlay = store.overlay();
        if pending.search || (synced && !overlay.search_query.trim().is_empty()) {
            let matches = apply_search(&mut self.scene, &overlay.search_query);
            reactions.push(Reaction::Searched { matches });
        }
        // A resync has already cleared stale marks in the search pass; an
        // empty highlight set would only erase the search matches.
        let highlight = if pending.resync {
            !overlay.highlighted.is_empty()
        } else {
            pending.highlight || (synced && !overlay.highlighted.is_empty())
        };
        if highlight {
            apply_highlight(&mut self.scene, &overlay.highlighted);
            reactions.push(Reaction::Highlighted {
                count: overlay.highlighted.len(),
            });
        }
        if pending.selection || (synced && overlay.selected.is_some()) {
            apply_selection(&mut self.scene, overlay.selected.as_deref());
            reactions.push(Reaction::Selected {
                id: overlay.selected.clone(),
            });
        }

        reactions
    }

    fn sync_snapshot(&mut self, store: &mut GraphStore) -> Option<Reaction> {
        let snapshot = store.snapshot();
        let live = self.scene.ids();
        if live.is_empty() && snapshot.is_empty() {
            return None;
        }

        let edges = snapshot.renderable_edges();
        let diff = self.engine.compute_diff(&live, &snapshot.nodes, &edges);
        let action = plan(live.is_empty(), snapshot.is_empty(), &diff, store.positions());

        if action != LayoutAction::Clear {
            self.scene.apply_diff(&diff);
        }
        let settled = self.scheduler.execute(&mut self.scene, &action, store.positions());
        if settled {
            self.save_positions(store);
        }

        Some(Reaction::Synced {
            summary: diff.summary(),
            action,
        })
    }

    fn save_positions(&mut self, store: &mut GraphStore) {
        let mut cache = store.positions().clone();
        if cache.save(&self.scene) {
            store.set_node_positions(cache);
        }
    }

    /// Translate pointer input into store changes and an upward notification.
    pub fn handle_pointer(&mut self, store: &mut GraphStore, event: PointerEvent) -> Option<ViewEvent> {
        if !self.scene.is_alive() {
            tracing::debug!("Ignoring pointer event on disposed scene");
            return None;
        }
        match event {
            PointerEvent::Tap { node: Some(id) } => {
                self.scene.position(&id)?;
                store.select_node(Some(id.clone()));
                Some(ViewEvent::NodeSelected(Some(id)))
            }
            PointerEvent::Tap { node: None } => {
                store.select_node(None);
                Some(ViewEvent::NodeSelected(None))
            }
            PointerEvent::Over { node } => {
                self.scene.position(&node)?;
                store.hover_node(Some(node.clone()));
                Some(ViewEvent::NodeHovered(Some(node)))
            }
            PointerEvent::Out => {
                store.hover_node(None);
                Some(ViewEvent::NodeHovered(None))
            }
        }
    }

    /// Frame the displayed elements.
    pub fn fit(&mut self) {
        fit_scene(&mut self.scene, &self.config.viewport);
    }

    pub fn zoom_in(&mut self) {
        self.zoom_by(self.config.viewport.zoom_step);
    }

    pub fn zoom_out(&mut self) {
        self.zoom_by(1.0 / self.config.viewport.zoom_step);
    }

    fn zoom_by(&mut self, factor: f64) {
        if !self.scene.is_alive() {
            return;
        }
        let options = &self.config.viewport;
        let mut viewport = self.scene.viewport();
        viewport.zoom = (viewport.zoom * factor).clamp(options.min_zoom, options.max_zoom);
        self.scene.set_viewport(viewport);
    }

    /// Centre the viewport on a node. Returns false for unknown ids.
    pub fn center_on(&mut self, id: &str) -> bool {
        if !self.scene.is_alive() {
            return false;
        }
        let Some(point) = self.scene.position(id) else {
            return false;
        };
        let mut viewport = self.scene.viewport();
        viewport.center = point;
        viewport.zoom = self.config.viewport.center_zoom;
        self.scene.set_viewport(viewport);
        true
    }

    /// Start an animated layout, replacing any running one.
    pub fn run_layout(&mut self, kind: LayoutKind) -> Option<LayoutHandle> {
        self.scheduler.run_layout(&mut self.scene, kind)
    }

    /// Advance the running layout by one frame, saving positions once it settles.
    pub fn tick(&mut self, store: &mut GraphStore) -> TickOutcome {
        let outcome = self.scheduler.tick(&mut self.scene);
        if let TickOutcome::Finished(_) = outcome {
            self.save_positions(store);
        }
        outcome
    }

    /// Run the current layout to completion.
    pub fn settle(&mut self, store: &mut GraphStore) -> Option<LayoutHandle> {
        loop {
            match self.tick(store) {
                TickOutcome::Running(_) => {}
                TickOutcome::Finished(handle) => return Some(handle),
                TickOutcome::Idle => return None,
            }
        }
    }

    /// Move a node by hand and remember where it was put.
    pub fn drag_node(&mut self, store: &mut GraphStore, id: &str, point: Point) -> bool {
        if !self.scene.is_alive() || self.scene.position(id).is_none() {
            return false;
        }
        self.scene.set_position(id, point);
        self.save_positions(store);
        true
    }

    /// Ids of nodes currently selected in the scene.
    pub fn selected_ids(&self) -> HashSet<String> {
        self.scene
            .node_ids()
            .into_iter()
            .filter(|id| self.scene.is_selected(id))
            .collect()
    }

    /// Tear the scene down. Later calls are no-ops.
    pub fn dispose(&mut self) {
        self.scheduler.stop(&mut self.scene);
        self.scene.dispose();
        tracing::debug!("Graph view disposed");
    }
}
