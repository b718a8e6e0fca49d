//! Layout scheduling: deciding what a reconciliation pass needs, and running it
//!
//! [`plan`] is a pure decision over the diff and the position cache.
//! [`LayoutScheduler`] executes decisions against a scene and owns the single
//! in-flight layout. Starting a layout always discards the previous one.

use std::collections::{BTreeSet, HashSet};

use crate::config::ViewConfig;
use crate::diff::GraphDiff;
use crate::layout::{
    ForceLayout, ForceSettings, LayoutGraph, LayoutKind, circle_positions, grid_positions,
    place_beside_neighbours,
};
use crate::positions::PositionCache;
use crate::scene::{Point, SceneSurface, fit_scene};

/// What a reconciliation pass requires from layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LayoutAction {
    /// Target was empty: stop any layout and clear the scene.
    Clear,
    /// First population and every node has a cached coordinate.
    Restore,
    /// First population with nothing cached.
    FullLayout,
    /// Nodes in `restore` come back from the cache and stay fixed with the
    /// rest of the scene; only `place` is laid out.
    Scoped {
        restore: BTreeSet<String>,
        place: BTreeSet<String>,
        fit: bool,
    },
    /// Elements were removed: frame what is left.
    Refit,
    /// Attribute updates only.
    None,
}

impl LayoutAction {
    pub fn name(&self) -> &'static str {
        match self {
            LayoutAction::Clear => "clear",
            LayoutAction::Restore => "restore",
            LayoutAction::FullLayout => "full",
            LayoutAction::Scoped { .. } => "scoped",
            LayoutAction::Refit => "refit",
            LayoutAction::None => "none",
        }
    }
}

/// Decide the layout action for a diff.
///
/// `scene_was_empty` describes the scene before the diff was applied and
/// `target_is_empty` the snapshot the diff was computed against.
pub fn plan(scene_was_empty: bool, target_is_empty: bool, diff: &GraphDiff, cache: &PositionCache) -> LayoutAction {
    if target_is_empty {
        return LayoutAction::Clear;
    }

    let (restore, place): (BTreeSet<String>, BTreeSet<String>) =
        diff.new_node_ids.iter().cloned().partition(|id| cache.contains(id));

    if scene_was_empty {
        if place.is_empty() {
            return LayoutAction::Restore;
        }
        if restore.is_empty() {
            return LayoutAction::FullLayout;
        }
        return LayoutAction::Scoped {
            restore,
            place,
            fit: true,
        };
    }

    if !diff.new_node_ids.is_empty() {
        return LayoutAction::Scoped {
            restore,
            place,
            fit: false,
        };
    }
    if diff.has_removals() {
        return LayoutAction::Refit;
    }
    LayoutAction::None
}

/// Identifies one started layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayoutHandle(pub u64);

/// A layout to start.
///
/// Only displayed elements take part. With `place` set, every other
/// displayed node is pinned for the duration of the run.
#[derive(Debug, Clone, PartialEq)]
pub struct LayoutRequest {
    pub kind: LayoutKind,
    pub place: Option<BTreeSet<String>>,
    pub iterations: usize,
    pub animate: bool,
    pub fit: bool,
    /// Discard current coordinates of the laid-out nodes and seed afresh.
    pub fresh: bool,
}

impl LayoutRequest {
    pub fn force(iterations: usize) -> Self {
        LayoutRequest {
            kind: LayoutKind::Force,
            place: None,
            iterations,
            animate: false,
            fit: true,
            fresh: false,
        }
    }
}

/// Result of advancing the active layout by one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Idle,
    Running(LayoutHandle),
    /// The layout stabilized this frame; positions should be saved.
    Finished(LayoutHandle),
}

#[derive(Debug)]
enum Motion {
    Force(Box<ForceLayout>),
    Tween {
        from: Vec<(String, Point)>,
        to: Vec<(String, Point)>,
        frame: usize,
        frames: usize,
    },
}

#[derive(Debug)]
struct ActiveLayout {
    handle: LayoutHandle,
    motion: Motion,
    locked: Vec<String>,
    hidden: BTreeSet<String>,
    fit: bool,
}

/// Owner of the single current layout.
#[derive(Debug)]
pub struct LayoutScheduler {
    config: ViewConfig,
    next_handle: u64,
    active: Option<ActiveLayout>,
}

impl LayoutScheduler {
    pub fn new(config: ViewConfig) -> Self {
        LayoutScheduler {
            config,
            next_handle: 0,
            active: None,
        }
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.active.is_some()
    }

    pub fn current(&self) -> Option<LayoutHandle> {
        self.active.as_ref().map(|a| a.handle)
    }

    /// Number of layouts started so far.
    pub fn started(&self) -> u64 {
        self.next_handle
    }

    /// Discard the in-flight layout, if any, releasing the nodes it pinned.
    pub fn stop<S: SceneSurface + ?Sized>(&mut self, scene: &mut S) {
        let Some(active) = self.active.take() else {
            return;
        };
        tracing::debug!(handle = active.handle.0, "Stopped layout");
        if scene.is_alive() {
            for id in &active.locked {
                scene.set_locked(id, false);
            }
        }
    }

    /// Carry out a planned action. Returns true when the scene has settled
    /// and positions should be saved.
    pub fn execute<S: SceneSurface + ?Sized>(
        &mut self,
        scene: &mut S,
        action: &LayoutAction,
        cache: &PositionCache,
    ) -> bool {
        if !scene.is_alive() {
            tracing::debug!(action = action.name(), "Skipping layout action on disposed scene");
            self.active = None;
            return false;
        }
        tracing::debug!(action = action.name(), "Executing layout action");

        match action {
            LayoutAction::Clear => {
                self.stop(scene);
                if !scene.is_empty() {
                    scene.clear();
                }
                false
            }
            LayoutAction::Restore => {
                self.stop(scene);
                let restored = cache.restore(scene);
                tracing::debug!("Restored {} cached positions", restored);
                fit_scene(scene, &self.config.viewport);
                true
            }
            LayoutAction::FullLayout => {
                let request = LayoutRequest {
                    fresh: true,
                    ..LayoutRequest::force(self.config.layout.full_iterations)
                };
                self.start(scene, request);
                true
            }
            LayoutAction::Scoped { restore, place, fit } => {
                self.stop(scene);
                for id in restore {
                    if let Some(point) = cache.get(id) {
                        scene.set_position(id, point);
                    }
                }
                if place.is_empty() {
                    if *fit {
                        fit_scene(scene, &self.config.viewport);
                    }
                } else {
                    let request = LayoutRequest {
                        place: Some(place.clone()),
                        fit: *fit,
                        ..LayoutRequest::force(self.config.layout.incremental_iterations)
                    };
                    self.start(scene, request);
                }
                true
            }
            LayoutAction::Refit => {
                fit_scene(scene, &self.config.viewport);
                false
            }
            LayoutAction::None => false,
        }
    }

    /// Lay out the displayed elements again after an exclude filter change.
    pub fn relayout_visible<S: SceneSurface + ?Sized>(&mut self, scene: &mut S) -> Option<LayoutHandle> {
        let request = LayoutRequest::force(self.config.layout.exclude_iterations);
        self.start(scene, request)
    }

    /// Start a user-requested, animated layout of the displayed elements.
    pub fn run_layout<S: SceneSurface + ?Sized>(&mut self, scene: &mut S, kind: LayoutKind) -> Option<LayoutHandle> {
        let request = LayoutRequest {
            kind,
            animate: true,
            ..LayoutRequest::force(self.config.layout.full_iterations)
        };
        self.start(scene, request)
    }

    /// Start a layout, superseding the current one.
    ///
    /// Non-animated requests complete before returning. Returns `None` when
    /// the scene is disposed.
    pub fn start<S: SceneSurface + ?Sized>(&mut self, scene: &mut S, request: LayoutRequest) -> Option<LayoutHandle> {
        self.stop(scene);
        if !scene.is_alive() {
            tracing::debug!("Skipping layout on disposed scene");
            return None;
        }

        self.next_handle += 1;
        let handle = LayoutHandle(self.next_handle);

        let mut locked = Vec::new();
        if let Some(place) = &request.place {
            for id in scene.node_ids() {
                if !place.contains(&id) && !scene.is_locked(&id) && scene.is_displayed(&id) {
                    scene.set_locked(&id, true);
                    locked.push(id);
                }
            }
        }

        // Filtered-out nodes this layout was meant to place.
        let hidden: BTreeSet<String> = match (&request.place, request.fresh) {
            (Some(place), _) => place.iter().filter(|id| !scene.is_displayed(id)).cloned().collect(),
            (None, true) => scene.node_ids().into_iter().filter(|id| !scene.is_displayed(id)).collect(),
            (None, false) => BTreeSet::new(),
        };

        let graph = LayoutGraph::from_scene(scene, |id| scene.is_displayed(id));
        tracing::debug!(
            handle = handle.0,
            kind = %request.kind,
            nodes = graph.len(),
            pinned = locked.len(),
            iterations = request.iterations,
            animate = request.animate,
            "Starting layout"
        );

        let motion = match request.kind {
            LayoutKind::Force => {
                let seed: HashSet<String> = match (&request.place, request.fresh) {
                    (Some(place), _) => place.iter().cloned().collect(),
                    (None, true) => graph.ids().map(str::to_string).collect(),
                    (None, false) => HashSet::new(),
                };
                let settings = ForceSettings::from_config(&self.config.layout, request.iterations);
                let anchor = scene.viewport().center;
                Motion::Force(Box::new(ForceLayout::new(graph, settings, &seed, anchor)))
            }
            LayoutKind::Circle | LayoutKind::Grid => {
                let from: Vec<(String, Point)> =
                    graph.movable_positions().map(|(id, p)| (id.to_string(), p)).collect();
                let ids: Vec<String> = from.iter().map(|(id, _)| id.clone()).collect();
                let center = Point::centroid(from.iter().map(|(_, p)| *p)).unwrap_or(scene.viewport().center);
                let to = if request.kind == LayoutKind::Circle {
                    circle_positions(&ids, center)
                } else {
                    grid_positions(&ids, center)
                };
                Motion::Tween {
                    from,
                    to,
                    frame: 0,
                    frames: self.config.animation.tween_frames.max(1),
                }
            }
        };

        let mut active = ActiveLayout {
            handle,
            motion,
            locked,
            hidden,
            fit: request.fit,
        };

        if request.animate {
            self.active = Some(active);
            return Some(handle);
        }

        match &mut active.motion {
            Motion::Force(layout) => {
                layout.run();
                layout.graph().write_to(scene);
            }
            Motion::Tween { to, .. } => {
                for (id, point) in to.iter() {
                    scene.set_position(id, *point);
                }
            }
        }
        self.finish(scene, active);
        Some(handle)
    }

    /// Advance the animated layout by one frame.
    pub fn tick<S: SceneSurface + ?Sized>(&mut self, scene: &mut S) -> TickOutcome {
        let Some(mut active) = self.active.take() else {
            return TickOutcome::Idle;
        };
        if !scene.is_alive() {
            tracing::debug!(handle = active.handle.0, "Dropping layout of disposed scene");
            return TickOutcome::Idle;
        }

        let done = match &mut active.motion {
            Motion::Force(layout) => {
                let done = layout.step(self.config.animation.frame_iterations.max(1));
                layout.graph().write_to(scene);
                done
            }
            Motion::Tween { from, to, frame, frames } => {
                *frame += 1;
                let t = (*frame as f64 / *frames as f64).min(1.0);
                let eased = t * t * (3.0 - 2.0 * t);
                for ((id, a), (_, b)) in from.iter().zip(to.iter()) {
                    scene.set_position(id, Point::new(a.x + (b.x - a.x) * eased, a.y + (b.y - a.y) * eased));
                }
                *frame >= *frames
            }
        };

        let handle = active.handle;
        if done {
            self.finish(scene, active);
            TickOutcome::Finished(handle)
        } else {
            self.active = Some(active);
            TickOutcome::Running(handle)
        }
    }

    fn finish<S: SceneSurface + ?Sized>(&mut self, scene: &mut S, active: ActiveLayout) {
        for id in &active.locked {
            scene.set_locked(id, false);
        }
        if !active.hidden.is_empty() {
            let anchor = scene.viewport().center;
            place_beside_neighbours(scene, &active.hidden, anchor, self.config.layout.ideal_edge_length);
        }
        if active.fit {
            fit_scene(scene, &self.config.viewport);
        }
        tracing::debug!(handle = active.handle.0, "Layout finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{SceneIds, compute_diff};
    use crate::model::{GraphEdge, GraphNode};
    use crate::scene::MemoryScene;

    fn nodes(ids: &[&str]) -> Vec<GraphNode> {
        ids.iter().map(|id| GraphNode::new(*id, "Service", *id)).collect()
    }

    fn populate(scene: &mut MemoryScene, ids: &[&str], edges: &[GraphEdge]) -> GraphDiff {
        let diff = compute_diff(&scene.ids(), &nodes(ids), edges);
        scene.apply_diff(&diff);
        diff
    }

    fn small_config() -> ViewConfig {
        let mut config = ViewConfig::default();
        config.layout.full_iterations = 200;
        config.layout.incremental_iterations = 200;
        config.layout.exclude_iterations = 100;
        config.animation.frame_iterations = 50;
        config.animation.tween_frames = 4;
        config
    }

    #[test]
    fn test_plan_first_population() {
        let diff = compute_diff(&SceneIds::default(), &nodes(&["a", "b"]), &[]);
        assert_eq!(plan(true, false, &diff, &PositionCache::new()), LayoutAction::FullLayout);

        let all: PositionCache = [("a".to_string(), Point::ORIGIN), ("b".to_string(), Point::ORIGIN)]
            .into_iter()
            .collect();
        assert_eq!(plan(true, false, &diff, &all), LayoutAction::Restore);

        let some: PositionCache = [("a".to_string(), Point::ORIGIN)].into_iter().collect();
        assert_eq!(
            plan(true, false, &diff, &some),
            LayoutAction::Scoped {
                restore: BTreeSet::from(["a".to_string()]),
                place: BTreeSet::from(["b".to_string()]),
                fit: true,
            }
        );
    }

    #[test]
    fn test_plan_incremental_cases() {
        let live = SceneIds::new(["a", "b"], Vec::<String>::new());
        let cache = PositionCache::new();

        let grow = compute_diff(&live, &nodes(&["a", "b", "c"]), &[]);
        assert!(matches!(plan(false, false, &grow, &cache), LayoutAction::Scoped { fit: false, .. }));

        let shrink = compute_diff(&live, &nodes(&["a"]), &[]);
        assert_eq!(plan(false, false, &shrink, &cache), LayoutAction::Refit);

        let same = compute_diff(&live, &nodes(&["a", "b"]), &[]);
        assert_eq!(plan(false, false, &same, &cache), LayoutAction::None);

        let empty = compute_diff(&live, &[], &[]);
        assert_eq!(plan(false, true, &empty, &cache), LayoutAction::Clear);
    }

    #[test]
    fn test_scoped_layout_keeps_existing_nodes_fixed() {
        let mut scene = MemoryScene::new(800.0, 600.0);
        let mut scheduler = LayoutScheduler::new(small_config());
        let cache = PositionCache::new();

        let diff = populate(&mut scene, &["a", "b"], &[GraphEdge::new("a", "b", "calls")]);
        let action = plan(true, false, &diff, &cache);
        assert!(scheduler.execute(&mut scene, &action, &cache));
        let before = scene.positions();

        let edges = [GraphEdge::new("a", "b", "calls"), GraphEdge::new("b", "c", "calls")];
        let diff = populate(&mut scene, &["a", "b", "c"], &edges);
        let action = plan(false, false, &diff, &cache);
        assert!(scheduler.execute(&mut scene, &action, &cache));

        assert_eq!(scene.position("a"), before.get("a").copied());
        assert_eq!(scene.position("b"), before.get("b").copied());
        assert_ne!(scene.position("c"), Some(Point::ORIGIN));
        assert!(!scene.is_locked("a"));
        assert!(!scene.is_locked("b"));
    }

    #[test]
    fn test_new_layout_supersedes_running_one() {
        let mut scene = MemoryScene::new(800.0, 600.0);
        populate(&mut scene, &["a", "b", "c"], &[]);
        let mut scheduler = LayoutScheduler::new(small_config());

        let first = scheduler.run_layout(&mut scene, LayoutKind::Force).unwrap();
        assert_eq!(scheduler.tick(&mut scene), TickOutcome::Running(first));
        let second = scheduler.run_layout(&mut scene, LayoutKind::Grid).unwrap();
        assert_ne!(first, second);
        assert_eq!(scheduler.current(), Some(second));

        let mut outcome = TickOutcome::Idle;
        for _ in 0..4 {
            outcome = scheduler.tick(&mut scene);
        }
        assert_eq!(outcome, TickOutcome::Finished(second));
        assert!(!scheduler.is_running());
        assert_eq!(scheduler.tick(&mut scene), TickOutcome::Idle);
    }

    #[test]
    fn test_disposed_scene_is_never_touched() {
        let mut scene = MemoryScene::new(800.0, 600.0);
        populate(&mut scene, &["a", "b"], &[]);
        let mut scheduler = LayoutScheduler::new(small_config());
        scheduler.run_layout(&mut scene, LayoutKind::Circle).unwrap();

        scene.dispose();
        assert_eq!(scheduler.tick(&mut scene), TickOutcome::Idle);
        assert!(!scheduler.is_running());
        assert!(scheduler.run_layout(&mut scene, LayoutKind::Force).is_none());
        assert!(!scheduler.execute(&mut scene, &LayoutAction::FullLayout, &PositionCache::new()));
        assert_eq!(scene.position("a"), Some(Point::ORIGIN));
    }

    #[test]
    fn test_restore_uses_cache_without_layout() {
        let mut scene = MemoryScene::new(800.0, 600.0);
        let diff = populate(&mut scene, &["a", "b"], &[]);
        let cache: PositionCache = [
            ("a".to_string(), Point::new(10.0, 10.0)),
            ("b".to_string(), Point::new(50.0, 10.0)),
        ]
        .into_iter()
        .collect();
        let mut scheduler = LayoutScheduler::new(small_config());

        let action = plan(true, false, &diff, &cache);
        assert!(scheduler.execute(&mut scene, &action, &cache));
        assert_eq!(scheduler.started(), 0);
        assert_eq!(scene.position("b"), Some(Point::new(50.0, 10.0)));
        assert_eq!(scene.viewport().center, Point::new(30.0, 10.0));
    }
}
