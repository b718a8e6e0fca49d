//! Layout routines: force-directed with pinning, circle and grid
//!
//! Every routine is deterministic: nodes are processed in id order and
//! seeding uses fixed angles, so the same scene always lays out the same way.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::f64::consts::TAU;
use std::fmt;
use std::str::FromStr;

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::unionfind::UnionFind;
use petgraph::visit::EdgeRef;
use serde::{Deserialize, Serialize};

use crate::config::LayoutConfig;
use crate::scene::{Point, SceneSurface};

/// Golden angle, used to spread seeded nodes without collisions.
const GOLDEN_ANGLE: f64 = 2.399_963_229_728_653;
const SPRING_STIFFNESS: f64 = 0.05;
const GRAVITY_SCALE: f64 = 0.01;
const MIN_DISTANCE: f64 = 0.01;
/// Rendered node diameter used to space circle and grid arrangements.
const NODE_SPAN: f64 = 40.0;
const CIRCLE_SPACING: f64 = 0.55;
const GRID_SPACING: f64 = 0.8;

/// Manually selectable layout algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutKind {
    #[default]
    Force,
    Circle,
    Grid,
}

impl fmt::Display for LayoutKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LayoutKind::Force => "force",
            LayoutKind::Circle => "circle",
            LayoutKind::Grid => "grid",
        };
        f.write_str(name)
    }
}

impl FromStr for LayoutKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "force" | "cose" => Ok(LayoutKind::Force),
            "circle" => Ok(LayoutKind::Circle),
            "grid" => Ok(LayoutKind::Grid),
            other => Err(format!("unknown layout '{other}' (expected force, circle or grid)")),
        }
    }
}

/// Parameters of one force-directed run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForceSettings {
    pub node_repulsion: f64,
    pub ideal_edge_length: f64,
    pub gravity: f64,
    pub iterations: usize,
}

impl ForceSettings {
    pub fn from_config(config: &LayoutConfig, iterations: usize) -> Self {
        ForceSettings {
            node_repulsion: config.node_repulsion,
            ideal_edge_length: config.ideal_edge_length,
            gravity: config.gravity,
            iterations,
        }
    }
}

/// The nodes and edges a layout works on, with their pinned flags.
#[derive(Debug, Clone, Default)]
pub struct LayoutGraph {
    graph: UnGraph<String, ()>,
    index: HashMap<String, NodeIndex>,
    positions: Vec<Point>,
    pinned: Vec<bool>,
}

impl LayoutGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, id: impl Into<String>, position: Point, pinned: bool) -> NodeIndex {
        let id = id.into();
        if let Some(&idx) = self.index.get(&id) {
            return idx;
        }
        let idx = self.graph.add_node(id.clone());
        self.index.insert(id, idx);
        self.positions.push(position);
        self.pinned.push(pinned);
        idx
    }

    /// Connect two known nodes. Unknown endpoints and self loops are ignored.
    pub fn add_edge(&mut self, source: &str, target: &str) {
        if source == target {
            return;
        }
        if let (Some(&a), Some(&b)) = (self.index.get(source), self.index.get(target)) {
            self.graph.add_edge(a, b, ());
        }
    }

    /// Build from the scene nodes accepted by `include`; locked nodes are pinned.
    pub fn from_scene<S, F>(scene: &S, include: F) -> Self
    where
        S: SceneSurface + ?Sized,
        F: Fn(&str) -> bool,
    {
        let mut graph = LayoutGraph::new();
        for id in scene.node_ids() {
            if !include(&id) {
                continue;
            }
            let position = scene.position(&id).unwrap_or_default();
            let pinned = scene.is_locked(&id);
            graph.add_node(id, position, pinned);
        }
        for edge in scene.edges() {
            if include(&edge.id) {
                graph.add_edge(&edge.source, &edge.target);
            }
        }
        graph
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn position(&self, id: &str) -> Option<Point> {
        self.index.get(id).map(|idx| self.positions[idx.index()])
    }

    pub fn is_pinned(&self, id: &str) -> bool {
        self.index.get(id).is_some_and(|idx| self.pinned[idx.index()])
    }

    /// Ids in insertion (id) order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.graph.node_indices().map(move |idx| self.graph[idx].as_str())
    }

    /// Coordinates of nodes the layout is allowed to move.
    pub fn movable_positions(&self) -> impl Iterator<Item = (&str, Point)> {
        self.graph
            .node_indices()
            .filter(move |idx| !self.pinned[idx.index()])
            .map(move |idx| (self.graph[idx].as_str(), self.positions[idx.index()]))
    }

    /// Write the coordinates of movable nodes back to the scene.
    pub fn write_to<S: SceneSurface + ?Sized>(&self, scene: &mut S) {
        for (id, point) in self.movable_positions() {
            scene.set_position(id, point);
        }
    }

    /// Connected components, each listed in id order.
    fn components(&self) -> Vec<Vec<usize>> {
        let mut sets = UnionFind::<usize>::new(self.len());
        for edge in self.graph.edge_references() {
            sets.union(edge.source().index(), edge.target().index());
        }
        let mut by_root: HashMap<usize, Vec<usize>> = HashMap::new();
        let mut order = Vec::new();
        for i in 0..self.len() {
            let root = sets.find(i);
            by_root
                .entry(root)
                .or_insert_with(|| {
                    order.push(root);
                    Vec::new()
                })
                .push(i);
        }
        order.into_iter().filter_map(|root| by_root.remove(&root)).collect()
    }
}

/// Force-directed layout that only ever moves unpinned nodes.
///
/// Pinned nodes still repel and attract the nodes around them. Each
/// component is pulled towards an anchor: the centroid of its pinned nodes,
/// or the caller-supplied anchor when it has none.
#[derive(Debug, Clone)]
pub struct ForceLayout {
    graph: LayoutGraph,
    settings: ForceSettings,
    anchors: Vec<Point>,
    done: usize,
}

impl ForceLayout {
    /// Prepare a run. Nodes in `seed` get fresh starting coordinates; all
    /// others start where they are.
    pub fn new(graph: LayoutGraph, settings: ForceSettings, seed: &HashSet<String>, anchor: Point) -> Self {
        let mut layout = ForceLayout {
            anchors: vec![anchor; graph.len()],
            graph,
            settings,
            done: 0,
        };
        layout.assign_anchors(anchor);
        layout.seed(seed);
        layout
    }

    pub fn graph(&self) -> &LayoutGraph {
        &self.graph
    }

    pub fn is_finished(&self) -> bool {
        self.done >= self.settings.iterations
    }

    pub fn progress(&self) -> (usize, usize) {
        (self.done.min(self.settings.iterations), self.settings.iterations)
    }

    /// Advance up to `iterations` steps. Returns true once finished.
    pub fn step(&mut self, iterations: usize) -> bool {
        for _ in 0..iterations {
            if self.is_finished() {
                break;
            }
            self.iterate();
            self.done += 1;
        }
        self.is_finished()
    }

    /// Run the remaining iterations.
    pub fn run(&mut self) {
        let remaining = self.settings.iterations.saturating_sub(self.done);
        self.step(remaining);
    }

    fn assign_anchors(&mut self, anchor: Point) {
        for component in self.graph.components() {
            let pinned_centroid = Point::centroid(
                component
                    .iter()
                    .filter(|&&i| self.graph.pinned[i])
                    .map(|&i| self.graph.positions[i]),
            );
            let target = pinned_centroid.unwrap_or(anchor);
            for i in component {
                self.anchors[i] = target;
            }
        }
    }

    fn seed(&mut self, seed: &HashSet<String>) {
        let radius = self.settings.ideal_edge_length;
        let mut free_slot: HashMap<(u64, u64), usize> = HashMap::new();

        for idx in self.graph.graph.node_indices().collect::<Vec<_>>() {
            let i = idx.index();
            if self.graph.pinned[i] || !seed.contains(&self.graph.graph[idx]) {
                continue;
            }

            let pinned_neighbours = Point::centroid(
                self.graph
                    .graph
                    .neighbors(idx)
                    .filter(|n| self.graph.pinned[n.index()])
                    .map(|n| self.graph.positions[n.index()]),
            );

            // Slot counters are shared per anchor so siblings fan out.
            let base = pinned_neighbours.unwrap_or(self.anchors[i]);
            let key = (base.x.to_bits(), base.y.to_bits());
            let slot = free_slot.entry(key).or_insert(0);
            let angle = *slot as f64 * GOLDEN_ANGLE;
            let distance = if pinned_neighbours.is_some() {
                radius
            } else {
                radius * 0.5 * ((*slot + 1) as f64).sqrt()
            };
            *slot += 1;

            self.graph.positions[i] = Point::new(base.x + distance * angle.cos(), base.y + distance * angle.sin());
        }
    }

    fn iterate(&mut self) {
        let n = self.graph.len();
        let ForceSettings {
            node_repulsion,
            ideal_edge_length,
            gravity,
            iterations,
        } = self.settings;
        let cooling = 1.0 - self.done as f64 / iterations.max(1) as f64;
        let max_step = (ideal_edge_length * cooling).max(MIN_DISTANCE);
        let positions = &self.graph.positions;
        let pinned = &self.graph.pinned;

        let mut disp = vec![(0.0_f64, 0.0_f64); n];

        for i in 0..n {
            for j in (i + 1)..n {
                if pinned[i] && pinned[j] {
                    continue;
                }
                let (ux, uy, dist) = separation(positions[i], positions[j], i, j);
                let force = node_repulsion / (dist * dist);
                disp[i].0 += ux * force;
                disp[i].1 += uy * force;
                disp[j].0 -= ux * force;
                disp[j].1 -= uy * force;
            }
        }

        for edge in self.graph.graph.edge_references() {
            let (a, b) = (edge.source().index(), edge.target().index());
            let (ux, uy, dist) = separation(positions[b], positions[a], b, a);
            let force = SPRING_STIFFNESS * (dist - ideal_edge_length);
            disp[a].0 += ux * force;
            disp[a].1 += uy * force;
            disp[b].0 -= ux * force;
            disp[b].1 -= uy * force;
        }

        let mut next = positions.clone();
        for i in 0..n {
            if pinned[i] {
                continue;
            }
            let anchor = self.anchors[i];
            let (mut dx, mut dy) = disp[i];
            dx += (anchor.x - positions[i].x) * gravity * GRAVITY_SCALE;
            dy += (anchor.y - positions[i].y) * gravity * GRAVITY_SCALE;

            let len = (dx * dx + dy * dy).sqrt();
            if len > max_step {
                dx *= max_step / len;
                dy *= max_step / len;
            }
            next[i] = Point::new(positions[i].x + dx, positions[i].y + dy);
        }
        self.graph.positions = next;
    }
}

/// Unit vector from `b` to `a` and their distance, never zero.
fn separation(a: Point, b: Point, i: usize, j: usize) -> (f64, f64, f64) {
    let (dx, dy) = (a.x - b.x, a.y - b.y);
    let dist = (dx * dx + dy * dy).sqrt();
    if dist < MIN_DISTANCE {
        // Coincident nodes are pushed apart along a fixed per-pair direction.
        let angle = ((i * 31 + j * 17) as f64) * GOLDEN_ANGLE;
        return (angle.cos(), angle.sin(), MIN_DISTANCE);
    }
    (dx / dist, dy / dist, dist)
}

/// Put nodes a layout could not see (hidden by the filter) next to their
/// already placed neighbours, so they are in place once shown.
///
/// Nodes whose neighbours are all unplaced land around `anchor`.
pub fn place_beside_neighbours<S: SceneSurface + ?Sized>(scene: &mut S, ids: &BTreeSet<String>, anchor: Point, spacing: f64) {
    let edges = scene.edges();
    let mut unplaced: BTreeSet<String> = ids.clone();
    let mut slot = 0usize;

    while !unplaced.is_empty() {
        let mut progressed = false;
        for id in unplaced.clone() {
            let neighbours = edges.iter().filter_map(|e| {
                let other = if e.source == id {
                    &e.target
                } else if e.target == id {
                    &e.source
                } else {
                    return None;
                };
                if unplaced.contains(other) { None } else { scene.position(other) }
            });
            let Some(center) = Point::centroid(neighbours.collect::<Vec<_>>()) else {
                continue;
            };
            slot += 1;
            let angle = slot as f64 * GOLDEN_ANGLE;
            scene.set_position(&id, Point::new(center.x + spacing * angle.cos(), center.y + spacing * angle.sin()));
            unplaced.remove(&id);
            progressed = true;
        }

        if !progressed {
            for (i, id) in std::mem::take(&mut unplaced).into_iter().enumerate() {
                let radius = NODE_SPAN * ((i + 1) as f64).sqrt();
                let angle = (i + 1) as f64 * GOLDEN_ANGLE;
                scene.set_position(&id, Point::new(anchor.x + radius * angle.cos(), anchor.y + radius * angle.sin()));
            }
        }
    }
}

/// Target coordinates for a circle arrangement around `center`, in id order.
pub fn circle_positions(ids: &[String], center: Point) -> Vec<(String, Point)> {
    let n = ids.len();
    if n == 1 {
        return vec![(ids[0].clone(), center)];
    }
    let radius = (n as f64 * NODE_SPAN * 2.0 / TAU) * CIRCLE_SPACING;
    let radius = radius.max(NODE_SPAN);
    ids.iter()
        .enumerate()
        .map(|(i, id)| {
            let angle = TAU * i as f64 / n as f64;
            (id.clone(), Point::new(center.x + radius * angle.cos(), center.y + radius * angle.sin()))
        })
        .collect()
}

/// Target coordinates for a row-major grid centred on `center`, in id order.
pub fn grid_positions(ids: &[String], center: Point) -> Vec<(String, Point)> {
    let n = ids.len();
    if n == 0 {
        return Vec::new();
    }
    let cols = (n as f64).sqrt().ceil() as usize;
    let rows = n.div_ceil(cols);
    let cell = NODE_SPAN * 2.0 * GRID_SPACING;
    let origin_x = center.x - (cols - 1) as f64 * cell / 2.0;
    let origin_y = center.y - (rows - 1) as f64 * cell / 2.0;
    ids.iter()
        .enumerate()
        .map(|(i, id)| {
            let (row, col) = (i / cols, i % cols);
            (id.clone(), Point::new(origin_x + col as f64 * cell, origin_y + row as f64 * cell))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(iterations: usize) -> ForceSettings {
        ForceSettings::from_config(&LayoutConfig::default(), iterations)
    }

    fn chain(ids: &[&str], pinned: bool) -> LayoutGraph {
        let mut graph = LayoutGraph::new();
        for (i, id) in ids.iter().enumerate() {
            graph.add_node(*id, Point::new(i as f64 * 100.0, 0.0), pinned);
        }
        for pair in ids.windows(2) {
            graph.add_edge(pair[0], pair[1]);
        }
        graph
    }

    fn seed_all(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_pinned_nodes_never_move() {
        let mut graph = chain(&["a", "b", "c"], true);
        graph.add_node("d", Point::ORIGIN, false);
        graph.add_edge("c", "d");

        let mut layout = ForceLayout::new(graph, settings(300), &seed_all(&["d"]), Point::ORIGIN);
        layout.run();
        let graph = layout.graph();

        assert_eq!(graph.position("a"), Some(Point::new(0.0, 0.0)));
        assert_eq!(graph.position("b"), Some(Point::new(100.0, 0.0)));
        assert_eq!(graph.position("c"), Some(Point::new(200.0, 0.0)));
        let d = graph.position("d").unwrap();
        let dist = d.distance(Point::new(200.0, 0.0));
        assert!(dist > 30.0 && dist < 250.0, "d landed {dist} away from c");
    }

    #[test]
    fn test_coincident_nodes_separate() {
        let mut graph = LayoutGraph::new();
        for id in ["a", "b", "c"] {
            graph.add_node(id, Point::ORIGIN, false);
        }
        graph.add_edge("a", "b");
        graph.add_edge("b", "c");
        let mut layout = ForceLayout::new(graph, settings(500), &HashSet::new(), Point::ORIGIN);
        layout.run();

        let g = layout.graph();
        let (a, b, c) = (g.position("a").unwrap(), g.position("b").unwrap(), g.position("c").unwrap());
        assert!(a.distance(b) > 20.0);
        assert!(b.distance(c) > 20.0);
        assert!(a.distance(c) > 20.0);
    }

    #[test]
    fn test_force_layout_is_deterministic() {
        let run = || {
            let mut graph = chain(&["a", "b", "c", "d"], false);
            graph.add_edge("a", "d");
            let mut layout = ForceLayout::new(graph, settings(200), &seed_all(&["a", "b", "c", "d"]), Point::ORIGIN);
            layout.run();
            layout.graph().movable_positions().map(|(id, p)| (id.to_string(), p)).collect::<Vec<_>>()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_disconnected_new_component_anchors_at_given_point() {
        let mut graph = chain(&["a", "b"], true);
        graph.add_node("x", Point::ORIGIN, false);
        graph.add_node("y", Point::ORIGIN, false);
        graph.add_edge("x", "y");

        let anchor = Point::new(1000.0, 1000.0);
        let mut layout = ForceLayout::new(graph, settings(400), &seed_all(&["x", "y"]), anchor);
        layout.run();
        let g = layout.graph();
        let centroid = Point::centroid([g.position("x").unwrap(), g.position("y").unwrap()]).unwrap();
        assert!(centroid.distance(anchor) < 100.0, "component centred at {centroid:?}");
    }

    #[test]
    fn test_step_reports_progress() {
        let graph = chain(&["a", "b"], false);
        let mut layout = ForceLayout::new(graph, settings(10), &HashSet::new(), Point::ORIGIN);
        assert!(!layout.step(4));
        assert_eq!(layout.progress(), (4, 10));
        assert!(layout.step(100));
        assert!(layout.is_finished());
    }

    #[test]
    fn test_from_scene_pins_locked_nodes() {
        use crate::diff::{SceneIds, compute_diff};
        use crate::model::{GraphEdge, GraphNode};
        use crate::scene::MemoryScene;

        let nodes = vec![GraphNode::new("a", "Service", "A"), GraphNode::new("b", "Service", "B")];
        let edges = vec![GraphEdge::new("a", "b", "calls")];
        let mut scene = MemoryScene::new(800.0, 600.0);
        scene.apply_diff(&compute_diff(&SceneIds::default(), &nodes, &edges));
        scene.set_locked("a", true);

        let graph = LayoutGraph::from_scene(&scene, |_| true);
        assert_eq!(graph.len(), 2);
        assert!(graph.is_pinned("a"));
        assert!(!graph.is_pinned("b"));
        assert_eq!(graph.ids().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn test_place_beside_neighbours() {
        use crate::diff::{SceneIds, compute_diff};
        use crate::model::{GraphEdge, GraphNode};
        use crate::scene::MemoryScene;

        let nodes = vec![
            GraphNode::new("a", "Service", "A"),
            GraphNode::new("b", "Cache", "B"),
            GraphNode::new("c", "Cache", "C"),
            GraphNode::new("x", "Cache", "X"),
        ];
        let edges = vec![GraphEdge::new("a", "b", "reads"), GraphEdge::new("b", "c", "reads")];
        let mut scene = MemoryScene::new(800.0, 600.0);
        scene.apply_diff(&compute_diff(&SceneIds::default(), &nodes, &edges));
        scene.set_position("a", Point::new(500.0, 500.0));

        let ids: BTreeSet<String> = ["b", "c", "x"].iter().map(|s| s.to_string()).collect();
        let anchor = Point::new(-300.0, 0.0);
        place_beside_neighbours(&mut scene, &ids, anchor, 90.0);

        let a = scene.position("a").unwrap();
        let b = scene.position("b").unwrap();
        let c = scene.position("c").unwrap();
        assert!((b.distance(a) - 90.0).abs() < 1e-9);
        assert!((c.distance(b) - 90.0).abs() < 1e-9);
        assert!(scene.position("x").unwrap().distance(anchor) < 100.0);
        assert_eq!(scene.position("a").unwrap(), Point::new(500.0, 500.0));
    }

    #[test]
    fn test_grid_and_circle_shapes() {
        let ids: Vec<String> = ["a", "b", "c", "d", "e"].iter().map(|s| s.to_string()).collect();
        let grid = grid_positions(&ids, Point::ORIGIN);
        assert_eq!(grid[0].1.y, grid[2].1.y);
        assert!(grid[3].1.y > grid[0].1.y);

        let circle = circle_positions(&ids, Point::new(10.0, 10.0));
        let radius = circle[0].1.distance(Point::new(10.0, 10.0));
        for (_, p) in &circle {
            assert!((p.distance(Point::new(10.0, 10.0)) - radius).abs() < 1e-9);
        }
        assert_eq!(circle_positions(&ids[..1], Point::ORIGIN)[0].1, Point::ORIGIN);
    }

    #[test]
    fn test_layout_kind_parsing() {
        assert_eq!("cose".parse::<LayoutKind>().unwrap(), LayoutKind::Force);
        assert_eq!("Grid".parse::<LayoutKind>().unwrap(), LayoutKind::Grid);
        assert!("spiral".parse::<LayoutKind>().is_err());
    }
}
