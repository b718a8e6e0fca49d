//! Rendering-surface boundary and the headless in-memory scene

use std::collections::{BTreeSet, HashMap};

use serde::{Deserialize, Serialize};

use crate::adapter::{ElementData, SceneElement};
use crate::config::ViewportConfig;
use crate::diff::{GraphDiff, SceneIds};
use crate::overlay::{ElementClass, StyleRules, Visibility};

/// A 2D coordinate in model space.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const ORIGIN: Point = Point { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Point { x, y }
    }

    pub fn distance(&self, other: Point) -> f64 {
        ((self.x - other.x).powi(2) + (self.y - other.y).powi(2)).sqrt()
    }

    /// Centroid of a set of points, `None` when empty.
    pub fn centroid(points: impl IntoIterator<Item = Point>) -> Option<Point> {
        let (mut sx, mut sy, mut n) = (0.0, 0.0, 0usize);
        for p in points {
            sx += p.x;
            sy += p.y;
            n += 1;
        }
        (n > 0).then(|| Point::new(sx / n as f64, sy / n as f64))
    }
}

/// Axis-aligned bounding box in model space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Point,
    pub max: Point,
}

impl Bounds {
    pub fn of(points: impl IntoIterator<Item = Point>) -> Option<Bounds> {
        let mut iter = points.into_iter();
        let first = iter.next()?;
        let mut bounds = Bounds { min: first, max: first };
        for p in iter {
            bounds.min.x = bounds.min.x.min(p.x);
            bounds.min.y = bounds.min.y.min(p.y);
            bounds.max.x = bounds.max.x.max(p.x);
            bounds.max.y = bounds.max.y.max(p.y);
        }
        Some(bounds)
    }

    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    pub fn center(&self) -> Point {
        Point::new((self.min.x + self.max.x) / 2.0, (self.min.y + self.max.y) / 2.0)
    }
}

/// What part of model space the surface shows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Model coordinate shown at the centre of the surface.
    pub center: Point,
    pub zoom: f64,
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Viewport {
            center: Point::ORIGIN,
            zoom: 1.0,
            width,
            height,
        }
    }

    /// Frame `bounds` with `padding` screen pixels on each side.
    pub fn fit(&mut self, bounds: Bounds, options: &ViewportConfig) {
        let avail_w = (self.width - 2.0 * options.fit_padding).max(1.0);
        let avail_h = (self.height - 2.0 * options.fit_padding).max(1.0);
        let zoom = if bounds.width() <= f64::EPSILON && bounds.height() <= f64::EPSILON {
            options.max_zoom
        } else {
            let zx = if bounds.width() > f64::EPSILON { avail_w / bounds.width() } else { f64::INFINITY };
            let zy = if bounds.height() > f64::EPSILON { avail_h / bounds.height() } else { f64::INFINITY };
            zx.min(zy)
        };
        self.zoom = zoom.clamp(options.min_zoom, options.max_zoom);
        self.center = bounds.center();
    }
}

/// An edge as seen by layout code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SceneEdge {
    pub id: String,
    pub source: String,
    pub target: String,
}

/// The live, stateful rendered scene.
///
/// Structural changes only happen through [`SceneSurface::apply_diff`];
/// layouts write positions; overlays toggle classes, selection and style.
/// Callers check [`SceneSurface::is_alive`] before every mutation.
pub trait SceneSurface {
    fn is_alive(&self) -> bool;

    /// Tear the surface down. Every later mutation is a no-op.
    fn dispose(&mut self);

    fn ids(&self) -> SceneIds;

    fn is_empty(&self) -> bool {
        self.ids().is_empty()
    }

    /// Apply removals, updates and additions as one atomic batch.
    fn apply_diff(&mut self, diff: &GraphDiff);

    /// Remove every element in one batch.
    fn clear(&mut self) {
        let ids = self.ids();
        let mut diff = GraphDiff::new(0);
        diff.to_remove.extend(ids.nodes);
        diff.to_remove.extend(ids.edges);
        self.apply_diff(&diff);
    }

    fn node_data(&self, id: &str) -> Option<&ElementData>;

    fn edges(&self) -> Vec<SceneEdge>;

    fn position(&self, id: &str) -> Option<Point>;

    fn set_position(&mut self, id: &str, point: Point);

    fn set_locked(&mut self, id: &str, locked: bool);

    fn is_locked(&self, id: &str) -> bool;

    fn add_class(&mut self, id: &str, class: ElementClass);

    fn remove_class(&mut self, id: &str, class: ElementClass);

    fn has_class(&self, id: &str, class: ElementClass) -> bool;

    fn set_selected(&mut self, id: &str, selected: bool);

    fn is_selected(&self, id: &str) -> bool;

    fn apply_style(&mut self, rules: &StyleRules);

    /// Presentation state of a node or edge under the current style.
    fn visibility(&self, id: &str) -> Visibility;

    fn is_displayed(&self, id: &str) -> bool {
        self.visibility(id).is_displayed()
    }

    fn viewport(&self) -> Viewport;

    fn set_viewport(&mut self, viewport: Viewport);

    /// Sorted ids of every node in the scene.
    fn node_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.ids().nodes.into_iter().collect();
        ids.sort();
        ids
    }
}

/// Frame the displayed nodes, or all nodes when none are displayed.
pub fn fit_scene<S: SceneSurface + ?Sized>(scene: &mut S, options: &ViewportConfig) {
    if !scene.is_alive() {
        return;
    }
    let ids = scene.node_ids();
    let displayed: Vec<Point> = ids
        .iter()
        .filter(|id| scene.is_displayed(id))
        .filter_map(|id| scene.position(id))
        .collect();
    let bounds = if displayed.is_empty() {
        Bounds::of(ids.iter().filter_map(|id| scene.position(id)))
    } else {
        Bounds::of(displayed)
    };
    if let Some(bounds) = bounds {
        let mut viewport = scene.viewport();
        viewport.fit(bounds, options);
        scene.set_viewport(viewport);
    }
}

#[derive(Debug, Clone)]
struct NodeState {
    data: ElementData,
    position: Point,
    locked: bool,
    selected: bool,
    classes: BTreeSet<ElementClass>,
}

#[derive(Debug, Clone)]
struct EdgeState {
    data: ElementData,
    source: String,
    target: String,
    classes: BTreeSet<ElementClass>,
}

/// Headless scene used by the CLI and in tests.
#[derive(Debug)]
pub struct MemoryScene {
    nodes: HashMap<String, NodeState>,
    edges: HashMap<String, EdgeState>,
    style: StyleRules,
    viewport: Viewport,
    alive: bool,
    batches: usize,
}

impl MemoryScene {
    pub fn new(width: f64, height: f64) -> Self {
        MemoryScene {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            style: StyleRules::default(),
            viewport: Viewport::new(width, height),
            alive: true,
            batches: 0,
        }
    }

    pub fn from_config(config: &ViewportConfig) -> Self {
        Self::new(config.width, config.height)
    }

    /// Number of structural change notifications (one per batch).
    pub fn batch_count(&self) -> usize {
        self.batches
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn edge_data(&self, id: &str) -> Option<&ElementData> {
        self.edges.get(id).map(|e| &e.data)
    }

    pub fn style(&self) -> &StyleRules {
        &self.style
    }

    /// All node positions, keyed by id.
    pub fn positions(&self) -> HashMap<String, Point> {
        self.nodes.iter().map(|(id, n)| (id.clone(), n.position)).collect()
    }

    fn classes_mut(&mut self, id: &str) -> Option<&mut BTreeSet<ElementClass>> {
        if let Some(node) = self.nodes.get_mut(id) {
            return Some(&mut node.classes);
        }
        self.edges.get_mut(id).map(|e| &mut e.classes)
    }

    fn insert(&mut self, element: &SceneElement) {
        let id = element.id().to_string();
        if element.is_node() {
            self.nodes.insert(
                id,
                NodeState {
                    data: element.data.clone(),
                    position: Point::ORIGIN,
                    locked: false,
                    selected: false,
                    classes: BTreeSet::new(),
                },
            );
            return;
        }

        let (Some(source), Some(target)) = (element.source(), element.target()) else {
            tracing::debug!("Skipping edge {} without endpoints", id);
            return;
        };
        if !self.nodes.contains_key(source) || !self.nodes.contains_key(target) {
            tracing::debug!("Skipping edge {} with missing endpoint", id);
            return;
        }
        self.edges.insert(
            id,
            EdgeState {
                data: element.data.clone(),
                source: source.to_string(),
                target: target.to_string(),
                classes: BTreeSet::new(),
            },
        );
    }

    fn node_kind(&self, id: &str) -> Option<&str> {
        self.nodes
            .get(id)
            .and_then(|n| n.data.get("type"))
            .and_then(|v| v.as_str())
    }
}

impl SceneSurface for MemoryScene {
    fn is_alive(&self) -> bool {
        self.alive
    }

    fn dispose(&mut self) {
        self.alive = false;
    }

    fn ids(&self) -> SceneIds {
        SceneIds {
            nodes: self.nodes.keys().cloned().collect(),
            edges: self.edges.keys().cloned().collect(),
        }
    }

    fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    fn apply_diff(&mut self, diff: &GraphDiff) {
        if !self.alive {
            return;
        }

        for id in &diff.to_remove {
            if self.nodes.remove(id).is_some() {
                // Removing a node takes its connected edges with it.
                self.edges.retain(|_, e| e.source != *id && e.target != *id);
            } else {
                self.edges.remove(id);
            }
        }
        for update in &diff.node_updates {
            if let Some(node) = self.nodes.get_mut(&update.id) {
                node.data = update.data.clone();
            }
        }
        for update in &diff.edge_updates {
            if let Some(edge) = self.edges.get_mut(&update.id) {
                edge.data = update.data.clone();
            }
        }
        // Nodes come first in `to_add`, so edge endpoints already exist.
        for element in &diff.to_add {
            self.insert(element);
        }

        self.batches += 1;
    }

    fn node_data(&self, id: &str) -> Option<&ElementData> {
        self.nodes.get(id).map(|n| &n.data)
    }

    fn edges(&self) -> Vec<SceneEdge> {
        let mut edges: Vec<SceneEdge> = self
            .edges
            .iter()
            .map(|(id, e)| SceneEdge {
                id: id.clone(),
                source: e.source.clone(),
                target: e.target.clone(),
            })
            .collect();
        edges.sort_by(|a, b| a.id.cmp(&b.id));
        edges
    }

    fn position(&self, id: &str) -> Option<Point> {
        self.nodes.get(id).map(|n| n.position)
    }

    fn set_position(&mut self, id: &str, point: Point) {
        if !self.alive {
            return;
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.position = point;
        }
    }

    fn set_locked(&mut self, id: &str, locked: bool) {
        if !self.alive {
            return;
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.locked = locked;
        }
    }

    fn is_locked(&self, id: &str) -> bool {
        self.nodes.get(id).is_some_and(|n| n.locked)
    }

    fn add_class(&mut self, id: &str, class: ElementClass) {
        if !self.alive {
            return;
        }
        if let Some(classes) = self.classes_mut(id) {
            classes.insert(class);
        }
    }

    fn remove_class(&mut self, id: &str, class: ElementClass) {
        if !self.alive {
            return;
        }
        if let Some(classes) = self.classes_mut(id) {
            classes.remove(&class);
        }
    }

    fn has_class(&self, id: &str, class: ElementClass) -> bool {
        self.nodes
            .get(id)
            .map(|n| n.classes.contains(&class))
            .or_else(|| self.edges.get(id).map(|e| e.classes.contains(&class)))
            .unwrap_or(false)
    }

    fn set_selected(&mut self, id: &str, selected: bool) {
        if !self.alive {
            return;
        }
        if let Some(node) = self.nodes.get_mut(id) {
            node.selected = selected;
        }
    }

    fn is_selected(&self, id: &str) -> bool {
        self.nodes.get(id).is_some_and(|n| n.selected)
    }

    fn apply_style(&mut self, rules: &StyleRules) {
        if !self.alive {
            return;
        }
        self.style = rules.clone();
    }

    fn visibility(&self, id: &str) -> Visibility {
        if let Some(node) = self.nodes.get(id) {
            let kind = node.data.get("type").and_then(|v| v.as_str()).unwrap_or_default();
            return self.style.node_visibility(kind);
        }
        match self.edges.get(id) {
            Some(edge) => {
                let kind = edge.data.get("type").and_then(|v| v.as_str()).unwrap_or_default();
                self.style.edge_display(
                    kind,
                    self.node_kind(&edge.source).unwrap_or_default(),
                    self.node_kind(&edge.target).unwrap_or_default(),
                )
            }
            None => Visibility::Excluded,
        }
    }

    fn viewport(&self) -> Viewport {
        self.viewport
    }

    fn set_viewport(&mut self, viewport: Viewport) {
        if !self.alive {
            return;
        }
        self.viewport = viewport;
    }
}
