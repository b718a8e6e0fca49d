//! Non-structural visual state: search, highlight, selection and type filters
//!
//! Nothing here adds or removes scene elements. The only layout interaction
//! is the one reported by [`apply_filter`]: in exclude mode the visible
//! subset needs a fresh layout.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::model::{EDGE_TYPES, NODE_TYPES};
use crate::scene::SceneSurface;

pub const NODE_OPACITY: f64 = 1.0;
pub const EDGE_OPACITY: f64 = 0.7;
pub const GHOST_NODE_OPACITY: f64 = 0.06;
pub const GHOST_EDGE_OPACITY: f64 = 0.04;

/// How hidden types are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    /// Dim in place; still part of the scene and of layouts.
    #[default]
    Ghost,
    /// Not rendered and not laid out.
    Exclude,
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterMode::Ghost => f.write_str("ghost"),
            FilterMode::Exclude => f.write_str("exclude"),
        }
    }
}

impl FromStr for FilterMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "ghost" => Ok(FilterMode::Ghost),
            "exclude" => Ok(FilterMode::Exclude),
            other => Err(format!("unknown filter mode '{other}' (expected ghost or exclude)")),
        }
    }
}

/// Presentation classes toggled on scene elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementClass {
    Faded,
    Highlighted,
}

/// Process-wide overlay inputs. Survives snapshot replacement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OverlayState {
    pub selected: Option<String>,
    pub hovered: Option<String>,
    pub highlighted: HashSet<String>,
    pub search_query: String,
    pub hidden_node_types: BTreeSet<String>,
    pub hidden_edge_types: BTreeSet<String>,
    pub filter_mode: FilterMode,
}

impl OverlayState {
    pub fn style_rules(&self) -> StyleRules {
        StyleRules {
            hidden_node_types: self.hidden_node_types.clone(),
            hidden_edge_types: self.hidden_edge_types.clone(),
            mode: self.filter_mode,
        }
    }
}

/// Resolved presentation of one element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Visibility {
    Shown { opacity: f64 },
    Ghosted { opacity: f64 },
    Excluded,
}

impl Visibility {
    pub fn is_displayed(&self) -> bool {
        !matches!(self, Visibility::Excluded)
    }

    pub fn opacity(&self) -> f64 {
        match self {
            Visibility::Shown { opacity } | Visibility::Ghosted { opacity } => *opacity,
            Visibility::Excluded => 0.0,
        }
    }
}

/// Per-type rule, as a renderer would install it.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeRule {
    pub is_node: bool,
    pub kind: &'static str,
    pub visibility: Visibility,
}

/// Type-keyed visibility rules derived from the filter state.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StyleRules {
    pub hidden_node_types: BTreeSet<String>,
    pub hidden_edge_types: BTreeSet<String>,
    pub mode: FilterMode,
}

impl StyleRules {
    pub fn node_visibility(&self, kind: &str) -> Visibility {
        self.resolve(self.hidden_node_types.contains(kind), NODE_OPACITY, GHOST_NODE_OPACITY)
    }

    pub fn edge_visibility(&self, kind: &str) -> Visibility {
        self.resolve(self.hidden_edge_types.contains(kind), EDGE_OPACITY, GHOST_EDGE_OPACITY)
    }

    /// Edge visibility taking its endpoints into account.
    ///
    /// An edge is only displayed while both endpoints are displayed, so in
    /// exclude mode hiding a node type also hides every edge touching it.
    pub fn edge_display(&self, kind: &str, source_kind: &str, target_kind: &str) -> Visibility {
        if !self.node_visibility(source_kind).is_displayed() || !self.node_visibility(target_kind).is_displayed() {
            return Visibility::Excluded;
        }
        self.edge_visibility(kind)
    }

    /// Rules for the known node and edge categories.
    pub fn type_rules(&self) -> Vec<TypeRule> {
        let nodes = NODE_TYPES.iter().map(|&kind| TypeRule {
            is_node: true,
            kind,
            visibility: self.node_visibility(kind),
        });
        let edges = EDGE_TYPES.iter().map(|&kind| TypeRule {
            is_node: false,
            kind,
            visibility: self.edge_visibility(kind),
        });
        nodes.chain(edges).collect()
    }

    fn resolve(&self, hidden: bool, opacity: f64, ghost_opacity: f64) -> Visibility {
        match (hidden, self.mode) {
            (false, _) => Visibility::Shown { opacity },
            (true, FilterMode::Ghost) => Visibility::Ghosted { opacity: ghost_opacity },
            (true, FilterMode::Exclude) => Visibility::Excluded,
        }
    }
}

/// Result of applying filter rules to a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FilterEffect {
    /// The visible subset should be laid out again.
    pub relayout: bool,
}

/// Fade everything except nodes matching `query` and their edges.
///
/// Matching is a case-insensitive substring test on label or id. A blank
/// query, or one matching nothing, leaves the scene unmarked. Returns the
/// number of matched nodes.
pub fn apply_search<S: SceneSurface + ?Sized>(scene: &mut S, query: &str) -> usize {
    if !scene.is_alive() {
        return 0;
    }

    let nodes = scene.node_ids();
    let edges = scene.edges();
    for id in nodes.iter().chain(edges.iter().map(|e| &e.id)) {
        scene.remove_class(id, ElementClass::Faded);
        scene.remove_class(id, ElementClass::Highlighted);
    }

    if query.trim().is_empty() {
        return 0;
    }

    let needle = query.to_lowercase();
    let matched: HashSet<&String> = nodes
        .iter()
        .filter(|id| {
            let label = scene
                .node_data(id)
                .and_then(|d| d.get("label"))
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_lowercase();
            label.contains(&needle) || id.to_lowercase().contains(&needle)
        })
        .collect();
    if matched.is_empty() {
        return 0;
    }

    for id in nodes.iter().chain(edges.iter().map(|e| &e.id)) {
        scene.add_class(id, ElementClass::Faded);
    }
    for id in &matched {
        scene.remove_class(id, ElementClass::Faded);
        scene.add_class(id, ElementClass::Highlighted);
    }
    for edge in &edges {
        if matched.contains(&edge.source) || matched.contains(&edge.target) {
            scene.remove_class(&edge.id, ElementClass::Faded);
        }
    }

    tracing::debug!("Search '{}' matched {} nodes", query, matched.len());
    matched.len()
}

/// Replace every highlight mark with exactly `ids`.
pub fn apply_highlight<S: SceneSurface + ?Sized>(scene: &mut S, ids: &HashSet<String>) {
    if !scene.is_alive() {
        return;
    }
    let nodes = scene.node_ids();
    let edges = scene.edges();
    for id in nodes.iter().chain(edges.iter().map(|e| &e.id)) {
        scene.remove_class(id, ElementClass::Highlighted);
    }
    for id in ids {
        scene.add_class(id, ElementClass::Highlighted);
    }
}

/// Select at most one node.
pub fn apply_selection<S: SceneSurface + ?Sized>(scene: &mut S, selected: Option<&str>) {
    if !scene.is_alive() {
        return;
    }
    for id in scene.node_ids() {
        scene.set_selected(&id, false);
    }
    if let Some(id) = selected {
        scene.set_selected(id, true);
    }
}

/// Install type rules; exclude mode asks for a re-layout of what remains.
pub fn apply_filter<S: SceneSurface + ?Sized>(scene: &mut S, rules: &StyleRules) -> FilterEffect {
    if !scene.is_alive() {
        return FilterEffect { relayout: false };
    }
    scene.apply_style(rules);
    tracing::debug!(
        mode = %rules.mode,
        hidden_nodes = rules.hidden_node_types.len(),
        hidden_edges = rules.hidden_edge_types.len(),
        "Applied filter rules"
    );
    FilterEffect {
        relayout: rules.mode == FilterMode::Exclude,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::{SceneIds, compute_diff};
    use crate::model::{GraphEdge, GraphNode};
    use crate::scene::MemoryScene;

    fn scene() -> MemoryScene {
        let nodes = vec![
            GraphNode::new("svc-checkout", "Service", "Checkout API"),
            GraphNode::new("svc-cart", "Service", "Cart"),
            GraphNode::new("db-orders", "Database", "Orders"),
        ];
        let edges = vec![
            GraphEdge::new("svc-checkout", "db-orders", "writes"),
            GraphEdge::new("svc-cart", "svc-checkout", "calls"),
            GraphEdge::new("svc-cart", "db-orders", "reads"),
        ];
        let mut scene = MemoryScene::new(800.0, 600.0);
        scene.apply_diff(&compute_diff(&SceneIds::default(), &nodes, &edges));
        scene
    }

    fn hidden(types: &[&str]) -> BTreeSet<String> {
        types.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_search_marks_matches_and_their_edges() {
        let mut scene = scene();
        assert_eq!(apply_search(&mut scene, "CHECKOUT"), 1);

        assert!(scene.has_class("svc-checkout", ElementClass::Highlighted));
        assert!(!scene.has_class("svc-checkout", ElementClass::Faded));
        assert!(scene.has_class("svc-cart", ElementClass::Faded));
        assert!(scene.has_class("db-orders", ElementClass::Faded));
        assert!(!scene.has_class("svc-checkout::db-orders::writes", ElementClass::Faded));
        assert!(!scene.has_class("svc-cart::svc-checkout::calls", ElementClass::Faded));
        assert!(scene.has_class("svc-cart::db-orders::reads", ElementClass::Faded));
    }

    #[test]
    fn test_search_matches_id() {
        let mut scene = scene();
        assert_eq!(apply_search(&mut scene, "db-"), 1);
        assert!(scene.has_class("db-orders", ElementClass::Highlighted));
    }

    #[test]
    fn test_blank_or_unmatched_search_clears_marks() {
        let mut scene = scene();
        apply_search(&mut scene, "cart");
        assert_eq!(apply_search(&mut scene, "   "), 0);
        assert!(!scene.has_class("db-orders", ElementClass::Faded));
        assert!(!scene.has_class("svc-cart", ElementClass::Highlighted));

        assert_eq!(apply_search(&mut scene, "nothing-like-this"), 0);
        assert!(!scene.has_class("db-orders", ElementClass::Faded));
    }

    #[test]
    fn test_highlight_replaces_previous_marks() {
        let mut scene = scene();
        apply_highlight(&mut scene, &HashSet::from(["svc-cart".to_string()]));
        apply_highlight(&mut scene, &HashSet::from(["db-orders".to_string(), "missing".to_string()]));
        assert!(!scene.has_class("svc-cart", ElementClass::Highlighted));
        assert!(scene.has_class("db-orders", ElementClass::Highlighted));
    }

    #[test]
    fn test_single_selection() {
        let mut scene = scene();
        apply_selection(&mut scene, Some("svc-cart"));
        apply_selection(&mut scene, Some("db-orders"));
        assert!(!scene.is_selected("svc-cart"));
        assert!(scene.is_selected("db-orders"));
        apply_selection(&mut scene, None);
        assert!(!scene.is_selected("db-orders"));
    }

    #[test]
    fn test_ghost_dims_without_relayout() {
        let mut scene = scene();
        let rules = StyleRules {
            hidden_node_types: hidden(&["Database"]),
            ..Default::default()
        };
        let effect = apply_filter(&mut scene, &rules);
        assert!(!effect.relayout);
        assert_eq!(scene.visibility("db-orders"), Visibility::Ghosted { opacity: GHOST_NODE_OPACITY });
        assert_eq!(scene.visibility("svc-cart"), Visibility::Shown { opacity: NODE_OPACITY });
        // Edges keep their own type's opacity in ghost mode.
        assert_eq!(scene.visibility("svc-cart::db-orders::reads"), Visibility::Shown { opacity: EDGE_OPACITY });
    }

    #[test]
    fn test_exclude_hides_induced_edges() {
        let mut scene = scene();
        let rules = StyleRules {
            hidden_node_types: hidden(&["Database"]),
            mode: FilterMode::Exclude,
            ..Default::default()
        };
        let effect = apply_filter(&mut scene, &rules);
        assert!(effect.relayout);
        assert!(!scene.is_displayed("db-orders"));
        assert!(!scene.is_displayed("svc-checkout::db-orders::writes"));
        assert!(!scene.is_displayed("svc-cart::db-orders::reads"));
        assert!(scene.is_displayed("svc-cart::svc-checkout::calls"));
    }

    #[test]
    fn test_hidden_edge_type() {
        let rules = StyleRules {
            hidden_edge_types: hidden(&["calls"]),
            mode: FilterMode::Exclude,
            ..Default::default()
        };
        assert_eq!(rules.edge_display("calls", "Service", "Service"), Visibility::Excluded);
        assert_eq!(rules.edge_display("reads", "Service", "Database"), Visibility::Shown { opacity: EDGE_OPACITY });
    }

    #[test]
    fn test_type_rules_cover_known_categories() {
        let rules = StyleRules {
            hidden_node_types: hidden(&["Pod"]),
            ..Default::default()
        };
        let table = rules.type_rules();
        assert_eq!(table.len(), NODE_TYPES.len() + EDGE_TYPES.len());
        let pod = table.iter().find(|r| r.is_node && r.kind == "Pod").unwrap();
        assert_eq!(pod.visibility.opacity(), GHOST_NODE_OPACITY);
    }

    #[test]
    fn test_filter_mode_parsing() {
        assert_eq!("Exclude".parse::<FilterMode>().unwrap(), FilterMode::Exclude);
        assert_eq!(FilterMode::Ghost.to_string(), "ghost");
        assert!("dim".parse::<FilterMode>().is_err());
    }
}
