//! Topograph Core: snapshot model, scene reconciliation, layout scheduling and overlays

pub mod error;
pub mod model;
pub mod adapter;
pub mod diff;
pub mod scene;
pub mod layout;
pub mod scheduler;
pub mod positions;
pub mod overlay;
pub mod store;
pub mod view;
pub mod config;


#[cfg(test)]
pub mod test_utils;

pub use error::{Result, ViewError};
pub use model::{GraphNode, GraphEdge, Snapshot, Properties, edge_scene_id, filter_dangling_edges};
pub use adapter::{ElementGroup, SceneElement, to_scene_elements};
pub use diff::{DiffEngine, DiffSummary, GraphDiff, SceneIds, compute_diff};
pub use scene::{MemoryScene, Point, SceneSurface, Viewport};
pub use layout::LayoutKind;
pub use scheduler::{LayoutAction, LayoutHandle, LayoutScheduler, TickOutcome, plan};
pub use positions::{CACHE_DIR, POSITIONS_FILE, PositionCache, cache_dir, positions_path};
pub use overlay::{ElementClass, FilterMode, OverlayState, StyleRules, Visibility};
pub use store::{GraphStore, StoreEvent};
pub use view::{GraphView, PointerEvent, Reaction, ViewEvent};
pub use config::ViewConfig;
