//! View configuration loaded from `topograph.toml`

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ViewError};

/// Config file looked up in the working root.
pub const CONFIG_FILE: &str = "topograph.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewConfig {
    pub layout: LayoutConfig,
    pub viewport: ViewportConfig,
    pub animation: AnimationConfig,
    /// Directory holding persisted view state, relative to the root.
    pub cache_dir: PathBuf,
}

/// Force-directed layout parameters and iteration budgets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutConfig {
    pub node_repulsion: f64,
    pub ideal_edge_length: f64,
    pub gravity: f64,
    /// First population and manual force layouts.
    pub full_iterations: usize,
    /// Placement of newly added nodes around a pinned scene.
    pub incremental_iterations: usize,
    /// Re-layout of the visible subset after an exclude filter change.
    pub exclude_iterations: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewportConfig {
    pub fit_padding: f64,
    pub min_zoom: f64,
    pub max_zoom: f64,
    pub zoom_step: f64,
    /// Zoom level used when centring on a node.
    pub center_zoom: f64,
    pub width: f64,
    pub height: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    /// Force iterations advanced per tick of an animated layout.
    pub frame_iterations: usize,
    /// Ticks used to move nodes into a circle or grid arrangement.
    pub tween_frames: usize,
}

impl Default for ViewConfig {
    fn default() -> Self {
        ViewConfig {
            layout: LayoutConfig::default(),
            viewport: ViewportConfig::default(),
            animation: AnimationConfig::default(),
            cache_dir: PathBuf::from(crate::positions::CACHE_DIR),
        }
    }
}

impl Default for LayoutConfig {
    fn default() -> Self {
        LayoutConfig {
            node_repulsion: 14000.0,
            ideal_edge_length: 90.0,
            gravity: 0.5,
            full_iterations: 1500,
            incremental_iterations: 1000,
            exclude_iterations: 500,
        }
    }
}

impl Default for ViewportConfig {
    fn default() -> Self {
        ViewportConfig {
            fit_padding: 40.0,
            min_zoom: 0.05,
            max_zoom: 6.0,
            zoom_step: 1.3,
            center_zoom: 1.5,
            width: 1200.0,
            height: 800.0,
        }
    }
}

impl Default for AnimationConfig {
    fn default() -> Self {
        AnimationConfig {
            frame_iterations: 50,
            tween_frames: 12,
        }
    }
}

impl ViewConfig {
    pub fn from_toml_str(text: &str, path: &Path) -> Result<Self> {
        toml::from_str(text).map_err(|source| ViewError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| ViewError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text, path)
    }

    /// Load `<root>/topograph.toml`, falling back to defaults when absent.
    pub fn load_or_default(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE);
        if !path.exists() {
            tracing::debug!("No {} in {}, using defaults", CONFIG_FILE, root.display());
            return Ok(Self::default());
        }
        let config = Self::load(&path)?;
        tracing::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Position file for this config under `root`.
    pub fn positions_path(&self, root: &Path) -> PathBuf {
        root.join(&self.cache_dir).join(crate::positions::POSITIONS_FILE)
    }
}
