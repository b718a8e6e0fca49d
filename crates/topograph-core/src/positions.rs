//! Node position cache and its on-disk persistence

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, ViewError};
use crate::scene::{Point, SceneSurface};

/// Cache directory: .topograph/
pub const CACHE_DIR: &str = ".topograph";

/// Position cache file
pub const POSITIONS_FILE: &str = "positions.json";

/// Get cache directory path
pub fn cache_dir(root: &Path) -> PathBuf {
    root.join(CACHE_DIR)
}

/// Get position cache file path
pub fn positions_path(root: &Path) -> PathBuf {
    root.join(CACHE_DIR).join(POSITIONS_FILE)
}

/// Last stabilized coordinate of each node, keyed by node id.
///
/// Serializes as a plain `{id: {x, y}}` record. Entries survive snapshot
/// replacement; only [`PositionCache::clear`] drops them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositionCache {
    entries: BTreeMap<String, Point>,
}

impl PositionCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, id: &str) -> Option<Point> {
        self.entries.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn insert(&mut self, id: impl Into<String>, point: Point) {
        self.entries.insert(id.into(), point);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Point)> {
        self.entries.iter().map(|(id, p)| (id.as_str(), *p))
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Record the current coordinate of every live node, overwriting prior
    /// entries. Returns false when the surface is gone.
    pub fn save<S: SceneSurface + ?Sized>(&mut self, scene: &S) -> bool {
        if !scene.is_alive() {
            tracing::debug!("Skipping position save on disposed scene");
            return false;
        }
        for id in scene.node_ids() {
            if let Some(point) = scene.position(&id) {
                self.entries.insert(id, point);
            }
        }
        true
    }

    /// Move every node with an entry to its cached coordinate.
    /// Returns the number of restored nodes.
    pub fn restore<S: SceneSurface + ?Sized>(&self, scene: &mut S) -> usize {
        if !scene.is_alive() {
            return 0;
        }
        let mut restored = 0;
        for id in scene.node_ids() {
            if let Some(point) = self.get(&id) {
                scene.set_position(&id, point);
                restored += 1;
            }
        }
        restored
    }

    /// Load a position file. A missing file is an empty cache.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::new());
        }
        let text = std::fs::read_to_string(path).map_err(|source| ViewError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let cache: Self =
            serde_json::from_str(&text).map_err(|e| ViewError::json(path.display().to_string(), e))?;
        tracing::debug!("Loaded {} cached positions from {}", cache.len(), path.display());
        Ok(cache)
    }

    /// Write the cache to `path`, creating parent directories.
    pub fn persist(&self, path: &Path) -> Result<()> {
        let write_err = |source| ViewError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent).map_err(write_err)?;
            }
        }
        let json = serde_json::to_string_pretty(self).map_err(|e| ViewError::json("position cache", e))?;
        std::fs::write(path, json).map_err(write_err)?;
        tracing::debug!("Persisted {} positions to {}", self.len(), path.display());
        Ok(())
    }

    /// Delete a persisted position file, if any.
    pub fn remove_file(path: &Path) -> Result<()> {
        if path.exists() {
            std::fs::remove_file(path).map_err(|source| ViewError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        }
        Ok(())
    }
}

impl FromIterator<(String, Point)> for PositionCache {
    fn from_iter<T: IntoIterator<Item = (String, Point)>>(iter: T) -> Self {
        PositionCache {
            entries: iter.into_iter().collect(),
        }
    }
}
