//! On-disk tile store with an in-memory state map.
//!
//! Layout mirrors the URL structure: `{root}/{layer}/{z}/{x}/{y}.{ext}`,
//! with time-enabled overlays adding `{basetime}/{validtime}` between the
//! layer and the zoom. A zero-byte file is the negative cache: the server
//! said 404 and asking again is pointless until the cache is swept.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::error::TileError;
use crate::tiles::LayerConfig;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileKey {
    pub layer: String,
    pub z: u8,
    pub x: i64,
    pub y: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileState {
    /// Not cached and nobody is fetching it.
    Absent,
    /// A download is underway.
    InFlight,
    /// Cached on disk.
    Present,
    /// The server has no such tile; cached negatively.
    NotFound,
    /// The last fetch failed; eligible for retry.
    Error,
}

#[derive(Clone)]
pub struct TileCache {
    root: PathBuf,
    states: Arc<RwLock<HashMap<TileKey, TileState>>>,
}

impl TileCache {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            states: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tile_path(&self, layer: &LayerConfig, z: u8, x: i64, y: i64) -> PathBuf {
        let mut path = self.root.join(&layer.name);
        if let (Some(bt), Some(vt)) = (&layer.basetime, &layer.validtime) {
            path = path.join(bt).join(vt);
        }
        path.join(z.to_string())
            .join(x.to_string())
            .join(format!("{y}.{}", layer.tile_ext()))
    }

    pub fn key(layer: &LayerConfig, z: u8, x: i64, y: i64) -> TileKey {
        TileKey {
            layer: layer.name.clone(),
            z,
            x,
            y,
        }
    }

    /// Current state, consulting the disk on a cold map entry.
    pub fn state(&self, layer: &LayerConfig, z: u8, x: i64, y: i64) -> TileState {
        let key = Self::key(layer, z, x, y);
        if let Some(&s) = self.states.read().get(&key) {
            return s;
        }
        let state = match std::fs::metadata(self.tile_path(layer, z, x, y)) {
            Ok(meta) if meta.len() == 0 => TileState::NotFound,
            Ok(_) => TileState::Present,
            Err(_) => TileState::Absent,
        };
        if state != TileState::Absent {
            self.states.write().insert(key, state);
        }
        state
    }

    /// Claim a tile for download. Returns false when it is already being
    /// fetched or already resolved.
    pub fn mark_in_flight(&self, layer: &LayerConfig, z: u8, x: i64, y: i64) -> bool {
        match self.state(layer, z, x, y) {
            TileState::Absent | TileState::Error => {
                self.states
                    .write()
                    .insert(Self::key(layer, z, x, y), TileState::InFlight);
                true
            }
            _ => false,
        }
    }

    /// Persist a downloaded tile atomically.
    pub fn store(
        &self,
        layer: &LayerConfig,
        z: u8,
        x: i64,
        y: i64,
        bytes: &[u8],
    ) -> Result<(), TileError> {
        let path = self.tile_path(layer, z, x, y);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let tmp = path.with_extension("part");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &path)?;
        self.states
            .write()
            .insert(Self::key(layer, z, x, y), TileState::Present);
        debug!(layer = %layer.name, z, x, y, bytes = bytes.len(), "tile stored");
        Ok(())
    }

    /// Record a server-side 404 as a zero-byte sentinel.
    pub fn store_not_found(
        &self,
        layer: &LayerConfig,
        z: u8,
        x: i64,
        y: i64,
    ) -> Result<(), TileError> {
        let path = self.tile_path(layer, z, x, y);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&path, [])?;
        self.states
            .write()
            .insert(Self::key(layer, z, x, y), TileState::NotFound);
        Ok(())
    }

    pub fn mark_error(&self, layer: &LayerConfig, z: u8, x: i64, y: i64) {
        self.states
            .write()
            .insert(Self::key(layer, z, x, y), TileState::Error);
    }

    /// Drop the in-memory states of one layer, forcing disk re-checks.
    pub fn forget_layer(&self, name: &str) {
        self.states.write().retain(|k, _| k.layer != name);
    }

    /// Delete cached frames of a time-enabled overlay whose basetime is no
    /// longer current.
    pub fn sweep_overlay(&self, layer: &LayerConfig) -> Result<(), TileError> {
        let Some(current) = &layer.basetime else {
            return Ok(());
        };
        let dir = self.root.join(&layer.name);
        let entries = match std::fs::read_dir(&dir) {
            Ok(e) => e,
            Err(_) => return Ok(()),
        };
        for entry in entries.flatten() {
            if !entry.path().is_dir() {
                continue;
            }
            if entry.file_name().to_string_lossy() != current.as_str() {
                if let Err(e) = std::fs::remove_dir_all(entry.path()) {
                    warn!(path = %entry.path().display(), error = %e, "overlay sweep failed");
                }
            }
        }
        self.forget_layer(&layer.name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layer() -> LayerConfig {
        LayerConfig {
            name: "osm".into(),
            url: "https://tile.example.com/{z}/{x}/{y}.png".into(),
            ..LayerConfig::default()
        }
    }

    #[test]
    fn stored_tiles_are_present() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TileCache::new(dir.path());
        let l = layer();
        assert_eq!(cache.state(&l, 10, 5, 7), TileState::Absent);
        cache.store(&l, 10, 5, 7, b"png bytes").unwrap();
        assert_eq!(cache.state(&l, 10, 5, 7), TileState::Present);
        assert!(cache.tile_path(&l, 10, 5, 7).ends_with("osm/10/5/7.png"));
    }

    #[test]
    fn zero_byte_file_is_the_negative_cache() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TileCache::new(dir.path());
        let l = layer();
        cache.store_not_found(&l, 10, 5, 7).unwrap();
        assert_eq!(cache.state(&l, 10, 5, 7), TileState::NotFound);
        // a fresh cache instance learns it from the disk
        let cold = TileCache::new(dir.path());
        assert_eq!(cold.state(&l, 10, 5, 7), TileState::NotFound);
    }

    #[test]
    fn in_flight_claims_are_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TileCache::new(dir.path());
        let l = layer();
        assert!(cache.mark_in_flight(&l, 10, 5, 7));
        assert!(!cache.mark_in_flight(&l, 10, 5, 7));
        // a failed fetch frees the claim
        cache.mark_error(&l, 10, 5, 7);
        assert!(cache.mark_in_flight(&l, 10, 5, 7));
    }

    #[test]
    fn overlay_sweep_removes_stale_basetimes() {
        let dir = tempfile::tempdir().unwrap();
        let cache = TileCache::new(dir.path());
        let mut l = LayerConfig {
            name: "radar".into(),
            url: "https://radar.example.com/{basetime}/{validtime}/{z}/{x}/{y}.png".into(),
            basetime: Some("stale".into()),
            validtime: Some("stale".into()),
            ..LayerConfig::default()
        };
        cache.store(&l, 8, 1, 1, b"old frame").unwrap();
        l.basetime = Some("fresh".into());
        l.validtime = Some("fresh".into());
        cache.store(&l, 8, 1, 1, b"new frame").unwrap();
        cache.sweep_overlay(&l).unwrap();
        assert!(!dir.path().join("radar/stale").exists());
        assert!(dir.path().join("radar/fresh").exists());
    }
}
