//! Runtime settings.
//!
//! Every field has a default, so a missing or partial TOML file still yields a
//! working configuration. The defaults mirror the tuning the device ships
//! with; units are part of the field names where they matter.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// A named climb category with its minimum volume (distance_m * grade_pct).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClimbCategory {
    pub name: String,
    pub volume: f64,
}

/// Course loading and indexing parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CourseConfig {
    /// Maximum perpendicular distance from a GPS fix to the polyline that
    /// still counts as on-course [m].
    pub on_route_cutoff_m: f64,
    /// How far ahead/behind the current index the indexer scans [km].
    /// Widened automatically for sparse courses.
    pub search_range_km: f64,
    /// Half-width of the accepted heading window around the segment
    /// azimuth [deg].
    pub azimuth_cutoff_deg: f64,
    /// Consecutive ticks a penalised candidate must be observed before the
    /// index is allowed to jump.
    pub keep_on_course_cutoff: usize,
    /// Minimum length of a climb segment [km].
    pub climb_distance_cutoff_km: f64,
    /// Minimum average grade of a climb segment [%].
    pub climb_grade_cutoff_pct: f64,
    /// Slope bucket upper bounds [%]; the last entry is unbounded.
    pub slope_cutoff_pct: Vec<f64>,
    /// Climb categories, smallest volume first.
    pub climb_categories: Vec<ClimbCategory>,
    /// Optional course file loaded at startup.
    pub course_file: Option<PathBuf>,
}

impl Default for CourseConfig {
    fn default() -> Self {
        Self {
            on_route_cutoff_m: 50.0,
            search_range_km: 6.0,
            azimuth_cutoff_deg: 60.0,
            keep_on_course_cutoff: 60,
            climb_distance_cutoff_km: 0.3,
            climb_grade_cutoff_pct: 2.0,
            slope_cutoff_pct: vec![1.0, 3.0, 6.0, 9.0, 12.0, f64::INFINITY],
            climb_categories: vec![
                ClimbCategory { name: "Cat4".into(), volume: 8000.0 },
                ClimbCategory { name: "Cat3".into(), volume: 16000.0 },
                ClimbCategory { name: "Cat2".into(), volume: 32000.0 },
                ClimbCategory { name: "Cat1".into(), volume: 64000.0 },
                ClimbCategory { name: "HC".into(), volume: 80000.0 },
            ],
            course_file: None,
        }
    }
}

/// Which metrics count zero samples toward their averages.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AveragingConfig {
    pub cadence_includes_zero: bool,
    pub power_includes_zero: bool,
}

impl Default for AveragingConfig {
    fn default() -> Self {
        Self {
            cadence_includes_zero: false,
            power_includes_zero: true,
        }
    }
}

/// Recorder parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    /// Logging tick interval [s].
    pub interval_secs: u64,
    pub averaging: AveragingConfig,
    /// Directory holding the log database and exported activities.
    pub log_dir: PathBuf,
    /// Unit serial number written into the FIT file_id message.
    pub unit_id: u32,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            interval_secs: 1,
            averaging: AveragingConfig::default(),
            log_dir: PathBuf::from("log"),
            unit_id: 0x12345678,
        }
    }
}

/// Tile cache and fetcher parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TileConfig {
    /// Root directory of the on-disk tile store.
    pub cache_dir: PathBuf,
    /// Concurrent downloads per batch on a normal uplink.
    pub batch_concurrency: usize,
    /// Concurrent downloads per batch when the uplink is Bluetooth PAN.
    pub batch_concurrency_bt: usize,
    /// How long fetching stays blocked after a connect/DNS failure [s].
    pub fetch_block_window_secs: u64,
    /// Fixed zoom level used for DEM lookups.
    pub dem_zoom: u8,
}

impl Default for TileConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("maptile"),
            batch_concurrency: 100,
            batch_concurrency_bt: 1,
            fetch_block_window_secs: 180,
            dem_zoom: 15,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub course: CourseConfig,
    pub recorder: RecorderConfig,
    pub tiles: TileConfig,
    /// Session-state file path.
    pub state_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            course: CourseConfig::default(),
            recorder: RecorderConfig::default(),
            tiles: TileConfig::default(),
            state_file: PathBuf::from("state.json"),
        }
    }
}

impl Config {
    /// Load from a TOML file; missing keys fall back to defaults.
    pub fn load(path: &Path) -> CoreResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| CoreError::config(format!("cannot read {}: {e}", path.display())))?;
        toml::from_str(&raw)
            .map_err(|e| CoreError::config(format!("cannot parse {}: {e}", path.display())))
    }

    /// Path of the active log database.
    pub fn log_db_path(&self) -> PathBuf {
        self.recorder.log_dir.join("log.db")
    }
}
