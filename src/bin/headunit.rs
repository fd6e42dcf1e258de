//! Head unit core runner.
//!
//! Wires the subsystems together and drives them from a 1 Hz tick: session
//! state, tile cache and fetcher behind the connectivity gate, the DEM
//! reader, the ride recorder and the course indexer. Sensor input is a
//! stub here; on the device the snapshot comes from the sensor daemon.
//!
//! # Environment Variables
//!
//! - `VELOCORE_CONFIG`: path of the TOML configuration (default: config.toml)
//! - `RUST_LOG`: log filter (default: info)

use std::env;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use velocore::models::course_index::CourseIndex;
use velocore::net::gate::{AlwaysUp, ConnectivityGate};
use velocore::services::altimeter::recalibration_channel;
use velocore::services::indexer::CourseIndexer;
use velocore::services::recorder::Recorder;
use velocore::state::StateStore;
use velocore::tiles::cache::TileCache;
use velocore::tiles::dem::{DemEncoding, DemReader};
use velocore::tiles::fetcher::TileFetcher;
use velocore::tiles::LayerConfig;
use velocore::{Config, Course, SensorValues};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config_path = env::var("VELOCORE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));
    let cfg = match Config::load(&config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            warn!(path = %config_path.display(), error = %e, "using default configuration");
            Config::default()
        }
    };
    info!("starting head unit core");

    let state = Arc::new(StateStore::open(&cfg.state_file)?);
    let gate = Arc::new(ConnectivityGate::new(Arc::new(AlwaysUp)));
    let cache = TileCache::new(&cfg.tiles.cache_dir);
    let fetcher = TileFetcher::spawn(cfg.tiles.clone(), cache.clone(), gate.clone());

    let dem_layer = LayerConfig {
        name: "dem".into(),
        url: "https://cyberjapandata.gsi.go.jp/xyz/dem_png/{z}/{x}/{y}.png".into(),
        retry_url: Some("https://cyberjapandata.gsi.go.jp/xyz/demgm_png/{z}/{x}/{y}.png".into()),
        min_zoom: 8,
        max_zoom: 15,
        fix_zoom: Some(cfg.tiles.dem_zoom),
        ..LayerConfig::default()
    };
    let dem = DemReader::new(dem_layer, DemEncoding::JapanGsi, cache.clone(), fetcher.clone());

    let mut recorder = Recorder::open(&cfg.recorder)?;
    let (recal_tx, mut recal_rx) = recalibration_channel();
    let mut indexer = CourseIndexer::with_recalibration(&cfg.course, recal_tx);
    let mut index = CourseIndex::new(cfg.course.keep_on_course_cutoff);

    // course parsing is pure CPU, keep it off the runtime
    let course: Option<Course> = match cfg.course.course_file.clone() {
        Some(path) => {
            let course_cfg = cfg.course.clone();
            match tokio::task::spawn_blocking(move || Course::load(&path, &course_cfg)).await? {
                Ok(course) => Some(course),
                Err(e) => {
                    warn!(error = %e, "course load failed, riding without one");
                    None
                }
            }
        }
        None => None,
    };

    let mut interval = tokio::time::interval(Duration::from_secs(cfg.recorder.interval_secs));
    info!("entering tick loop, ctrl-c stops");
    loop {
        tokio::select! {
            _ = interval.tick() => {
                // on the device this snapshot comes from the sensor daemon
                let mut values = SensorValues::default();
                values.dem_altitude = dem.altitude(values.gps.lon, values.gps.lat);
                if let Some(course) = &course {
                    indexer.update(course, &mut index, &values);
                }
                while let Ok(recal) = recal_rx.try_recv() {
                    info!(altitude_m = recal.altitude_m, "altimeter recalibration requested");
                }
                if let Err(e) = recorder.tick(&values, chrono::Utc::now()) {
                    warn!(error = %e, "recorder tick failed");
                }
            }
            _ = tokio::signal::ctrl_c() => {
                break;
            }
        }
    }

    info!("shutting down");
    fetcher.shutdown();
    state.flush()?;
    Ok(())
}
