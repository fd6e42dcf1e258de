//! Recorder behaviour tests on a temp directory.

use chrono::{TimeZone, Utc};

use crate::config::RecorderConfig;
use crate::db::Metric;
use crate::models::sensors::SensorValues;
use crate::services::recorder::{Recorder, RecorderStatus};

fn cfg(dir: &std::path::Path) -> RecorderConfig {
    RecorderConfig {
        log_dir: dir.to_path_buf(),
        ..RecorderConfig::default()
    }
}

fn t0() -> chrono::DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 9, 28, 13, 39, 13).unwrap()
}

/// Snapshot of a steady ride: 5 m/s, 150 W, hr 120 + tick, cadence 80.
fn riding(tick: i64) -> SensorValues {
    let mut v = SensorValues::default();
    v.gps.lat = 35.0;
    v.gps.lon = 139.0;
    v.integrated.heart_rate = 120.0 + tick as f64;
    v.integrated.cadence = 80.0;
    v.integrated.speed = 5.0;
    v.integrated.distance = 5.0 * tick as f64;
    v.integrated.power = 150.0;
    v.integrated.accumulated_power = 150.0 * tick as f64;
    v.environment.total_ascent = tick as f64;
    v.environment.total_descent = 0.0;
    v
}

#[test]
fn ticks_are_ignored_until_started() {
    let dir = tempfile::tempdir().unwrap();
    let mut rec = Recorder::open(&cfg(dir.path())).unwrap();
    assert_eq!(rec.status(), RecorderStatus::Init);
    rec.tick(&riding(1), t0()).unwrap();
    assert_eq!(rec.total_timer_time(), 0);
}

#[test]
fn start_stop_toggles_and_sets_the_start_time() {
    let dir = tempfile::tempdir().unwrap();
    let mut rec = Recorder::open(&cfg(dir.path())).unwrap();
    assert!(rec.start_time().is_none());
    assert_eq!(rec.start_stop(t0()), RecorderStatus::Running);
    assert_eq!(rec.start_time(), Some(t0()));
    assert_eq!(rec.start_stop(t0()), RecorderStatus::Paused);
    // restarting keeps the original start time
    assert_eq!(rec.start_stop(t0() + chrono::Duration::seconds(60)), RecorderStatus::Running);
    assert_eq!(rec.start_time(), Some(t0()));
}

#[test]
fn stationary_session_stays_at_zero() {
    let dir = tempfile::tempdir().unwrap();
    let mut rec = Recorder::open(&cfg(dir.path())).unwrap();
    rec.start_stop(t0());
    let mut v = SensorValues::default();
    v.integrated.speed = 0.0;
    v.integrated.distance = 0.0;
    for i in 0..10 {
        rec.tick(&v, t0() + chrono::Duration::seconds(i)).unwrap();
    }
    assert_eq!(rec.total_timer_time(), 10);
    assert_eq!(rec.entire_average(Metric::Speed), 0.0);
    assert_eq!(rec.entire_average(Metric::HeartRate), 0.0);
    assert_eq!(rec.entire_maximum(Metric::Distance), 0.0);
}

#[test]
fn averages_and_maxima_track_the_ride() {
    let dir = tempfile::tempdir().unwrap();
    let mut rec = Recorder::open(&cfg(dir.path())).unwrap();
    rec.start_stop(t0());
    for i in 1..=10 {
        rec.tick(&riding(i), t0() + chrono::Duration::seconds(i)).unwrap();
    }
    // hr ran 121..=130
    assert!((rec.entire_average(Metric::HeartRate) - 125.5).abs() < 1e-9);
    assert_eq!(rec.entire_maximum(Metric::HeartRate), 130.0);
    assert_eq!(rec.entire_average(Metric::Cadence), 80.0);
    assert_eq!(rec.entire_average(Metric::Power), 150.0);
    // 50 m over 10 s
    assert!((rec.entire_average(Metric::Speed) - 5.0).abs() < 1e-9);
    assert_eq!(rec.entire_maximum(Metric::Distance), 50.0);
}

#[test]
fn zero_cadence_samples_are_excluded_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let mut rec = Recorder::open(&cfg(dir.path())).unwrap();
    rec.start_stop(t0());
    for i in 1..=4 {
        let mut v = riding(i);
        if i % 2 == 0 {
            v.integrated.cadence = 0.0; // coasting
            v.integrated.power = 0.0;
        }
        rec.tick(&v, t0() + chrono::Duration::seconds(i)).unwrap();
    }
    // cadence ignores the zeros, power counts them
    assert_eq!(rec.entire_average(Metric::Cadence), 80.0);
    assert_eq!(rec.entire_average(Metric::Power), 75.0);
}

#[test]
fn lap_rollover_rotates_the_aggregates() {
    let dir = tempfile::tempdir().unwrap();
    let mut rec = Recorder::open(&cfg(dir.path())).unwrap();
    rec.start_stop(t0());
    for i in 1..=5 {
        rec.tick(&riding(i), t0() + chrono::Duration::seconds(i)).unwrap();
    }
    assert_eq!(rec.lap_average(Metric::Distance), 25.0);
    rec.count_laps();
    assert_eq!(rec.current_lap(), 1);
    assert_eq!(rec.lap_timer(), 0);
    assert_eq!(rec.lap_average(Metric::Distance), 0.0);
    for i in 6..=8 {
        rec.tick(&riding(i), t0() + chrono::Duration::seconds(i)).unwrap();
    }
    // lap distance is the delta against the end of lap 0
    assert_eq!(rec.lap_average(Metric::Distance), 15.0);
    assert_eq!(rec.lap_maximum(Metric::Distance), 40.0);
    assert!((rec.lap_average(Metric::Speed) - 5.0).abs() < 1e-9);
    // lap hr mean covers only the three new ticks (126..=128)
    assert!((rec.lap_average(Metric::HeartRate) - 127.0).abs() < 1e-9);
}

#[test]
fn lap_without_any_ticks_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let mut rec = Recorder::open(&cfg(dir.path())).unwrap();
    rec.count_laps();
    assert_eq!(rec.current_lap(), 0);
}

#[test]
fn resume_restores_the_interrupted_ride() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut rec = Recorder::open(&cfg(dir.path())).unwrap();
        rec.start_stop(t0());
        for i in 1..=5 {
            rec.tick(&riding(i), t0() + chrono::Duration::seconds(i)).unwrap();
        }
        rec.count_laps();
        for i in 6..=8 {
            rec.tick(&riding(i), t0() + chrono::Duration::seconds(i)).unwrap();
        }
    }
    let rec = Recorder::open(&cfg(dir.path())).unwrap();
    assert_eq!(rec.status(), RecorderStatus::Paused);
    assert_eq!(rec.total_timer_time(), 8);
    assert_eq!(rec.lap_timer(), 3);
    assert_eq!(rec.current_lap(), 1);
    assert_eq!(rec.entire_maximum(Metric::HeartRate), 128.0);
    assert_eq!(rec.lap_average(Metric::Distance), 15.0);
    assert!(rec.start_time().is_some());
}

#[test]
fn reset_is_refused_while_running_or_empty() {
    let dir = tempfile::tempdir().unwrap();
    let mut rec = Recorder::open(&cfg(dir.path())).unwrap();
    assert!(rec.reset().unwrap().is_none()); // nothing recorded
    rec.start_stop(t0());
    rec.tick(&riding(1), t0()).unwrap();
    assert!(rec.reset().unwrap().is_none()); // still running
}

#[test]
fn reset_exports_and_starts_fresh() {
    let dir = tempfile::tempdir().unwrap();
    let mut rec = Recorder::open(&cfg(dir.path())).unwrap();
    rec.start_stop(t0());
    for i in 1..=5 {
        rec.tick(&riding(i), t0() + chrono::Duration::seconds(i)).unwrap();
    }
    rec.start_stop(t0());
    let exported = rec.reset().unwrap().unwrap();
    assert!(exported.fit.exists());
    assert!(exported.csv.exists());
    assert_eq!(rec.status(), RecorderStatus::Init);
    assert_eq!(rec.total_timer_time(), 0);
    assert!(rec.start_time().is_none());
    // the old log was archived next to the fresh one
    let archived: Vec<_> = std::fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.starts_with("log.db-"))
        .collect();
    assert_eq!(archived.len(), 1);
    // a new ride starts from scratch
    rec.start_stop(t0());
    rec.tick(&riding(1), t0()).unwrap();
    assert_eq!(rec.total_timer_time(), 1);
}
