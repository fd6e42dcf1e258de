//! Ride recorder.
//!
//! Consumes one sensor snapshot per tick while running, maintains lap and
//! session aggregates, and writes a denormalised row to the log database so
//! an interrupted ride resumes from what is on disk.
//!
//! Averages come in three flavours:
//! - heart rate keeps a running mean over ticks
//! - cadence and power average over counted samples, with configurable
//!   handling of zero samples (coasting vs standing on the pedals)
//! - speed is total distance over elapsed recording seconds, so dropped
//!   samples cannot skew it
//!
//! Cumulative metrics (distance, work, ascent, descent) store the sensor
//! value as the lap maximum and the delta against the previous lap's end as
//! the lap value.

use std::path::PathBuf;

use chrono::{DateTime, Local, Utc};
use tracing::info;

use crate::config::RecorderConfig;
use crate::db::{LogDb, LogRow, Metric};
use crate::error::RecorderError;
use crate::export;
use crate::models::sensors::SensorValues;

const HR: usize = Metric::HeartRate as usize;
const CAD: usize = Metric::Cadence as usize;
const DIST: usize = Metric::Distance as usize;
const SPD: usize = Metric::Speed as usize;
const PWR: usize = Metric::Power as usize;
const ACC_PWR: usize = Metric::AccumulatedPower as usize;
const ASCENT: usize = Metric::TotalAscent as usize;
const DESCENT: usize = Metric::TotalDescent as usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderStatus {
    Init,
    Running,
    Paused,
}

/// Files produced by a reset.
#[derive(Debug, Clone)]
pub struct ExportedActivity {
    pub fit: PathBuf,
    pub csv: PathBuf,
}

pub struct Recorder {
    cfg: RecorderConfig,
    db: LogDb,
    status: RecorderStatus,
    start_time: Option<DateTime<Utc>>,

    /// Recorded seconds in the whole ride.
    count: i64,
    /// Recorded seconds in the current lap.
    count_lap: i64,
    lap: i64,

    lap_avg: [f64; 8],
    entire_avg: [f64; 8],
    lap_max: [f64; 8],
    entire_max: [f64; 8],
    pre_lap_avg: [f64; 8],
    pre_lap_max: [f64; 8],

    lap_cad_count: f64,
    lap_cad_sum: f64,
    avg_cad_count: f64,
    avg_cad_sum: f64,
    lap_power_count: f64,
    lap_power_sum: f64,
    avg_power_count: f64,
    avg_power_sum: f64,
}

impl Recorder {
    /// Open the recorder over the configured log database, resuming any
    /// interrupted ride found there.
    pub fn open(cfg: &RecorderConfig) -> Result<Self, RecorderError> {
        let db = LogDb::open(&cfg.log_dir.join("log.db"))?;
        let mut rec = Self {
            cfg: cfg.clone(),
            status: RecorderStatus::Init,
            start_time: None,
            count: 0,
            count_lap: 0,
            lap: 0,
            lap_avg: [0.0; 8],
            entire_avg: [0.0; 8],
            lap_max: [0.0; 8],
            entire_max: [0.0; 8],
            pre_lap_avg: [0.0; 8],
            pre_lap_max: [0.0; 8],
            lap_cad_count: 0.0,
            lap_cad_sum: 0.0,
            avg_cad_count: 0.0,
            avg_cad_sum: 0.0,
            lap_power_count: 0.0,
            lap_power_sum: 0.0,
            avg_power_count: 0.0,
            avg_power_sum: 0.0,
            db,
        };
        rec.resume()?;
        Ok(rec)
    }

    fn resume(&mut self) -> Result<(), RecorderError> {
        let Some(data) = self.db.resume()? else {
            return Ok(());
        };
        self.status = RecorderStatus::Paused;
        self.start_time = self.db.first_timestamp()?;
        self.count = data.total_timer_time;
        self.count_lap = data.timer;
        self.lap = data.lap;
        let z = |v: f64| if v.is_nan() { 0.0 } else { v };
        for i in 0..8 {
            self.lap_avg[i] = z(data.lap_avg[i]);
            self.entire_avg[i] = z(data.entire_avg[i]);
            self.lap_max[i] = z(data.lap_max[i]);
            self.entire_max[i] = z(data.entire_max[i]);
            self.pre_lap_avg[i] = z(data.pre_lap_avg[i]);
            self.pre_lap_max[i] = z(data.pre_lap_max[i]);
        }
        self.lap_cad_count = z(data.lap_cad_count);
        self.lap_cad_sum = z(data.lap_cad_sum);
        self.avg_cad_count = z(data.avg_cad_count);
        self.avg_cad_sum = z(data.avg_cad_sum);
        self.lap_power_count = z(data.lap_power_count);
        self.lap_power_sum = z(data.lap_power_sum);
        self.avg_power_count = z(data.avg_power_count);
        self.avg_power_sum = z(data.avg_power_sum);
        Ok(())
    }

    pub fn status(&self) -> RecorderStatus {
        self.status
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    /// Recorded seconds in the whole ride.
    pub fn total_timer_time(&self) -> i64 {
        self.count
    }

    /// Recorded seconds in the current lap.
    pub fn lap_timer(&self) -> i64 {
        self.count_lap
    }

    pub fn current_lap(&self) -> i64 {
        self.lap
    }

    pub fn lap_average(&self, m: Metric) -> f64 {
        self.lap_avg[m as usize]
    }

    pub fn entire_average(&self, m: Metric) -> f64 {
        self.entire_avg[m as usize]
    }

    pub fn lap_maximum(&self, m: Metric) -> f64 {
        self.lap_max[m as usize]
    }

    pub fn entire_maximum(&self, m: Metric) -> f64 {
        self.entire_max[m as usize]
    }

    /// Toggle between running and paused.
    pub fn start_stop(&mut self, now: DateTime<Utc>) -> RecorderStatus {
        self.status = match self.status {
            RecorderStatus::Running => RecorderStatus::Paused,
            RecorderStatus::Init | RecorderStatus::Paused => {
                if self.start_time.is_none() {
                    self.start_time = Some(now);
                }
                RecorderStatus::Running
            }
        };
        info!(status = ?self.status, "recorder");
        self.status
    }

    /// Close the current lap. A lap with no recorded ticks is ignored.
    pub fn count_laps(&mut self) {
        if self.count == 0 {
            return;
        }
        self.lap += 1;
        self.count_lap = 0;
        self.pre_lap_avg = self.lap_avg;
        self.pre_lap_max = self.lap_max;
        self.lap_avg = [0.0; 8];
        self.lap_max = [0.0; 8];
        self.lap_cad_count = 0.0;
        self.lap_cad_sum = 0.0;
        self.lap_power_count = 0.0;
        self.lap_power_sum = 0.0;
        info!(lap = self.lap, "lap");
    }

    /// One logging tick. A no-op unless the recorder is running.
    pub fn tick(&mut self, values: &SensorValues, now: DateTime<Utc>) -> Result<(), RecorderError> {
        if self.status != RecorderStatus::Running {
            return Ok(());
        }
        self.count += 1;
        self.count_lap += 1;
        self.update_stats(values);
        self.db.insert(&self.build_row(values, now))
    }

    fn update_stats(&mut self, v: &SensorValues) {
        let hr = v.integrated.heart_rate;
        if !hr.is_nan() {
            self.entire_avg[HR] =
                (self.entire_avg[HR] * (self.count - 1) as f64 + hr) / self.count as f64;
            self.lap_avg[HR] =
                (self.lap_avg[HR] * (self.count_lap - 1) as f64 + hr) / self.count_lap as f64;
            self.entire_max[HR] = self.entire_max[HR].max(hr);
            self.lap_max[HR] = self.lap_max[HR].max(hr);
        }

        let cad = v.integrated.cadence;
        if !cad.is_nan() {
            if cad > 0.0 || self.cfg.averaging.cadence_includes_zero {
                self.lap_cad_count += 1.0;
                self.lap_cad_sum += cad;
                self.avg_cad_count += 1.0;
                self.avg_cad_sum += cad;
            }
            self.entire_max[CAD] = self.entire_max[CAD].max(cad);
            self.lap_max[CAD] = self.lap_max[CAD].max(cad);
        }
        self.lap_avg[CAD] = ratio(self.lap_cad_sum, self.lap_cad_count);
        self.entire_avg[CAD] = ratio(self.avg_cad_sum, self.avg_cad_count);

        let power = v.integrated.power;
        if !power.is_nan() {
            if power > 0.0 || self.cfg.averaging.power_includes_zero {
                self.lap_power_count += 1.0;
                self.lap_power_sum += power;
                self.avg_power_count += 1.0;
                self.avg_power_sum += power;
            }
            self.entire_max[PWR] = self.entire_max[PWR].max(power);
            self.lap_max[PWR] = self.lap_max[PWR].max(power);
        }
        self.lap_avg[PWR] = ratio(self.lap_power_sum, self.lap_power_count);
        self.entire_avg[PWR] = ratio(self.avg_power_sum, self.avg_power_count);

        let speed = v.integrated.speed;
        if !speed.is_nan() {
            self.entire_max[SPD] = self.entire_max[SPD].max(speed);
            self.lap_max[SPD] = self.lap_max[SPD].max(speed);
        }

        // cumulative metrics: the current value is the lap maximum, the
        // delta against the previous lap's end is the lap value
        let cumulative = [
            (DIST, v.integrated.distance),
            (ACC_PWR, v.integrated.accumulated_power),
            (ASCENT, v.environment.total_ascent),
            (DESCENT, v.environment.total_descent),
        ];
        for (i, value) in cumulative {
            if value.is_nan() {
                continue;
            }
            let base = if self.pre_lap_max[i].is_nan() {
                0.0
            } else {
                self.pre_lap_max[i]
            };
            self.lap_avg[i] = value - base;
            self.lap_max[i] = value;
            self.entire_max[i] = value;
        }

        // distance over time, immune to per-sample speed glitches
        self.entire_avg[SPD] = ratio(self.entire_max[DIST], self.count as f64);
        self.lap_avg[SPD] = ratio(self.lap_avg[DIST], self.count_lap as f64);
    }

    fn build_row(&self, v: &SensorValues, now: DateTime<Utc>) -> LogRow {
        LogRow {
            timestamp: now,
            lap: self.lap,
            timer: self.count_lap,
            total_timer_time: self.count,
            position_lat: v.gps.lat,
            position_long: v.gps.lon,
            gps_altitude: v.gps.alt,
            gps_distance: v.gps.distance,
            gps_mode: v.gps.mode,
            gps_used_sats: v.gps.used_sats,
            gps_total_sats: v.gps.total_sats,
            gps_track: v.gps.track,
            heart_rate: v.integrated.heart_rate,
            cadence: v.integrated.cadence,
            distance: v.integrated.distance,
            speed: v.integrated.speed,
            power: v.integrated.power,
            accumulated_power: v.integrated.accumulated_power,
            temperature: v.environment.temperature,
            pressure: v.environment.pressure,
            altitude: v.environment.altitude,
            heading: v.environment.heading,
            course_altitude: v.course_altitude,
            dem_altitude: v.dem_altitude,
            total_ascent: v.environment.total_ascent,
            total_descent: v.environment.total_descent,
            lap_values: self.lap_avg,
            avg_heart_rate: self.entire_avg[HR],
            avg_cadence: self.entire_avg[CAD],
            avg_speed: self.entire_avg[SPD],
            avg_power: self.entire_avg[PWR],
            lap_cad_count: self.lap_cad_count,
            lap_cad_sum: self.lap_cad_sum,
            avg_cad_count: self.avg_cad_count,
            avg_cad_sum: self.avg_cad_sum,
            lap_power_count: self.lap_power_count,
            lap_power_sum: self.lap_power_sum,
            avg_power_count: self.avg_power_count,
            avg_power_sum: self.avg_power_sum,
        }
    }

    /// Export the ride, move the log aside and start fresh.
    ///
    /// Refused while running or when nothing was recorded. If either export
    /// fails the database is left untouched so nothing is lost.
    pub fn reset(&mut self) -> Result<Option<ExportedActivity>, RecorderError> {
        if self.status == RecorderStatus::Running || self.count == 0 {
            return Ok(None);
        }
        let start = match self.start_time {
            Some(t) => t,
            None => self.db.first_timestamp()?.unwrap_or_else(Utc::now),
        };
        let stamp = start
            .with_timezone(&Local)
            .format("%Y-%m-%d_%H-%M-%S")
            .to_string();
        let csv = self.cfg.log_dir.join(format!("{stamp}.csv"));
        let fit = self.cfg.log_dir.join(format!("{stamp}.fit"));
        export::csv::export_csv(self.db.path(), &csv)
            .map_err(|e| RecorderError::ResetAborted(format!("csv export failed: {e}")))?;
        export::fit::export_fit(self.db.path(), &fit, self.cfg.unit_id, start)
            .map_err(|e| RecorderError::ResetAborted(format!("fit export failed: {e}")))?;

        // renaming under the live connection is fine, it follows the inode;
        // the subsequent open on the original path starts a fresh database
        let fresh_path = self.cfg.log_dir.join("log.db");
        std::fs::rename(&fresh_path, crate::db::archived_path(&fresh_path, &stamp))?;
        self.db = LogDb::open(&fresh_path)?;

        self.status = RecorderStatus::Init;
        self.start_time = None;
        self.count = 0;
        self.count_lap = 0;
        self.lap = 0;
        self.lap_avg = [0.0; 8];
        self.entire_avg = [0.0; 8];
        self.lap_max = [0.0; 8];
        self.entire_max = [0.0; 8];
        self.pre_lap_avg = [0.0; 8];
        self.pre_lap_max = [0.0; 8];
        self.lap_cad_count = 0.0;
        self.lap_cad_sum = 0.0;
        self.avg_cad_count = 0.0;
        self.avg_cad_sum = 0.0;
        self.lap_power_count = 0.0;
        self.lap_power_sum = 0.0;
        self.avg_power_count = 0.0;
        self.avg_power_sum = 0.0;

        info!(activity = %stamp, "ride exported and log reset");
        Ok(Some(ExportedActivity { fit, csv }))
    }
}

fn ratio(sum: f64, count: f64) -> f64 {
    if count > 0.0 {
        sum / count
    } else {
        0.0
    }
}
