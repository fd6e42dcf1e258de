//! Ride log database.
//!
//! One sqlite file, one row per logging tick. The recorder owns a `LogDb`
//! for the life of a ride; the exporters open the file read-only on their
//! own connections. Aggregates (lap and session averages/maxima) are stored
//! denormalised on every row so a crash loses at most one tick and resume
//! is a handful of queries.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rusqlite::{named_params, Connection, OptionalExtension};
use tracing::{info, warn};

use crate::error::RecorderError;

pub const LOG_TABLE: &str = "ride_log";

/// Column set, in insert order. The first four are typed, the rest REAL.
const COLUMNS: &[&str] = &[
    "timestamp",
    "lap",
    "timer",
    "total_timer_time",
    "position_lat",
    "position_long",
    "gps_altitude",
    "gps_distance",
    "gps_mode",
    "gps_used_sats",
    "gps_total_sats",
    "gps_track",
    "heart_rate",
    "cadence",
    "distance",
    "speed",
    "power",
    "accumulated_power",
    "temperature",
    "pressure",
    "altitude",
    "heading",
    "course_altitude",
    "dem_altitude",
    "total_ascent",
    "total_descent",
    "lap_heart_rate",
    "lap_cadence",
    "lap_distance",
    "lap_speed",
    "lap_power",
    "lap_accumulated_power",
    "lap_total_ascent",
    "lap_total_descent",
    "avg_heart_rate",
    "avg_cadence",
    "avg_speed",
    "avg_power",
    "lap_cad_count",
    "lap_cad_sum",
    "avg_cad_count",
    "avg_cad_sum",
    "lap_power_count",
    "lap_power_sum",
    "avg_power_count",
    "avg_power_sum",
];

pub fn column_names() -> &'static [&'static str] {
    COLUMNS
}

/// The eight aggregated ride metrics, in storage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Metric {
    HeartRate,
    Cadence,
    Distance,
    Speed,
    Power,
    AccumulatedPower,
    TotalAscent,
    TotalDescent,
}

impl Metric {
    pub const ALL: [Metric; 8] = [
        Metric::HeartRate,
        Metric::Cadence,
        Metric::Distance,
        Metric::Speed,
        Metric::Power,
        Metric::AccumulatedPower,
        Metric::TotalAscent,
        Metric::TotalDescent,
    ];

    pub fn column(self) -> &'static str {
        match self {
            Metric::HeartRate => "heart_rate",
            Metric::Cadence => "cadence",
            Metric::Distance => "distance",
            Metric::Speed => "speed",
            Metric::Power => "power",
            Metric::AccumulatedPower => "accumulated_power",
            Metric::TotalAscent => "total_ascent",
            Metric::TotalDescent => "total_descent",
        }
    }

    pub fn lap_column(self) -> &'static str {
        match self {
            Metric::HeartRate => "lap_heart_rate",
            Metric::Cadence => "lap_cadence",
            Metric::Distance => "lap_distance",
            Metric::Speed => "lap_speed",
            Metric::Power => "lap_power",
            Metric::AccumulatedPower => "lap_accumulated_power",
            Metric::TotalAscent => "lap_total_ascent",
            Metric::TotalDescent => "lap_total_descent",
        }
    }

    /// Session-average column; only the rate metrics carry one.
    pub fn avg_column(self) -> Option<&'static str> {
        match self {
            Metric::HeartRate => Some("avg_heart_rate"),
            Metric::Cadence => Some("avg_cadence"),
            Metric::Speed => Some("avg_speed"),
            Metric::Power => Some("avg_power"),
            _ => None,
        }
    }
}

/// One tick, ready to insert. NaN binds as NULL.
#[derive(Debug, Clone)]
pub struct LogRow {
    pub timestamp: DateTime<Utc>,
    pub lap: i64,
    pub timer: i64,
    pub total_timer_time: i64,
    pub position_lat: f64,
    pub position_long: f64,
    pub gps_altitude: f64,
    pub gps_distance: f64,
    pub gps_mode: f64,
    pub gps_used_sats: f64,
    pub gps_total_sats: f64,
    pub gps_track: f64,
    pub heart_rate: f64,
    pub cadence: f64,
    pub distance: f64,
    pub speed: f64,
    pub power: f64,
    pub accumulated_power: f64,
    pub temperature: f64,
    pub pressure: f64,
    pub altitude: f64,
    pub heading: f64,
    pub course_altitude: f64,
    pub dem_altitude: f64,
    pub total_ascent: f64,
    pub total_descent: f64,
    pub lap_values: [f64; 8],
    pub avg_heart_rate: f64,
    pub avg_cadence: f64,
    pub avg_speed: f64,
    pub avg_power: f64,
    pub lap_cad_count: f64,
    pub lap_cad_sum: f64,
    pub avg_cad_count: f64,
    pub avg_cad_sum: f64,
    pub lap_power_count: f64,
    pub lap_power_sum: f64,
    pub avg_power_count: f64,
    pub avg_power_sum: f64,
}

/// Everything the recorder needs to continue an interrupted ride.
#[derive(Debug, Clone, Default)]
pub struct ResumeData {
    pub total_timer_time: i64,
    pub timer: i64,
    pub lap: i64,
    /// Last stored value per metric.
    pub last_values: [f64; 8],
    pub lap_avg: [f64; 8],
    pub entire_avg: [f64; 8],
    pub lap_max: [f64; 8],
    pub entire_max: [f64; 8],
    pub pre_lap_avg: [f64; 8],
    pub pre_lap_max: [f64; 8],
    pub lap_cad_count: f64,
    pub lap_cad_sum: f64,
    pub avg_cad_count: f64,
    pub avg_cad_sum: f64,
    pub lap_power_count: f64,
    pub lap_power_sum: f64,
    pub avg_power_count: f64,
    pub avg_power_sum: f64,
}

pub struct LogDb {
    conn: Connection,
    path: PathBuf,
}

impl LogDb {
    /// Open (or create) the log database. An existing file whose table
    /// layout no longer matches is moved aside and a fresh one is created.
    pub fn open(path: &Path) -> Result<Self, RecorderError> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        if path.exists() {
            let conn = Connection::open(path)?;
            if !schema_matches(&conn)? {
                drop(conn);
                let old = archived_path(path, "old_layout");
                warn!(path = %path.display(), moved_to = %old.display(), "log schema changed");
                std::fs::rename(path, &old)?;
            }
        }
        let conn = Connection::open(path)?;
        init_schema(&conn)?;
        Ok(Self {
            conn,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn insert(&self, row: &LogRow) -> Result<(), RecorderError> {
        let sql = insert_sql();
        let n = |v: f64| if v.is_nan() { None } else { Some(v) };
        self.conn.execute(
            &sql,
            named_params! {
                ":timestamp": row.timestamp,
                ":lap": row.lap,
                ":timer": row.timer,
                ":total_timer_time": row.total_timer_time,
                ":position_lat": n(row.position_lat),
                ":position_long": n(row.position_long),
                ":gps_altitude": n(row.gps_altitude),
                ":gps_distance": n(row.gps_distance),
                ":gps_mode": n(row.gps_mode),
                ":gps_used_sats": n(row.gps_used_sats),
                ":gps_total_sats": n(row.gps_total_sats),
                ":gps_track": n(row.gps_track),
                ":heart_rate": n(row.heart_rate),
                ":cadence": n(row.cadence),
                ":distance": n(row.distance),
                ":speed": n(row.speed),
                ":power": n(row.power),
                ":accumulated_power": n(row.accumulated_power),
                ":temperature": n(row.temperature),
                ":pressure": n(row.pressure),
                ":altitude": n(row.altitude),
                ":heading": n(row.heading),
                ":course_altitude": n(row.course_altitude),
                ":dem_altitude": n(row.dem_altitude),
                ":total_ascent": n(row.total_ascent),
                ":total_descent": n(row.total_descent),
                ":lap_heart_rate": n(row.lap_values[0]),
                ":lap_cadence": n(row.lap_values[1]),
                ":lap_distance": n(row.lap_values[2]),
                ":lap_speed": n(row.lap_values[3]),
                ":lap_power": n(row.lap_values[4]),
                ":lap_accumulated_power": n(row.lap_values[5]),
                ":lap_total_ascent": n(row.lap_values[6]),
                ":lap_total_descent": n(row.lap_values[7]),
                ":avg_heart_rate": n(row.avg_heart_rate),
                ":avg_cadence": n(row.avg_cadence),
                ":avg_speed": n(row.avg_speed),
                ":avg_power": n(row.avg_power),
                ":lap_cad_count": n(row.lap_cad_count),
                ":lap_cad_sum": n(row.lap_cad_sum),
                ":avg_cad_count": n(row.avg_cad_count),
                ":avg_cad_sum": n(row.avg_cad_sum),
                ":lap_power_count": n(row.lap_power_count),
                ":lap_power_sum": n(row.lap_power_sum),
                ":avg_power_count": n(row.avg_power_count),
                ":avg_power_sum": n(row.avg_power_sum),
            },
        )?;
        Ok(())
    }

    pub fn row_count(&self) -> Result<i64, RecorderError> {
        let n = self
            .conn
            .query_row(&format!("SELECT COUNT(*) FROM {LOG_TABLE}"), [], |r| {
                r.get(0)
            })?;
        Ok(n)
    }

    /// Timestamp of the first row, if any.
    pub fn first_timestamp(&self) -> Result<Option<DateTime<Utc>>, RecorderError> {
        let ts = self
            .conn
            .query_row(
                &format!("SELECT MIN(timestamp) FROM {LOG_TABLE}"),
                [],
                |r| r.get::<_, Option<DateTime<Utc>>>(0),
            )
            .optional()?
            .flatten();
        Ok(ts)
    }

    /// Rebuild the recorder state from the stored rows.
    pub fn resume(&self) -> Result<Option<ResumeData>, RecorderError> {
        if self.row_count()? == 0 {
            return Ok(None);
        }
        let mut data = ResumeData::default();
        let nan = |v: Option<f64>| v.unwrap_or(f64::NAN);

        let last_sql = format!(
            "SELECT * FROM {LOG_TABLE} \
             WHERE total_timer_time = (SELECT MAX(total_timer_time) FROM {LOG_TABLE})"
        );
        self.conn.query_row(&last_sql, [], |r| {
            data.total_timer_time = r.get("total_timer_time")?;
            data.timer = r.get("timer")?;
            data.lap = r.get("lap")?;
            for (i, m) in Metric::ALL.iter().enumerate() {
                data.last_values[i] = nan(r.get(m.column())?);
                data.lap_avg[i] = nan(r.get(m.lap_column())?);
                if let Some(col) = m.avg_column() {
                    data.entire_avg[i] = nan(r.get(col)?);
                }
            }
            data.lap_cad_count = nan(r.get("lap_cad_count")?);
            data.lap_cad_sum = nan(r.get("lap_cad_sum")?);
            data.avg_cad_count = nan(r.get("avg_cad_count")?);
            data.avg_cad_sum = nan(r.get("avg_cad_sum")?);
            data.lap_power_count = nan(r.get("lap_power_count")?);
            data.lap_power_sum = nan(r.get("lap_power_sum")?);
            data.avg_power_count = nan(r.get("avg_power_count")?);
            data.avg_power_sum = nan(r.get("avg_power_sum")?);
            Ok(())
        })?;

        data.lap = self.conn.query_row(
            &format!("SELECT COALESCE(MAX(lap), 0) FROM {LOG_TABLE}"),
            [],
            |r| r.get(0),
        )?;

        let max_exprs: Vec<String> = Metric::ALL
            .iter()
            .map(|m| format!("MAX({})", m.column()))
            .collect();
        let session_sql = format!("SELECT {} FROM {LOG_TABLE}", max_exprs.join(", "));
        self.conn.query_row(&session_sql, [], |r| {
            for i in 0..8 {
                data.entire_max[i] = nan(r.get(i)?);
            }
            Ok(())
        })?;
        let current_lap = data.lap;
        let lap_sql = format!(
            "SELECT {} FROM {LOG_TABLE} WHERE lap = :lap",
            max_exprs.join(", ")
        );
        self.conn
            .query_row(&lap_sql, named_params! {":lap": current_lap}, |r| {
                for i in 0..8 {
                    data.lap_max[i] = nan(r.get(i)?);
                }
                Ok(())
            })?;

        if current_lap > 0 {
            let pre_sql = format!(
                "SELECT {} FROM {LOG_TABLE} WHERE lap < :lap",
                max_exprs.join(", ")
            );
            self.conn
                .query_row(&pre_sql, named_params! {":lap": current_lap}, |r| {
                    for i in 0..8 {
                        data.pre_lap_max[i] = nan(r.get(i)?);
                    }
                    Ok(())
                })?;
            let prev_lap = current_lap - 1;
            let prev_sql = format!(
                "SELECT * FROM {LOG_TABLE} WHERE lap = :lap AND total_timer_time = \
                 (SELECT MAX(total_timer_time) FROM {LOG_TABLE} WHERE lap = :lap)"
            );
            self.conn
                .query_row(&prev_sql, named_params! {":lap": prev_lap}, |r| {
                    for (i, m) in Metric::ALL.iter().enumerate() {
                        data.pre_lap_avg[i] = nan(r.get(m.lap_column())?);
                    }
                    Ok(())
                })?;
        }

        info!(
            ticks = data.total_timer_time,
            lap = data.lap,
            "resuming interrupted ride"
        );
        Ok(Some(data))
    }

    /// Close the connection and move the file aside under a dated name.
    pub fn archive(self, suffix: &str) -> Result<(), RecorderError> {
        let path = self.path.clone();
        self.conn
            .close()
            .map_err(|(_, e)| RecorderError::from(e))?;
        std::fs::rename(&path, archived_path(&path, suffix))?;
        Ok(())
    }
}

/// `log.db` archived under `suffix` becomes `log.db-<suffix>`.
pub fn archived_path(path: &Path, suffix: &str) -> PathBuf {
    let mut s = path.as_os_str().to_owned();
    s.push("-");
    s.push(suffix);
    PathBuf::from(s)
}

fn insert_sql() -> String {
    let cols = COLUMNS.join(", ");
    let params: Vec<String> = COLUMNS.iter().map(|c| format!(":{c}")).collect();
    format!(
        "INSERT INTO {LOG_TABLE} ({cols}) VALUES ({})",
        params.join(", ")
    )
}

fn init_schema(conn: &Connection) -> Result<(), RecorderError> {
    let mut defs = Vec::with_capacity(COLUMNS.len());
    for &c in COLUMNS {
        let ty = match c {
            "timestamp" => "DATETIME",
            "lap" | "timer" | "total_timer_time" => "INTEGER",
            _ => "REAL",
        };
        defs.push(format!("{c} {ty}"));
    }
    conn.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {LOG_TABLE} ({});\n\
         CREATE INDEX IF NOT EXISTS idx_lap ON {LOG_TABLE} (lap);\n\
         CREATE INDEX IF NOT EXISTS idx_total_timer_time ON {LOG_TABLE} (total_timer_time);\n\
         CREATE INDEX IF NOT EXISTS idx_timestamp ON {LOG_TABLE} (timestamp);",
        defs.join(", ")
    ))?;
    Ok(())
}

/// True when the existing table (if any) carries exactly the expected columns.
fn schema_matches(conn: &Connection) -> Result<bool, RecorderError> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({LOG_TABLE})"))?;
    let names: Vec<String> = stmt
        .query_map([], |r| r.get::<_, String>(1))?
        .collect::<Result<_, _>>()?;
    if names.is_empty() {
        // no table yet, nothing to migrate
        return Ok(true);
    }
    Ok(names.iter().map(String::as_str).eq(COLUMNS.iter().copied()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn row(tick: i64, lap: i64, timer: i64) -> LogRow {
        LogRow {
            timestamp: Utc.with_ymd_and_hms(2023, 9, 28, 13, 39, 13).unwrap()
                + chrono::Duration::seconds(tick),
            lap,
            timer,
            total_timer_time: tick,
            position_lat: 35.0,
            position_long: 139.0,
            gps_altitude: 40.0,
            gps_distance: tick as f64,
            gps_mode: 3.0,
            gps_used_sats: 9.0,
            gps_total_sats: 12.0,
            gps_track: 180.0,
            heart_rate: 120.0 + tick as f64,
            cadence: 80.0,
            distance: 5.0 * tick as f64,
            speed: 5.0,
            power: 150.0,
            accumulated_power: 150.0 * tick as f64,
            temperature: f64::NAN,
            pressure: 1013.0,
            altitude: 42.0,
            heading: f64::NAN,
            course_altitude: f64::NAN,
            dem_altitude: f64::NAN,
            total_ascent: tick as f64,
            total_descent: 0.0,
            lap_values: [120.0, 80.0, 5.0 * timer as f64, 5.0, 150.0, 0.0, 0.0, 0.0],
            avg_heart_rate: 120.0,
            avg_cadence: 80.0,
            avg_speed: 5.0,
            avg_power: 150.0,
            lap_cad_count: timer as f64,
            lap_cad_sum: 80.0 * timer as f64,
            avg_cad_count: tick as f64,
            avg_cad_sum: 80.0 * tick as f64,
            lap_power_count: timer as f64,
            lap_power_sum: 150.0 * timer as f64,
            avg_power_count: tick as f64,
            avg_power_sum: 150.0 * tick as f64,
        }
    }

    #[test]
    fn insert_and_count() {
        let dir = tempfile::tempdir().unwrap();
        let db = LogDb::open(&dir.path().join("log.db")).unwrap();
        assert_eq!(db.row_count().unwrap(), 0);
        db.insert(&row(1, 0, 1)).unwrap();
        db.insert(&row(2, 0, 2)).unwrap();
        assert_eq!(db.row_count().unwrap(), 2);
        assert!(db.first_timestamp().unwrap().is_some());
    }

    #[test]
    fn empty_log_has_nothing_to_resume() {
        let dir = tempfile::tempdir().unwrap();
        let db = LogDb::open(&dir.path().join("log.db")).unwrap();
        assert!(db.resume().unwrap().is_none());
    }

    #[test]
    fn resume_restores_counts_and_maxima() {
        let dir = tempfile::tempdir().unwrap();
        let db = LogDb::open(&dir.path().join("log.db")).unwrap();
        for t in 1..=5 {
            db.insert(&row(t, 0, t)).unwrap();
        }
        // lap rollover at tick 6
        for t in 6..=8 {
            db.insert(&row(t, 1, t - 5)).unwrap();
        }
        let data = db.resume().unwrap().unwrap();
        assert_eq!(data.total_timer_time, 8);
        assert_eq!(data.timer, 3);
        assert_eq!(data.lap, 1);
        // heart_rate climbs with the tick counter
        assert_eq!(data.entire_max[0], 128.0);
        assert_eq!(data.lap_max[0], 128.0);
        assert_eq!(data.pre_lap_max[0], 125.0);
        // distance restored from the last row
        assert_eq!(data.last_values[2], 40.0);
        assert_eq!(data.avg_power_count, 8.0);
    }

    #[test]
    fn nan_round_trips_as_null() {
        let dir = tempfile::tempdir().unwrap();
        let db = LogDb::open(&dir.path().join("log.db")).unwrap();
        db.insert(&row(1, 0, 1)).unwrap();
        let temp: Option<f64> = db
            .conn
            .query_row(&format!("SELECT temperature FROM {LOG_TABLE}"), [], |r| {
                r.get(0)
            })
            .unwrap();
        assert_eq!(temp, None);
    }

    #[test]
    fn changed_schema_moves_the_old_file_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(&format!("CREATE TABLE {LOG_TABLE} (timestamp DATETIME, foo REAL)"))
                .unwrap();
        }
        let db = LogDb::open(&path).unwrap();
        assert_eq!(db.row_count().unwrap(), 0);
        assert!(dir.path().join("log.db-old_layout").exists());
    }

    #[test]
    fn archive_renames_the_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.db");
        let db = LogDb::open(&path).unwrap();
        db.insert(&row(1, 0, 1)).unwrap();
        db.archive("2023-09-28_22-39-13").unwrap();
        assert!(!path.exists());
        assert!(dir.path().join("log.db-2023-09-28_22-39-13").exists());
    }
}
