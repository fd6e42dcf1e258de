//! CSV export of the ride log.
//!
//! Writes a fixed, human-ordered subset of the log columns. The list is
//! intersected with the actual table layout so an export of an archived
//! database from an older layout still works.

use std::io::{BufWriter, Write};
use std::path::Path;

use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags};
use tracing::info;

use crate::db::LOG_TABLE;
use crate::error::ExportError;

/// Preferred column order for the CSV.
const CSV_COLUMNS: &[&str] = &[
    "lap",
    "timer",
    "timestamp",
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
];

pub fn export_csv(db_path: &Path, out_path: &Path) -> Result<(), ExportError> {
    let conn = Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;

    let mut stmt = conn.prepare(&format!("PRAGMA table_info({LOG_TABLE})"))?;
    let present: Vec<String> = stmt
        .query_map([], |r| r.get::<_, String>(1))?
        .collect::<Result<_, _>>()?;
    let columns: Vec<&str> = CSV_COLUMNS
        .iter()
        .copied()
        .filter(|c| present.iter().any(|p| p == c))
        .collect();
    if columns.is_empty() {
        return Err(ExportError::EmptyLog);
    }

    let mut out = BufWriter::new(std::fs::File::create(out_path)?);
    writeln!(out, "{}", columns.join(","))?;

    let sql = format!(
        "SELECT {} FROM {LOG_TABLE} ORDER BY total_timer_time",
        columns.join(", ")
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    let mut count = 0usize;
    while let Some(row) = rows.next()? {
        let mut line = String::new();
        for i in 0..columns.len() {
            if i > 0 {
                line.push(',');
            }
            match row.get::<_, Value>(i)? {
                Value::Null => {}
                Value::Integer(v) => line.push_str(&v.to_string()),
                Value::Real(v) => line.push_str(&v.to_string()),
                Value::Text(v) => line.push_str(&v),
                Value::Blob(_) => {}
            }
        }
        writeln!(out, "{line}")?;
        count += 1;
    }
    out.flush()?;
    info!(rows = count, path = %out_path.display(), "csv exported");
    Ok(())
}
