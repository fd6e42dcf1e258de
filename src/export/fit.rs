//! FIT activity export.
//!
//! Produces a Garmin FIT file from the log database: one file_id and
//! file_creator, the full record stream, one lap message per lap, a
//! session summary and an activity envelope. The writer keeps the usual
//! local-message-type table; a record whose set of non-NULL fields changes
//! gets a fresh definition message automatically because the (message,
//! fields) pair no longer matches any live slot.
//!
//! All numeric fields are written as integers after the profile scaling
//! (speed x1000, distance x100, altitude (v+500)x5, coordinates in
//! semicircles).

use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Local, Offset, TimeZone, Utc};
use rusqlite::{named_params, Connection, OpenFlags, OptionalExtension};
use tracing::info;

use crate::db::LOG_TABLE;
use crate::error::ExportError;

/// Message numbers used in the export.
const MSG_FILE_ID: u16 = 0;
const MSG_SESSION: u16 = 18;
const MSG_LAP: u16 = 19;
const MSG_RECORD: u16 = 20;
const MSG_ACTIVITY: u16 = 34;
const MSG_FILE_CREATOR: u16 = 49;

const CRC_TABLE: [u16; 16] = [
    0x0000, 0xCC01, 0xD801, 0x1400, 0xF001, 0x3C00, 0x2800, 0xE401, 0xA001, 0x6C00, 0x7800,
    0xB401, 0x5000, 0x9C01, 0x8801, 0x4400,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BaseType {
    Enum,
    Sint8,
    Uint8,
    Uint16,
    Sint32,
    Uint32,
    Uint32z,
}

impl BaseType {
    fn id(self) -> u8 {
        match self {
            BaseType::Enum => 0x00,
            BaseType::Sint8 => 0x01,
            BaseType::Uint8 => 0x02,
            BaseType::Uint16 => 0x84,
            BaseType::Sint32 => 0x85,
            BaseType::Uint32 => 0x86,
            BaseType::Uint32z => 0x8C,
        }
    }

    fn size(self) -> u8 {
        match self {
            BaseType::Enum | BaseType::Sint8 | BaseType::Uint8 => 1,
            BaseType::Uint16 => 2,
            BaseType::Sint32 | BaseType::Uint32 | BaseType::Uint32z => 4,
        }
    }

    fn encode(self, v: i64, out: &mut Vec<u8>) {
        match self {
            BaseType::Enum | BaseType::Uint8 => out.push(v.clamp(0, 0xFF) as u8),
            BaseType::Sint8 => out.push((v.clamp(-128, 127) as i8) as u8),
            BaseType::Uint16 => {
                out.extend_from_slice(&(v.clamp(0, 0xFFFF) as u16).to_le_bytes())
            }
            BaseType::Sint32 => out.extend_from_slice(
                &(v.clamp(i32::MIN as i64, i32::MAX as i64) as i32).to_le_bytes(),
            ),
            BaseType::Uint32 | BaseType::Uint32z => {
                out.extend_from_slice(&(v.clamp(0, u32::MAX as i64) as u32).to_le_bytes())
            }
        }
    }
}

/// Base type of a (message, field) pair, for the fields this export emits.
fn base_type(msg: u16, field: u8) -> BaseType {
    match (msg, field) {
        (MSG_FILE_ID, 0) => BaseType::Enum,
        (MSG_FILE_ID, 1) | (MSG_FILE_ID, 2) | (MSG_FILE_ID, 5) => BaseType::Uint16,
        (MSG_FILE_ID, 3) => BaseType::Uint32z,
        (MSG_FILE_ID, 4) => BaseType::Uint32,

        (MSG_SESSION, 253) | (MSG_SESSION, 2) => BaseType::Uint32,
        (MSG_SESSION, 5) => BaseType::Enum,
        (MSG_SESSION, 7) | (MSG_SESSION, 8) | (MSG_SESSION, 9) | (MSG_SESSION, 48) => {
            BaseType::Uint32
        }
        (MSG_SESSION, 14) | (MSG_SESSION, 15) | (MSG_SESSION, 20) | (MSG_SESSION, 21)
        | (MSG_SESSION, 22) | (MSG_SESSION, 23) | (MSG_SESSION, 26) => BaseType::Uint16,
        (MSG_SESSION, 16) | (MSG_SESSION, 17) | (MSG_SESSION, 18) | (MSG_SESSION, 19) => {
            BaseType::Uint8
        }

        (MSG_LAP, 253) | (MSG_LAP, 2) => BaseType::Uint32,
        (MSG_LAP, 7) | (MSG_LAP, 8) | (MSG_LAP, 9) | (MSG_LAP, 42) => BaseType::Uint32,
        (MSG_LAP, 13) | (MSG_LAP, 14) | (MSG_LAP, 19) | (MSG_LAP, 20) | (MSG_LAP, 21)
        | (MSG_LAP, 22) => BaseType::Uint16,
        (MSG_LAP, 15) | (MSG_LAP, 16) | (MSG_LAP, 17) | (MSG_LAP, 18) => BaseType::Uint8,

        (MSG_RECORD, 253) => BaseType::Uint32,
        (MSG_RECORD, 0) | (MSG_RECORD, 1) => BaseType::Sint32,
        (MSG_RECORD, 2) | (MSG_RECORD, 6) | (MSG_RECORD, 7) => BaseType::Uint16,
        (MSG_RECORD, 3) | (MSG_RECORD, 4) => BaseType::Uint8,
        (MSG_RECORD, 5) | (MSG_RECORD, 29) => BaseType::Uint32,
        (MSG_RECORD, 13) => BaseType::Sint8,

        (MSG_ACTIVITY, 253) | (MSG_ACTIVITY, 0) | (MSG_ACTIVITY, 5) => BaseType::Uint32,
        (MSG_ACTIVITY, 1) => BaseType::Uint16,
        (MSG_ACTIVITY, 2) | (MSG_ACTIVITY, 3) | (MSG_ACTIVITY, 4) => BaseType::Enum,

        (MSG_FILE_CREATOR, 0) => BaseType::Uint16,
        (MSG_FILE_CREATOR, 1) => BaseType::Uint8,

        _ => BaseType::Uint32,
    }
}

struct FitWriter {
    data: Vec<u8>,
    slots: Vec<Option<(u16, Vec<u8>)>>,
    next_slot: usize,
}

impl FitWriter {
    fn new() -> Self {
        Self {
            data: Vec::new(),
            slots: vec![None; 16],
            next_slot: 0,
        }
    }

    fn write_message(&mut self, msg: u16, fields: &[(u8, i64)]) {
        let ids: Vec<u8> = fields.iter().map(|&(id, _)| id).collect();
        let slot = match self
            .slots
            .iter()
            .position(|s| s.as_ref().is_some_and(|(m, i)| *m == msg && *i == ids))
        {
            Some(slot) => slot,
            None => {
                let slot = self.next_slot;
                self.next_slot = (self.next_slot + 1) % 16;
                self.slots[slot] = Some((msg, ids));
                self.write_definition(slot, msg, fields);
                slot
            }
        };
        self.data.push(slot as u8);
        for &(id, value) in fields {
            base_type(msg, id).encode(value, &mut self.data);
        }
    }

    fn write_definition(&mut self, slot: usize, msg: u16, fields: &[(u8, i64)]) {
        self.data.push(0x40 | slot as u8);
        self.data.push(0); // reserved
        self.data.push(0); // little-endian
        self.data.extend_from_slice(&msg.to_le_bytes());
        self.data.push(fields.len() as u8);
        for &(id, _) in fields {
            let bt = base_type(msg, id);
            self.data.push(id);
            self.data.push(bt.size());
            self.data.push(bt.id());
        }
    }

    /// Wrap the data in the 14-byte header and trailing CRC.
    fn finish(self) -> Vec<u8> {
        let mut header = Vec::with_capacity(14);
        header.push(14u8);
        header.push(0x10);
        header.extend_from_slice(&2014u16.to_le_bytes());
        header.extend_from_slice(&(self.data.len() as u32).to_le_bytes());
        header.extend_from_slice(b".FIT");
        let header_crc = crc16(0, &header);
        let mut out = header;
        out.extend_from_slice(&header_crc.to_le_bytes());
        out.extend_from_slice(&self.data);
        let total_crc = crc16(0, &out);
        out.extend_from_slice(&total_crc.to_le_bytes());
        out
    }
}

fn crc16(seed: u16, data: &[u8]) -> u16 {
    let mut crc = seed;
    for &b in data {
        let mut tmp = CRC_TABLE[(crc & 0xF) as usize];
        crc = (crc >> 4) & 0x0FFF;
        crc = crc ^ tmp ^ CRC_TABLE[(b & 0xF) as usize];
        tmp = CRC_TABLE[(crc & 0xF) as usize];
        crc = (crc >> 4) & 0x0FFF;
        crc = crc ^ tmp ^ CRC_TABLE[((b >> 4) & 0xF) as usize];
    }
    crc
}

fn fit_epoch() -> DateTime<Utc> {
    // the FIT timestamp origin
    Utc.with_ymd_and_hms(1989, 12, 31, 0, 0, 0).unwrap()
}

fn fit_ts(t: DateTime<Utc>) -> i64 {
    (t - fit_epoch()).num_seconds()
}

/// Push `(field, value * scale)` when the column value is present.
fn push_scaled(fields: &mut Vec<(u8, i64)>, id: u8, value: Option<f64>, scale: f64) {
    if let Some(v) = value {
        fields.push((id, (v * scale) as i64));
    }
}

fn push_altitude(fields: &mut Vec<(u8, i64)>, id: u8, value: Option<f64>) {
    if let Some(v) = value {
        fields.push((id, ((v + 500.0) * 5.0) as i64));
    }
}

fn push_semicircles(fields: &mut Vec<(u8, i64)>, id: u8, value: Option<f64>) {
    if let Some(v) = value {
        fields.push((id, (v * (2147483648.0 / 180.0)) as i64));
    }
}

pub fn export_fit(
    db_path: &Path,
    out_path: &Path,
    unit_id: u32,
    start_time: DateTime<Utc>,
) -> Result<(), ExportError> {
    let conn = Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
    let rows: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {LOG_TABLE}"), [], |r| {
        r.get(0)
    })?;
    if rows == 0 {
        return Err(ExportError::EmptyLog);
    }

    let mut writer = FitWriter::new();
    writer.write_message(
        MSG_FILE_ID,
        &[
            (3, unit_id as i64),
            (4, fit_ts(start_time)),
            (1, 255), // manufacturer: development
            (0, 4),   // file type: activity
        ],
    );
    writer.write_message(MSG_FILE_CREATOR, &[(0, 100), (1, 1)]);

    write_records(&conn, &mut writer)?;
    let max_lap: i64 = conn.query_row(
        &format!("SELECT COALESCE(MAX(lap), 0) FROM {LOG_TABLE}"),
        [],
        |r| r.get(0),
    )?;
    for lap in 0..=max_lap {
        write_lap(&conn, &mut writer, lap)?;
    }
    let (start_ts, end_ts) = write_session(&conn, &mut writer, max_lap)?;

    let utc_offset = Local
        .timestamp_opt(end_ts.timestamp(), 0)
        .single()
        .map(|t| t.offset().fix().local_minus_utc() as i64)
        .unwrap_or(0);
    writer.write_message(
        MSG_ACTIVITY,
        &[
            (253, fit_ts(end_ts)),
            (0, (end_ts - start_ts).num_seconds() * 1000),
            (1, 1),  // one session
            (2, 0),  // manual
            (3, 26), // activity event
            (4, 1),  // event_type: stop
            (5, fit_ts(end_ts) + utc_offset),
        ],
    );

    let bytes = writer.finish();
    let mut file = std::fs::File::create(out_path)?;
    file.write_all(&bytes)?;
    file.flush()?;
    info!(bytes = bytes.len(), path = %out_path.display(), "fit exported");
    Ok(())
}

fn write_records(conn: &Connection, writer: &mut FitWriter) -> Result<(), ExportError> {
    let sql = format!(
        "SELECT timestamp, position_lat, position_long, altitude, heart_rate, cadence, \
                distance, speed, power, temperature, accumulated_power \
         FROM {LOG_TABLE} ORDER BY lap, total_timer_time"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    while let Some(row) = rows.next()? {
        let ts: DateTime<Utc> = row.get(0)?;
        let mut fields: Vec<(u8, i64)> = vec![(253, fit_ts(ts))];
        push_semicircles(&mut fields, 0, row.get(1)?);
        push_semicircles(&mut fields, 1, row.get(2)?);
        push_altitude(&mut fields, 2, row.get(3)?);
        push_scaled(&mut fields, 3, row.get(4)?, 1.0);
        push_scaled(&mut fields, 4, row.get(5)?, 1.0);
        push_scaled(&mut fields, 5, row.get(6)?, 100.0);
        push_scaled(&mut fields, 6, row.get(7)?, 1000.0);
        push_scaled(&mut fields, 7, row.get(8)?, 1.0);
        push_scaled(&mut fields, 13, row.get(9)?, 1.0);
        push_scaled(&mut fields, 29, row.get(10)?, 1.0);
        writer.write_message(MSG_RECORD, &fields);
    }
    Ok(())
}

fn write_lap(conn: &Connection, writer: &mut FitWriter, lap: i64) -> Result<(), ExportError> {
    let agg_sql = format!(
        "SELECT MAX(timestamp), MIN(timestamp), MAX(timer), MAX(lap_distance), MAX(speed), \
                MAX(heart_rate), MAX(cadence), MAX(power), MAX(lap_total_ascent), \
                MAX(lap_total_descent), MAX(lap_accumulated_power) \
         FROM {LOG_TABLE} WHERE lap = :lap"
    );
    let found = conn
        .query_row(&agg_sql, named_params! {":lap": lap}, |r| {
            Ok((
                r.get::<_, Option<DateTime<Utc>>>(0)?,
                r.get::<_, Option<DateTime<Utc>>>(1)?,
                r.get::<_, Option<i64>>(2)?,
                r.get::<_, Option<f64>>(3)?,
                r.get::<_, Option<f64>>(4)?,
                r.get::<_, Option<f64>>(5)?,
                r.get::<_, Option<f64>>(6)?,
                r.get::<_, Option<f64>>(7)?,
                r.get::<_, Option<f64>>(8)?,
                r.get::<_, Option<f64>>(9)?,
                r.get::<_, Option<f64>>(10)?,
            ))
        })
        .optional()?;
    let Some((
        Some(end_ts),
        Some(start_ts),
        timer,
        lap_distance,
        max_speed,
        max_hr,
        max_cad,
        max_power,
        lap_ascent,
        lap_descent,
        lap_work,
    )) = found
    else {
        return Ok(());
    };

    // the per-lap averages live on the lap's last row
    let last_sql = format!(
        "SELECT lap_speed, lap_heart_rate, lap_cadence, lap_power FROM {LOG_TABLE} \
         WHERE lap = :lap AND timer = (SELECT MAX(timer) FROM {LOG_TABLE} WHERE lap = :lap)"
    );
    let (avg_speed, avg_hr, avg_cad, avg_power) = conn
        .query_row(&last_sql, named_params! {":lap": lap}, |r| {
            Ok((
                r.get::<_, Option<f64>>(0)?,
                r.get::<_, Option<f64>>(1)?,
                r.get::<_, Option<f64>>(2)?,
                r.get::<_, Option<f64>>(3)?,
            ))
        })
        .optional()?
        .unwrap_or((None, None, None, None));

    let mut fields: Vec<(u8, i64)> = vec![
        (253, fit_ts(end_ts)),
        (2, fit_ts(start_ts)),
        (7, (end_ts - start_ts).num_seconds() * 1000),
    ];
    if let Some(t) = timer {
        fields.push((8, t * 1000));
    }
    push_scaled(&mut fields, 9, lap_distance, 100.0);
    push_scaled(&mut fields, 13, avg_speed, 1000.0);
    push_scaled(&mut fields, 14, max_speed, 1000.0);
    push_scaled(&mut fields, 15, avg_hr, 1.0);
    push_scaled(&mut fields, 16, max_hr, 1.0);
    push_scaled(&mut fields, 17, avg_cad, 1.0);
    push_scaled(&mut fields, 18, max_cad, 1.0);
    push_scaled(&mut fields, 19, avg_power, 1.0);
    push_scaled(&mut fields, 20, max_power, 1.0);
    push_scaled(&mut fields, 21, lap_ascent, 1.0);
    push_scaled(&mut fields, 22, lap_descent, 1.0);
    push_scaled(&mut fields, 42, lap_work, 1.0);
    writer.write_message(MSG_LAP, &fields);
    Ok(())
}

fn write_session(
    conn: &Connection,
    writer: &mut FitWriter,
    max_lap: i64,
) -> Result<(DateTime<Utc>, DateTime<Utc>), ExportError> {
    let agg_sql = format!(
        "SELECT MAX(timestamp), MIN(timestamp), MAX(total_timer_time), MAX(distance), \
                MAX(speed), MAX(heart_rate), MAX(cadence), MAX(power), MAX(total_ascent), \
                MAX(total_descent), MAX(accumulated_power) \
         FROM {LOG_TABLE}"
    );
    let (
        end_ts,
        start_ts,
        timer,
        distance,
        max_speed,
        max_hr,
        max_cad,
        max_power,
        ascent,
        descent,
        work,
    ) = conn.query_row(&agg_sql, [], |r| {
        Ok((
            r.get::<_, DateTime<Utc>>(0)?,
            r.get::<_, DateTime<Utc>>(1)?,
            r.get::<_, Option<i64>>(2)?,
            r.get::<_, Option<f64>>(3)?,
            r.get::<_, Option<f64>>(4)?,
            r.get::<_, Option<f64>>(5)?,
            r.get::<_, Option<f64>>(6)?,
            r.get::<_, Option<f64>>(7)?,
            r.get::<_, Option<f64>>(8)?,
            r.get::<_, Option<f64>>(9)?,
            r.get::<_, Option<f64>>(10)?,
        ))
    })?;

    // session averages live on the most recent row
    let last_sql = format!(
        "SELECT avg_speed, avg_heart_rate, avg_cadence, avg_power FROM {LOG_TABLE} \
         WHERE total_timer_time = (SELECT MAX(total_timer_time) FROM {LOG_TABLE})"
    );
    let (avg_speed, avg_hr, avg_cad, avg_power) = conn.query_row(&last_sql, [], |r| {
        Ok((
            r.get::<_, Option<f64>>(0)?,
            r.get::<_, Option<f64>>(1)?,
            r.get::<_, Option<f64>>(2)?,
            r.get::<_, Option<f64>>(3)?,
        ))
    })?;

    let mut fields: Vec<(u8, i64)> = vec![
        (253, fit_ts(end_ts)),
        (2, fit_ts(start_ts)),
        (5, 2), // sport: cycling
        (7, (end_ts - start_ts).num_seconds() * 1000),
    ];
    if let Some(t) = timer {
        fields.push((8, t * 1000));
    }
    push_scaled(&mut fields, 9, distance, 100.0);
    push_scaled(&mut fields, 14, avg_speed, 1000.0);
    push_scaled(&mut fields, 15, max_speed, 1000.0);
    push_scaled(&mut fields, 16, avg_hr, 1.0);
    push_scaled(&mut fields, 17, max_hr, 1.0);
    push_scaled(&mut fields, 18, avg_cad, 1.0);
    push_scaled(&mut fields, 19, max_cad, 1.0);
    push_scaled(&mut fields, 20, avg_power, 1.0);
    push_scaled(&mut fields, 21, max_power, 1.0);
    push_scaled(&mut fields, 22, ascent, 1.0);
    push_scaled(&mut fields, 23, descent, 1.0);
    fields.push((26, max_lap + 1));
    push_scaled(&mut fields, 48, work, 1.0);
    writer.write_message(MSG_SESSION, &fields);
    Ok((start_ts, end_ts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{LogDb, LogRow};

    fn sample_row(tick: i64, lap: i64, timer: i64) -> LogRow {
        LogRow {
            timestamp: Utc.with_ymd_and_hms(2023, 9, 28, 13, 39, 13).unwrap()
                + chrono::Duration::seconds(tick),
            lap,
            timer,
            total_timer_time: tick,
            position_lat: 35.681,
            position_long: 139.767,
            gps_altitude: 40.0,
            gps_distance: 5.0 * tick as f64,
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
            temperature: 21.0,
            pressure: 1013.0,
            altitude: 42.0,
            heading: f64::NAN,
            course_altitude: f64::NAN,
            dem_altitude: f64::NAN,
            total_ascent: tick as f64,
            total_descent: 0.0,
            lap_values: [120.0, 80.0, 5.0 * timer as f64, 5.0, 150.0, 0.0, 0.0, 0.0],
            avg_heart_rate: 121.0,
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

    fn build_db(dir: &std::path::Path) -> std::path::PathBuf {
        let path = dir.join("log.db");
        let db = LogDb::open(&path).unwrap();
        for t in 1..=5 {
            db.insert(&sample_row(t, 0, t)).unwrap();
        }
        for t in 6..=8 {
            db.insert(&sample_row(t, 1, t - 5)).unwrap();
        }
        path
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 9, 28, 13, 39, 13).unwrap()
    }

    #[test]
    fn header_and_crc_are_valid() {
        let dir = tempfile::tempdir().unwrap();
        let db = build_db(dir.path());
        let out = dir.path().join("ride.fit");
        export_fit(&db, &out, 0x12345678, start()).unwrap();

        let bytes = std::fs::read(&out).unwrap();
        assert_eq!(bytes[0], 14); // header size
        assert_eq!(&bytes[8..12], b".FIT");
        let data_len = u32::from_le_bytes(bytes[4..8].try_into().unwrap()) as usize;
        assert_eq!(data_len, bytes.len() - 16);
        // header crc over the first 12 bytes
        let header_crc = u16::from_le_bytes(bytes[12..14].try_into().unwrap());
        assert_eq!(header_crc, crc16(0, &bytes[..12]));
        // file crc over everything before the trailing two bytes
        let file_crc = u16::from_le_bytes(bytes[bytes.len() - 2..].try_into().unwrap());
        assert_eq!(file_crc, crc16(0, &bytes[..bytes.len() - 2]));
    }

    #[test]
    fn first_message_is_the_file_id_definition() {
        let dir = tempfile::tempdir().unwrap();
        let db = build_db(dir.path());
        let out = dir.path().join("ride.fit");
        export_fit(&db, &out, 7, start()).unwrap();
        let bytes = std::fs::read(&out).unwrap();
        let data = &bytes[14..];
        assert_eq!(data[0], 0x40); // definition, local type 0
        assert_eq!(u16::from_le_bytes(data[3..5].try_into().unwrap()), 0);
        assert_eq!(data[5], 4); // four file_id fields
    }

    #[test]
    fn export_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let db = build_db(dir.path());
        let a = dir.path().join("a.fit");
        let b = dir.path().join("b.fit");
        export_fit(&db, &a, 7, start()).unwrap();
        export_fit(&db, &b, 7, start()).unwrap();
        assert_eq!(std::fs::read(a).unwrap(), std::fs::read(b).unwrap());
    }

    #[test]
    fn missing_database_is_an_error_and_is_not_created() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.db");
        let out = dir.path().join("ride.fit");
        assert!(export_fit(&path, &out, 7, start()).is_err());
        // a read-only open must not create an empty database
        assert!(!path.exists());
    }

    #[test]
    fn empty_log_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.db");
        LogDb::open(&path).unwrap();
        let out = dir.path().join("ride.fit");
        assert!(matches!(
            export_fit(&path, &out, 7, start()),
            Err(ExportError::EmptyLog)
        ));
    }

    #[test]
    fn timestamps_use_the_fit_epoch() {
        assert_eq!(fit_ts(fit_epoch()), 0);
        let one_day = fit_epoch() + chrono::Duration::days(1);
        assert_eq!(fit_ts(one_day), 86400);
    }
}
