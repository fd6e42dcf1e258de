//! TCX course loader.
//!
//! The files the device sees are machine-written exports, so the loader
//! scans with anchored patterns instead of a full XML parse: the `<Track>`
//! block yields the polyline, the `<CoursePoint>` span yields the cues.
//! "Straight" cues carry no routing information and are dropped.

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::error::CourseError;

static RE_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"<Name>([\s\S]*?)</Name>").unwrap());
static RE_DISTANCE_METERS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<DistanceMeters>([\s\S]*?)</DistanceMeters>").unwrap());
static RE_TRACK: Lazy<Regex> = Lazy::new(|| Regex::new(r"<Track>([\s\S]*?)</Track>").unwrap());
static RE_LATITUDE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<LatitudeDegrees>([^<]*)</LatitudeDegrees>").unwrap());
static RE_LONGITUDE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<LongitudeDegrees>([^<]*)</LongitudeDegrees>").unwrap());
static RE_ALTITUDE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<AltitudeMeters>([^<]*)</AltitudeMeters>").unwrap());
static RE_DISTANCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<DistanceMeters>([^<]*)</DistanceMeters>").unwrap());
static RE_COURSE_POINT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<CoursePoint>([\s\S]+)</CoursePoint>").unwrap());
static RE_POINT_NAME: Lazy<Regex> = Lazy::new(|| Regex::new(r"<Name>([^<]*)</Name>").unwrap());
static RE_POINT_TYPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<PointType>([^<]*)</PointType>").unwrap());
static RE_NOTES: Lazy<Regex> = Lazy::new(|| Regex::new(r"<Notes>([^<]*)</Notes>").unwrap());

/// Raw polyline data straight out of the file, distances still in meters.
#[derive(Debug, Default)]
pub struct RawCourse {
    pub name: Option<String>,
    /// Course length from the `<Lap>` summary [km].
    pub distance_km: Option<f64>,
    pub latitude: Vec<f64>,
    pub longitude: Vec<f64>,
    pub altitude: Vec<f64>,
    /// Cumulative distance [m].
    pub distance: Vec<f64>,
}

/// Raw cue data straight out of the file.
#[derive(Debug, Default)]
pub struct RawCoursePoints {
    pub name: Vec<String>,
    pub point_type: Vec<String>,
    pub latitude: Vec<f64>,
    pub longitude: Vec<f64>,
    pub notes: Vec<String>,
}

pub fn load_file(path: &Path) -> Result<(RawCourse, RawCoursePoints), CourseError> {
    let raw = std::fs::read_to_string(path)?;
    // strip a UTF-8 BOM if the exporter left one
    load_str(raw.trim_start_matches('\u{feff}'))
}

pub fn load_str(tcx: &str) -> Result<(RawCourse, RawCoursePoints), CourseError> {
    let mut course = RawCourse::default();
    let mut points = RawCoursePoints::default();

    if let Some(m) = RE_NAME.captures(tcx) {
        course.name = Some(m[1].trim().to_string());
    }
    if let Some(m) = RE_DISTANCE_METERS.captures(tcx) {
        if let Ok(v) = m[1].trim().parse::<f64>() {
            course.distance_km = Some((v / 1000.0 * 10.0).round() / 10.0);
        }
    }

    if let Some(track) = RE_TRACK.captures(tcx) {
        let track = &track[1];
        course.latitude = floats(&RE_LATITUDE, track)?;
        course.longitude = floats(&RE_LONGITUDE, track)?;
        course.altitude = floats(&RE_ALTITUDE, track)?;
        course.distance = floats(&RE_DISTANCE, track)?;
    }

    if let Some(span) = RE_COURSE_POINT.captures(tcx) {
        let span = &span[1];
        points.name = strings(&RE_POINT_NAME, span);
        points.latitude = floats(&RE_LATITUDE, span)?;
        points.longitude = floats(&RE_LONGITUDE, span)?;
        points.point_type = strings(&RE_POINT_TYPE, span);
        points.notes = strings(&RE_NOTES, span);
    }

    if course.latitude.len() != course.longitude.len() {
        return Err(CourseError::malformed(format!(
            "latitude/longitude length mismatch: {} vs {}",
            course.latitude.len(),
            course.longitude.len()
        )));
    }
    if course.latitude.len() != course.altitude.len()
        || course.latitude.len() != course.distance.len()
    {
        warn!(
            points = course.latitude.len(),
            altitude = course.altitude.len(),
            distance = course.distance.len(),
            "course has missing data"
        );
    }
    if points.name.len() != points.latitude.len()
        || points.name.len() != points.longitude.len()
        || points.name.len() != points.point_type.len()
    {
        return Err(CourseError::malformed("course point field length mismatch"));
    }

    drop_straight_cues(&mut points);

    Ok((course, points))
}

/// "Straight" cues are noise in the cue sheet; remove them from every
/// parallel array.
fn drop_straight_cues(points: &mut RawCoursePoints) {
    let keep: Vec<bool> = points.point_type.iter().map(|t| t != "Straight").collect();
    if keep.iter().all(|k| *k) {
        return;
    }
    retain_by(&mut points.name, &keep);
    retain_by(&mut points.point_type, &keep);
    retain_by(&mut points.latitude, &keep);
    retain_by(&mut points.longitude, &keep);
    retain_by(&mut points.notes, &keep);
}

fn retain_by<T>(values: &mut Vec<T>, keep: &[bool]) {
    if values.len() != keep.len() {
        return;
    }
    let mut it = keep.iter();
    values.retain(|_| *it.next().unwrap_or(&true));
}

fn floats(re: &Regex, text: &str) -> Result<Vec<f64>, CourseError> {
    re.captures_iter(text)
        .map(|c| {
            c[1].trim()
                .parse::<f64>()
                .map_err(|e| CourseError::malformed(format!("bad number {:?}: {e}", &c[1])))
        })
        .collect()
}

fn strings(re: &Regex, text: &str) -> Vec<String> {
    re.captures_iter(text)
        .map(|c| c[1].trim().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tcx() -> String {
        let mut s = String::from(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<TrainingCenterDatabase>
 <Courses>
  <Course>
   <Name>Loop</Name>
   <Lap>
    <DistanceMeters>12286.5</DistanceMeters>
   </Lap>
   <Track>
"#,
        );
        for (i, (lat, lon, alt, dist)) in [
            (45.5787, -122.7132, 30.0, 0.0),
            (45.5790, -122.7132, 31.0, 33.4),
            (45.5793, -122.7135, 32.5, 74.1),
        ]
        .iter()
        .enumerate()
        {
            let _ = i;
            s.push_str(&format!(
                "<Trackpoint><Position><LatitudeDegrees>{lat}</LatitudeDegrees><LongitudeDegrees>{lon}</LongitudeDegrees></Position><AltitudeMeters>{alt}</AltitudeMeters><DistanceMeters>{dist}</DistanceMeters></Trackpoint>\n"
            ));
        }
        s.push_str(
            r#"   </Track>
   <CoursePoint>
    <Name>Right</Name>
    <PointType>Right</PointType>
    <Position><LatitudeDegrees>45.5790</LatitudeDegrees><LongitudeDegrees>-122.7132</LongitudeDegrees></Position>
    <Notes>NW Edgewater</Notes>
   </CoursePoint>
   <CoursePoint>
    <Name>Go straight</Name>
    <PointType>Straight</PointType>
    <Position><LatitudeDegrees>45.5793</LatitudeDegrees><LongitudeDegrees>-122.7135</LongitudeDegrees></Position>
    <Notes></Notes>
   </CoursePoint>
  </Course>
 </Courses>
</TrainingCenterDatabase>
"#,
        );
        s
    }

    #[test]
    fn parses_track_and_summary() {
        let (course, _) = load_str(&sample_tcx()).unwrap();
        assert_eq!(course.name.as_deref(), Some("Loop"));
        assert_eq!(course.distance_km, Some(12.3));
        assert_eq!(course.latitude.len(), 3);
        assert_eq!(course.longitude.len(), 3);
        assert_eq!(course.altitude, vec![30.0, 31.0, 32.5]);
        assert_eq!(course.distance[2], 74.1);
    }

    #[test]
    fn straight_cues_are_dropped() {
        let (_, points) = load_str(&sample_tcx()).unwrap();
        assert_eq!(points.name, vec!["Right"]);
        assert_eq!(points.point_type, vec!["Right"]);
        assert_eq!(points.latitude.len(), 1);
        assert_eq!(points.notes, vec!["NW Edgewater"]);
    }

    #[test]
    fn lat_lon_mismatch_is_malformed() {
        let tcx = r#"<Track>
<LatitudeDegrees>45.0</LatitudeDegrees><LongitudeDegrees>-122.0</LongitudeDegrees>
<LatitudeDegrees>45.1</LatitudeDegrees>
</Track>"#;
        assert!(matches!(
            load_str(tcx),
            Err(CourseError::Malformed(_))
        ));
    }

    #[test]
    fn missing_track_yields_empty_course() {
        let (course, points) = load_str("<TrainingCenterDatabase/>").unwrap();
        assert!(course.latitude.is_empty());
        assert!(points.name.is_empty());
    }
}
