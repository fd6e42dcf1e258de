//! Loaded course and its derived geometry.
//!
//! `Course::load` runs the whole pipeline: parse the TCX, thin the
//! polyline, rebuild cumulative distance when the file lacks it, smooth
//! altitude and slope, detect climbs and snap the cue sheet onto the
//! track. Everything the per-fix indexer needs (segment vectors, squared
//! lengths, azimuths, smoothed slope) is precomputed here so the hot path
//! stays allocation-light.

use std::path::Path;

use tracing::{info, warn};

use crate::algorithms::{filters, geo, rdp};
use crate::config::CourseConfig;
use crate::error::CourseError;
use crate::loaders::tcx;

/// Altitude smoothing window for the Savitzky-Golay pass.
const ALTITUDE_WINDOW: usize = 53;
const ALTITUDE_POLYORDER: usize = 3;
/// Number of widening slope windows tried per point.
const SLOPE_WINDOWS: usize = 4;
/// Forward/backward low-pass coefficient for the smoothed slope.
const SLOPE_LP_COEFF: f64 = 0.15;
/// RDP tolerance on (lon, lat) [deg].
const TRACK_EPSILON: f64 = 0.0001;
/// RDP tolerance on (distance, altitude) [m].
const PROFILE_EPSILON: f64 = 10.0;
/// Cues closer than this to the last track point need no synthetic "End".
const END_CUE_CUTOFF_M: f64 = 5.0;

/// Summary block from the course file header.
#[derive(Debug, Default, Clone)]
pub struct CourseInfo {
    pub name: Option<String>,
    /// Stated course length [km], one decimal.
    pub distance_km: Option<f64>,
}

/// Cue sheet, parallel arrays in track order.
#[derive(Debug, Default, Clone)]
pub struct CoursePoints {
    pub name: Vec<String>,
    pub point_type: Vec<String>,
    pub latitude: Vec<f64>,
    pub longitude: Vec<f64>,
    /// Along-course distance [km], filled by cue snapping when absent.
    pub distance: Vec<f64>,
    pub altitude: Vec<f64>,
    pub notes: Vec<String>,
}

impl CoursePoints {
    pub fn is_set(&self) -> bool {
        !self.name.is_empty()
    }

    pub fn len(&self) -> usize {
        self.name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty()
    }
}

/// One detected climb with its summit cue data.
#[derive(Debug, Clone)]
pub struct ClimbSegment {
    pub start: usize,
    pub end: usize,
    pub distance_km: f64,
    pub average_grade_pct: f64,
    /// distance * grade, the categorisation metric.
    pub volume: f64,
    pub category: String,
    pub summit_distance_km: f64,
    pub summit_altitude: f64,
    pub summit_latitude: f64,
    pub summit_longitude: f64,
}

/// The loaded course and everything derived from it.
#[derive(Debug, Default, Clone)]
pub struct Course {
    pub info: CourseInfo,
    pub latitude: Vec<f64>,
    pub longitude: Vec<f64>,
    /// Smoothed altitude [m], may be empty.
    pub altitude: Vec<f64>,
    /// Cumulative distance [km].
    pub distance: Vec<f64>,
    pub course_points: CoursePoints,

    /// Segment bearing per point pair [deg], length n-1.
    pub azimuth: Vec<f64>,
    /// Per-segment longitude delta, length n-1.
    pub seg_dx: Vec<f64>,
    /// Per-segment latitude delta, length n-1.
    pub seg_dy: Vec<f64>,
    /// dx^2 + dy^2 per segment.
    pub seg_len2: Vec<f64>,
    pub seg_len: Vec<f64>,

    /// Low-pass filtered grade [%], one per point.
    pub slope_smoothing: Vec<f64>,
    /// Slope bucket per point, index into the slope cutoff table.
    pub slope_bucket: Vec<u8>,
    pub climb_segments: Vec<ClimbSegment>,

    /// Effective indexer search range [km], widened for sparse tracks.
    pub search_range_km: f64,
}

impl Course {
    pub fn new(cfg: &CourseConfig) -> Self {
        Self {
            search_range_km: cfg.search_range_km,
            ..Self::default()
        }
    }

    pub fn is_set(&self) -> bool {
        !self.latitude.is_empty()
    }

    pub fn reset(&mut self, cfg: &CourseConfig) {
        *self = Self::new(cfg);
    }

    pub fn load(path: &Path, cfg: &CourseConfig) -> Result<Self, CourseError> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        if !ext.eq_ignore_ascii_case("tcx") {
            return Err(CourseError::UnsupportedFormat(ext.to_string()));
        }
        let (raw, raw_points) = tcx::load_file(path)?;
        let mut course = Self::from_raw(raw, raw_points, cfg);
        course.process(cfg);
        info!(
            name = course.info.name.as_deref().unwrap_or("-"),
            points = course.latitude.len(),
            cues = course.course_points.len(),
            climbs = course.climb_segments.len(),
            "course loaded"
        );
        Ok(course)
    }

    fn from_raw(raw: tcx::RawCourse, raw_points: tcx::RawCoursePoints, cfg: &CourseConfig) -> Self {
        let mut course = Self::new(cfg);
        course.info = CourseInfo {
            name: raw.name,
            distance_km: raw.distance_km,
        };
        course.latitude = raw.latitude;
        course.longitude = raw.longitude;
        // mismatched optional arrays are unusable, drop them
        course.altitude = if raw.altitude.len() == course.latitude.len() {
            raw.altitude
        } else {
            if !raw.altitude.is_empty() {
                warn!("dropping altitude column with mismatched length");
            }
            Vec::new()
        };
        course.distance = if raw.distance.len() == course.latitude.len() {
            raw.distance
        } else {
            if !raw.distance.is_empty() {
                warn!("dropping distance column with mismatched length");
            }
            Vec::new()
        };
        course.course_points = CoursePoints {
            name: raw_points.name,
            point_type: raw_points.point_type,
            latitude: raw_points.latitude,
            longitude: raw_points.longitude,
            distance: Vec::new(),
            altitude: Vec::new(),
            notes: raw_points.notes,
        };
        course
    }

    /// Run the full derivation pipeline on freshly parsed arrays.
    pub fn process(&mut self, cfg: &CourseConfig) {
        self.downsample(cfg);
        self.calc_slope_smoothing(cfg);
        self.modify_course_points(cfg);
    }

    /// Thin the polyline, convert distance to km, and precompute the
    /// per-segment vectors the indexer projects onto.
    fn downsample(&mut self, cfg: &CourseConfig) {
        let n = self.latitude.len();
        if n == 0 {
            return;
        }

        let track: Vec<(f64, f64)> = self
            .longitude
            .iter()
            .zip(&self.latitude)
            .map(|(&x, &y)| (x, y))
            .collect();
        let mut keep = rdp::rdp_mask(&track, TRACK_EPSILON);
        if !self.altitude.is_empty() && !self.distance.is_empty() {
            // keep points that matter for the elevation profile too
            let profile: Vec<(f64, f64)> = self
                .distance
                .iter()
                .zip(&self.altitude)
                .map(|(&x, &y)| (x, y))
                .collect();
            for (k, p) in keep.iter_mut().zip(rdp::rdp_mask(&profile, PROFILE_EPSILON)) {
                *k |= p;
            }
        }
        apply_mask(&mut self.latitude, &keep);
        apply_mask(&mut self.longitude, &keep);
        apply_mask(&mut self.altitude, &keep);
        apply_mask(&mut self.distance, &keep);

        for d in &mut self.distance {
            *d /= 1000.0;
        }
        if self.distance.is_empty() {
            self.distance = cumulative_distance_km(&self.longitude, &self.latitude);
        }

        self.azimuth = geo::calc_azimuth(&self.latitude, &self.longitude);
        let n = self.latitude.len();
        self.seg_dx = (1..n).map(|i| self.longitude[i] - self.longitude[i - 1]).collect();
        self.seg_dy = (1..n).map(|i| self.latitude[i] - self.latitude[i - 1]).collect();
        self.seg_len2 = self
            .seg_dx
            .iter()
            .zip(&self.seg_dy)
            .map(|(x, y)| x * x + y * y)
            .collect();
        self.seg_len = self.seg_len2.iter().map(|v| v.sqrt()).collect();

        if let Some(smoothed) =
            filters::savitzky_golay(&self.altitude, ALTITUDE_WINDOW, ALTITUDE_POLYORDER)
        {
            self.altitude = smoothed;
        }

        // widen the indexer search range when the track is sparse enough
        // that the default window could miss the nearest segment
        let max_step_m = (1..n)
            .map(|i| (self.distance[i] - self.distance[i - 1]) * 1000.0)
            .fold(0.0_f64, f64::max);
        let widened = max_step_m.floor() * 2.0 / 1000.0;
        if widened > cfg.search_range_km {
            info!(search_range_km = widened, "widened course search range");
            self.search_range_km = widened;
        } else {
            self.search_range_km = cfg.search_range_km;
        }
    }

    /// Grade per point, computed over widening distance windows so short
    /// noisy segments don't dominate, then low-pass filtered both ways.
    fn calc_slope_smoothing(&mut self, cfg: &CourseConfig) {
        let n = self.distance.len();
        self.slope_smoothing = Vec::new();
        self.slope_bucket = vec![0; n];
        self.climb_segments = Vec::new();
        if n < 2 * SLOPE_WINDOWS || self.altitude.len() != n {
            return;
        }

        let d = &self.distance;
        let a = &self.altitude;
        let mut dist_diff = vec![vec![0.0; n]; SLOPE_WINDOWS];
        let mut grade = vec![vec![0.0; n]; SLOPE_WINDOWS];
        for i in 1..n {
            dist_diff[0][i] = d[i] - d[i - 1];
            grade[0][i] = slope_pct(a[i] - a[i - 1], dist_diff[0][i]);
        }
        for w in 1..SLOPE_WINDOWS {
            for i in w..n - w {
                dist_diff[w][i] = d[i + w] - d[i - w];
                grade[w][i] = slope_pct(a[i + w] - a[i - w], dist_diff[w][i]);
            }
            for i in 0..w {
                dist_diff[w][i] = d[i + w] - d[0];
                grade[w][i] = slope_pct(a[i + w] - a[0], dist_diff[w][i]);
            }
            for i in n - w..n {
                dist_diff[w][i] = d[n - 1] - d[i - w];
                grade[w][i] = slope_pct(a[n - 1] - a[i - w], dist_diff[w][i]);
            }
        }

        // per point, take the narrowest window that spans enough distance
        let mut grade_mod = vec![0.0; n];
        let mut settled = vec![false; n];
        for w in 0..SLOPE_WINDOWS {
            for i in 0..n {
                if settled[i] {
                    continue;
                }
                if w == SLOPE_WINDOWS - 1 || dist_diff[w][i] >= cfg.climb_distance_cutoff_km {
                    grade_mod[i] = grade[w][i];
                    settled[i] = true;
                }
            }
        }

        self.slope_smoothing = filters::low_pass_forward_backward(&grade_mod, SLOPE_LP_COEFF);
        for (bucket, s) in self.slope_bucket.iter_mut().zip(&self.slope_smoothing) {
            *bucket = cfg
                .slope_cutoff_pct
                .iter()
                .take_while(|cutoff| *s > **cutoff)
                .count() as u8;
        }

        self.detect_climbs(cfg);
    }

    fn detect_climbs(&mut self, cfg: &CourseConfig) {
        let n = self.slope_bucket.len();
        if n < 2 {
            return;
        }
        let mut start: Option<usize> = None;
        for i in 0..n {
            let cat = self.slope_bucket[i];
            if start.is_none() && cat >= 2 {
                start = Some(i);
                continue;
            }
            let Some(s) = start else { continue };
            if i == 0 {
                continue;
            }
            if self.slope_bucket[i - 1] >= 1 && (cat < 1 || i == n - 1) {
                self.push_climb(s, i, cfg);
                start = None;
            }
        }
    }

    fn push_climb(&mut self, start: usize, end: usize, cfg: &CourseConfig) {
        let distance_km = self.distance[end] - self.distance[start];
        let alt_diff = self.altitude[end] - self.altitude[start];
        let grade = slope_pct(alt_diff, distance_km);
        let volume = distance_km * 1000.0 * grade;
        if distance_km < cfg.climb_distance_cutoff_km
            || grade < cfg.climb_grade_cutoff_pct
            || cfg
                .climb_categories
                .first()
                .map(|c| volume < c.volume)
                .unwrap_or(false)
        {
            return;
        }
        let category = cfg
            .climb_categories
            .iter()
            .rev()
            .find(|c| volume > c.volume)
            .map(|c| c.name.clone())
            .unwrap_or_default();
        self.climb_segments.push(ClimbSegment {
            start,
            end,
            distance_km,
            average_grade_pct: grade,
            volume,
            category,
            summit_distance_km: self.distance[end],
            summit_altitude: self.altitude[end],
            summit_latitude: self.latitude[end],
            summit_longitude: self.longitude[end],
        });
    }

    /// Snap every cue onto the track and synthesise Start/End cues.
    ///
    /// The scan index only moves forward, so a cue sheet in track order
    /// snaps in one pass even on self-crossing courses.
    fn modify_course_points(&mut self, cfg: &CourseConfig) {
        let cp = &mut self.course_points;
        let n_pts = cp.len();
        let segs = self.seg_dx.len();
        let fill_distance = cp.distance.is_empty() && !self.distance.is_empty();
        let fill_altitude = cp.altitude.is_empty() && !self.altitude.is_empty();
        if fill_distance {
            cp.distance = vec![0.0; n_pts];
        }
        if fill_altitude {
            cp.altitude = vec![0.0; n_pts];
        }

        let mut min_index = 0usize;
        for i in 0..n_pts {
            let mut min_j: Option<usize> = None;
            let mut min_dist_diff_h = f64::INFINITY;
            let mut min_dist_delta = 0.0;
            let mut min_alt_delta = 0.0;
            for j in 0..segs.saturating_sub(min_index) {
                // a match far past the best one so far is a different
                // part of a self-crossing course
                if matches!(min_j, Some(mj) if j > mj + 2) {
                    continue;
                }
                let s = min_index + j;
                let p_a_x = cp.longitude[i] - self.longitude[s];
                let p_a_y = cp.latitude[i] - self.latitude[s];
                let inner_p = (self.seg_dx[s] * p_a_x + self.seg_dy[s] * p_a_y) / self.seg_len2[s];
                if !(0.0..=1.0).contains(&inner_p) {
                    continue;
                }
                let h_lon = self.longitude[s] + self.seg_dx[s] * inner_p;
                let h_lat = self.latitude[s] + self.seg_dy[s] * inner_p;
                let dist_diff_h = geo::dist_on_earth(h_lon, h_lat, cp.longitude[i], cp.latitude[i]);
                if dist_diff_h < cfg.on_route_cutoff_m && dist_diff_h < min_dist_diff_h {
                    min_j = Some(j);
                    min_dist_diff_h = dist_diff_h;
                    min_dist_delta = geo::dist_on_earth(
                        self.longitude[s],
                        self.latitude[s],
                        h_lon,
                        h_lat,
                    ) / 1000.0;
                    if fill_altitude && !self.distance.is_empty() {
                        let seg_km = self.distance[s + 1] - self.distance[s];
                        min_alt_delta =
                            (self.altitude[s + 1] - self.altitude[s]) / seg_km * min_dist_delta;
                    }
                }
            }
            min_index += min_j.unwrap_or(0);
            if fill_distance {
                cp.distance[i] = self.distance[min_index] + min_dist_delta;
            }
            if fill_altitude {
                cp.altitude[i] = self.altitude[min_index] + min_alt_delta;
            }
        }

        // synthetic cue at km 0 when the sheet starts mid-course
        if cp.is_set()
            && !cp.distance.is_empty()
            && !self.distance.is_empty()
            && cp.distance[0] != 0.0
        {
            cp.name.insert(0, "Start".to_string());
            cp.point_type.insert(0, String::new());
            cp.notes.insert(0, String::new());
            cp.latitude.insert(0, self.latitude[0]);
            cp.longitude.insert(0, self.longitude[0]);
            cp.distance.insert(0, 0.0);
            if !cp.altitude.is_empty() && !self.altitude.is_empty() {
                cp.altitude.insert(0, self.altitude[0]);
            }
        }

        // synthetic cue at the finish when the last cue stops short
        if cp.is_set() && !cp.distance.is_empty() && !self.distance.is_empty() {
            let last = self.latitude.len() - 1;
            let end_distance = geo::dist_on_earth(
                self.longitude[last],
                self.latitude[last],
                *cp.longitude.last().unwrap_or(&f64::NAN),
                *cp.latitude.last().unwrap_or(&f64::NAN),
            );
            if end_distance > END_CUE_CUTOFF_M {
                cp.name.push("End".to_string());
                cp.point_type.push(String::new());
                cp.notes.push(String::new());
                cp.latitude.push(self.latitude[last]);
                cp.longitude.push(self.longitude[last]);
                cp.distance.push(self.distance[last]);
                if !cp.altitude.is_empty() && !self.altitude.is_empty() {
                    cp.altitude.push(self.altitude[last]);
                }
            }
        }
    }
}

fn slope_pct(alt_diff_m: f64, dist_km: f64) -> f64 {
    alt_diff_m / (dist_km * 1000.0) * 100.0
}

fn apply_mask(values: &mut Vec<f64>, keep: &[bool]) {
    if values.len() != keep.len() {
        return;
    }
    let mut it = keep.iter();
    values.retain(|_| *it.next().unwrap_or(&true));
}

fn cumulative_distance_km(longitude: &[f64], latitude: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(latitude.len());
    if latitude.is_empty() {
        return out;
    }
    out.push(0.0);
    let mut acc = 0.0;
    for i in 1..latitude.len() {
        acc += geo::dist_on_earth(
            longitude[i - 1],
            latitude[i - 1],
            longitude[i],
            latitude[i],
        ) / 1000.0;
        out.push(acc);
    }
    out
}
