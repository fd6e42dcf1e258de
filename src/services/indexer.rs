//! Per-fix course matching.
//!
//! Every GPS fix is projected onto the course polyline to find the segment
//! the rider is on. The scan is split into five ranges around the current
//! index, tried in order of likelihood:
//!
//! 1. just ahead of the index (a handful of segments)
//! 2. ahead up to the search range
//! 3. behind, back to the search range
//! 4. far ahead, rest of the course
//! 5. far behind, start of the course
//!
//! Ranges 3-5 are penalised: a candidate there only wins after the
//! confirmation buffer has seen nothing but penalised candidates, so a brief
//! GPS excursion near a parallel road does not teleport the index.
//!
//! Candidates must also face the right way (heading within the azimuth
//! window of the segment bearing) and, when a measured grade is available,
//! agree with the course profile about being on a climb.

use tracing::debug;

use crate::algorithms::geo;
use crate::config::CourseConfig;
use crate::models::course::Course;
use crate::models::course_index::CourseIndex;
use crate::models::sensors::SensorValues;
use crate::services::altimeter::{Recalibration, RecalibrationSender};

/// Upper bound of the first scan range, in segments past the index.
const NEAR_AHEAD_SEGMENTS: usize = 5;
/// Scan ranges below this position in the table are not penalised.
const PENALTY_INDEX: usize = 2;

pub struct CourseIndexer {
    cfg: CourseConfig,
    recalibrate: Option<RecalibrationSender>,
    altitude_sent: bool,
}

impl CourseIndexer {
    pub fn new(cfg: &CourseConfig) -> Self {
        Self {
            cfg: cfg.clone(),
            recalibrate: None,
            altitude_sent: false,
        }
    }

    /// Publish the course altitude of the first successful match on `tx`.
    pub fn with_recalibration(cfg: &CourseConfig, tx: RecalibrationSender) -> Self {
        Self {
            cfg: cfg.clone(),
            recalibrate: Some(tx),
            altitude_sent: false,
        }
    }

    /// Re-arm the one-shot recalibration, called on course load/reset.
    pub fn reset(&mut self) {
        self.altitude_sent = false;
    }

    /// Match one fix against the course and update `index` in place.
    pub fn update(&mut self, course: &Course, index: &mut CourseIndex, values: &SensorValues) {
        let n = course.latitude.len();
        if n < 2 || values.gps.lat.is_nan() || values.gps.lon.is_nan() {
            return;
        }
        let segments = n - 1;
        let start = index.segment.min(segments - 1);

        let forward = (start + NEAR_AHEAD_SEGMENTS).min(n - 1);
        let forward_next =
            index_with_distance_cutoff(&course.distance, start, course.search_range_km)
                .max(forward);
        let backward = index_with_distance_cutoff(&course.distance, start, -course.search_range_km);

        // everything below works in degree space until a candidate survives;
        // only then is the real on-route distance measured
        let track = values.gps.track;
        let azimuth_diff: Vec<f64> = course
            .azimuth
            .iter()
            .map(|a| {
                if track.is_nan() {
                    f64::NAN
                } else {
                    (track - a).rem_euclid(360.0)
                }
            })
            .collect();
        let mut inner_p = Vec::with_capacity(segments);
        let mut dist_diff = Vec::with_capacity(segments);
        for s in 0..segments {
            let p_a_x = values.gps.lon - course.longitude[s];
            let p_a_y = values.gps.lat - course.latitude[s];
            let ip = (course.seg_dx[s] * p_a_x + course.seg_dy[s] * p_a_y) / course.seg_len2[s];
            inner_p.push(ip);
            let d = if ip <= 0.0 {
                (p_a_x * p_a_x + p_a_y * p_a_y).sqrt()
            } else if ip >= 1.0 {
                let p_b_x = values.gps.lon - course.longitude[s + 1];
                let p_b_y = values.gps.lat - course.latitude[s + 1];
                (p_b_x * p_b_x + p_b_y * p_b_y).sqrt()
            } else {
                (course.seg_dx[s] * p_a_y - course.seg_dy[s] * p_a_x).abs() / course.seg_len[s]
            };
            dist_diff.push(d);
        }

        let ranges = [
            (start, forward),
            (forward, forward_next),
            (backward, start),
            (forward_next, n - 1),
            (0, backward),
        ];

        for (range_i, &(s0, s1)) in ranges.iter().enumerate() {
            if s0 == s1 {
                continue;
            }
            let end = if s1 >= n - 1 { segments } else { s1 };
            if s0 >= end {
                continue;
            }
            let m = s0
                + argmin(
                    (s0..end).map(|i| {
                        if azimuth_ok(azimuth_diff[i], self.cfg.azimuth_cutoff_deg) {
                            dist_diff[i]
                        } else {
                            f64::INFINITY
                        }
                    }),
                );
            if azimuth_diff[m].is_nan()
                || !azimuth_ok(azimuth_diff[m], self.cfg.azimuth_cutoff_deg)
            {
                continue;
            }

            // on a climb in reality but not on the course at m (or the other
            // way round) means m is the wrong stretch of road
            if let (false, Some(&slope), Some(&cutoff)) = (
                values.integrated.grade.is_nan(),
                course.slope_smoothing.get(m),
                self.cfg.slope_cutoff_pct.first(),
            ) {
                if (values.integrated.grade > cutoff) != (slope > cutoff) {
                    continue;
                }
            }

            // before the first point or past the last one: off course at a
            // well-defined position
            if m == 0 && inner_p[0] <= 0.0 {
                index.on_course = false;
                index.segment = 0;
                index.along_distance_m = 0.0;
                index.altitude = f64::NAN;
                return;
            }
            if m == segments - 1 && inner_p[m] >= 1.0 {
                index.on_course = false;
                index.segment = n - 1;
                index.along_distance_m = course.distance[n - 1] * 1000.0;
                index.altitude = f64::NAN;
                return;
            }

            let h_lon = course.longitude[m] + course.seg_dx[m] * inner_p[m];
            let h_lat = course.latitude[m] + course.seg_dy[m] * inner_p[m];
            let dist_diff_h = geo::dist_on_earth(h_lon, h_lat, values.gps.lon, values.gps.lat);
            if dist_diff_h > self.cfg.on_route_cutoff_m {
                continue;
            }

            let forward_range = range_i < PENALTY_INDEX;
            let jump_allowed = index.observe(forward_range);
            if !forward_range && !jump_allowed {
                debug!(candidate = m, range = range_i, "penalised match pending");
                continue;
            }

            let dist_along_m =
                geo::dist_on_earth(course.longitude[m], course.latitude[m], h_lon, h_lat);
            index.on_course = true;
            index.segment = m;
            index.along_distance_m = course.distance[m] * 1000.0 + dist_along_m;
            index.altitude = if m + 1 < course.altitude.len() {
                let seg_m = (course.distance[m + 1] - course.distance[m]) * 1000.0;
                course.altitude[m]
                    + (course.altitude[m + 1] - course.altitude[m]) / seg_m * dist_along_m
            } else {
                f64::NAN
            };
            self.update_next_course_point(course, index);
            self.maybe_recalibrate(index);
            return;
        }

        index.on_course = false;
    }

    fn update_next_course_point(&self, course: &Course, index: &mut CourseIndex) {
        let cp = &course.course_points;
        if cp.distance.is_empty() {
            return;
        }
        let here_km = index.along_distance_m / 1000.0;
        let mut cp_m = argmin(cp.distance.iter().map(|d| (d - here_km).abs()));
        if cp.distance[cp_m] < here_km {
            cp_m += 1;
        }
        index.next_course_point = cp_m.min(cp.distance.len() - 1);
    }

    fn maybe_recalibrate(&mut self, index: &CourseIndex) {
        if self.altitude_sent || index.altitude.is_nan() {
            return;
        }
        if let Some(tx) = &self.recalibrate {
            let _ = tx.send(Recalibration {
                altitude_m: index.altitude,
            });
            debug!(altitude = index.altitude, "altimeter recalibration sent");
        }
        self.altitude_sent = true;
    }
}

/// Index of the course point closest to `distance[start] + range_km`.
fn index_with_distance_cutoff(distance: &[f64], start: usize, range_km: f64) -> usize {
    let n = distance.len();
    if n == 0 {
        return 0;
    }
    let dist_to = distance[start.min(n - 1)] + range_km;
    if dist_to >= distance[n - 1] {
        return n - 1;
    }
    if dist_to <= 0.0 {
        return 0;
    }
    if range_km >= 0.0 {
        start + argmin(distance[start..].iter().map(|d| (d - dist_to).abs()))
    } else if start == 0 {
        0
    } else {
        argmin(distance[..start].iter().map(|d| (d - dist_to).abs()))
    }
}

fn azimuth_ok(diff_deg: f64, cutoff_deg: f64) -> bool {
    (0.0..=cutoff_deg).contains(&diff_deg)
        || ((360.0 - cutoff_deg)..=360.0).contains(&diff_deg)
}

fn argmin(values: impl Iterator<Item = f64>) -> usize {
    let mut best = 0;
    let mut best_v = f64::INFINITY;
    for (i, v) in values.enumerate() {
        if v < best_v {
            best = i;
            best_v = v;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argmin_prefers_first_on_ties() {
        assert_eq!(argmin([3.0, 1.0, 1.0, 2.0].into_iter()), 1);
        assert_eq!(argmin([f64::INFINITY, f64::INFINITY].into_iter()), 0);
    }

    #[test]
    fn azimuth_window_wraps_around_north() {
        assert!(azimuth_ok(0.0, 60.0));
        assert!(azimuth_ok(59.9, 60.0));
        assert!(!azimuth_ok(61.0, 60.0));
        assert!(azimuth_ok(305.0, 60.0));
        assert!(!azimuth_ok(180.0, 60.0));
        assert!(!azimuth_ok(f64::NAN, 60.0));
    }

    #[test]
    fn distance_cutoff_clamps_to_the_course() {
        let d = [0.0, 1.0, 2.0, 3.0, 4.0];
        assert_eq!(index_with_distance_cutoff(&d, 0, 10.0), 4);
        assert_eq!(index_with_distance_cutoff(&d, 2, -10.0), 0);
        assert_eq!(index_with_distance_cutoff(&d, 1, 1.4), 2);
        assert_eq!(index_with_distance_cutoff(&d, 3, -1.4), 2);
        assert_eq!(index_with_distance_cutoff(&d, 0, -1.0), 0);
    }
}
