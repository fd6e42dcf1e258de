//! Geodesy helpers.
//!
//! Distances are returned in meters, azimuths in degrees `[0, 360)`.

/// Equatorial radius [km].
pub const GEO_R1: f64 = 6378.137;
/// Polar radius [km].
pub const GEO_R2: f64 = 6356.752_314_140;

const GEO_R1_2: f64 = (GEO_R1 * 1000.0) * (GEO_R1 * 1000.0);
const GEO_R2_2: f64 = (GEO_R2 * 1000.0) * (GEO_R2 * 1000.0);
const GEO_E2: f64 = (GEO_R1_2 - GEO_R2_2) / GEO_R1_2;

/// Compass sector names, north first, wrapping back to north.
const TRACK_STR: [&str; 9] = ["N", "NE", "E", "SE", "S", "SW", "W", "NW", "N"];

/// Great-circle distance between two positions [m], spherical law of cosines.
pub fn dist_on_earth(p0_lon: f64, p0_lat: f64, p1_lon: f64, p1_lat: f64) -> f64 {
    if p0_lon == p1_lon && p0_lat == p1_lat {
        return 0.0;
    }
    let (r0_lon, r0_lat) = (p0_lon.to_radians(), p0_lat.to_radians());
    let (r1_lon, r1_lat) = (p1_lon.to_radians(), p1_lat.to_radians());
    let delta_x = r1_lon - r0_lon;
    let cos_d =
        r0_lat.sin() * r1_lat.sin() + r0_lat.cos() * r1_lat.cos() * delta_x.cos();
    // rounding can push cos_d a hair outside [-1, 1]
    1000.0 * cos_d.clamp(-1.0, 1.0).acos() * GEO_R1
}

/// Hubeny's formula [m]; more accurate than the spherical distance at short
/// range on the ellipsoid.
pub fn dist_on_earth_hubeny(p0_lon: f64, p0_lat: f64, p1_lon: f64, p1_lat: f64) -> f64 {
    if p0_lon == p1_lon && p0_lat == p1_lat {
        return 0.0;
    }
    let (r0_lon, r0_lat) = (p0_lon.to_radians(), p0_lat.to_radians());
    let (r1_lon, r1_lat) = (p1_lon.to_radians(), p1_lat.to_radians());
    let lat_t = (r0_lat + r1_lat) / 2.0;
    let w = 1.0 - GEO_E2 * lat_t.sin() * lat_t.sin();
    let c2 = lat_t.cos() * lat_t.cos();
    ((GEO_R2_2 / (w * w * w)) * (r0_lat - r1_lat) * (r0_lat - r1_lat)
        + (GEO_R1_2 / w) * c2 * (r0_lon - r1_lon) * (r0_lon - r1_lon))
        .sqrt()
}

/// Pairwise distances along a polyline [m]; output length is `len - 1`.
pub fn dist_on_earth_series(lat: &[f64], lon: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(lat.len().saturating_sub(1));
    for i in 1..lat.len() {
        out.push(dist_on_earth(lon[i - 1], lat[i - 1], lon[i], lat[i]));
    }
    out
}

/// Bearing from each point to its successor [deg]; output length is `len - 1`.
pub fn calc_azimuth(lat: &[f64], lon: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(lat.len().saturating_sub(1));
    for i in 1..lat.len() {
        let r_lat0 = lat[i - 1].to_radians();
        let r_lat1 = lat[i].to_radians();
        let delta = (lon[i] - lon[i - 1]).to_radians();
        let az = delta
            .sin()
            .atan2(r_lat0.cos() * r_lat1.tan() - r_lat0.sin() * delta.cos())
            .to_degrees()
            .rem_euclid(360.0);
        out.push(az);
    }
    out
}

/// Compass sector name for a track angle, `None` for NaN.
pub fn track_str(track_deg: f64) -> Option<&'static str> {
    if track_deg.is_nan() {
        return None;
    }
    let idx = ((track_deg + 22.5) / 45.0) as usize;
    TRACK_STR.get(idx).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn one_degree_of_longitude_at_the_equator() {
        let d = dist_on_earth(0.0, 0.0, 1.0, 0.0);
        // 2 * pi * R1 / 360
        assert!((d - 111_319.49).abs() < 1.0, "got {d}");
    }

    #[test]
    fn zero_distance_for_identical_points() {
        assert_eq!(dist_on_earth(139.7, 35.6, 139.7, 35.6), 0.0);
        assert_eq!(dist_on_earth_hubeny(139.7, 35.6, 139.7, 35.6), 0.0);
    }

    #[test]
    fn hubeny_close_to_spherical_at_short_range() {
        let s = dist_on_earth(139.70, 35.60, 139.71, 35.61);
        let h = dist_on_earth_hubeny(139.70, 35.60, 139.71, 35.61);
        assert!((s - h).abs() / s < 0.01, "spherical {s}, hubeny {h}");
    }

    #[test]
    fn azimuth_cardinal_directions() {
        let north = calc_azimuth(&[0.0, 1.0], &[0.0, 0.0]);
        assert!((north[0] - 0.0).abs() < 0.1);
        let east = calc_azimuth(&[0.0, 0.0], &[0.0, 1.0]);
        assert!((east[0] - 90.0).abs() < 0.1);
        let south = calc_azimuth(&[1.0, 0.0], &[0.0, 0.0]);
        assert!((south[0] - 180.0).abs() < 0.1);
        let west = calc_azimuth(&[0.0, 0.0], &[1.0, 0.0]);
        assert!((west[0] - 270.0).abs() < 0.1);
    }

    #[test]
    fn track_sector_names() {
        assert_eq!(track_str(0.0), Some("N"));
        assert_eq!(track_str(44.0), Some("NE"));
        assert_eq!(track_str(90.0), Some("E"));
        assert_eq!(track_str(359.0), Some("N"));
        assert_eq!(track_str(f64::NAN), None);
    }
}
