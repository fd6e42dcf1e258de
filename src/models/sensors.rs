//! Sensor value snapshot.
//!
//! The core never talks to sensor hardware; it pulls one immutable snapshot
//! per recorder tick. Unknown values are NaN and every consumer propagates
//! NaN instead of inventing zeros.

/// GPS block of a snapshot.
#[derive(Debug, Clone, Copy)]
pub struct GpsValues {
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
    /// Speed over ground [m/s].
    pub speed: f64,
    /// Track angle [deg], NaN when stationary.
    pub track: f64,
    /// Fix mode (2 = 2D, 3 = 3D).
    pub mode: f64,
    pub used_sats: f64,
    pub total_sats: f64,
    /// Cumulative GPS distance [m].
    pub distance: f64,
}

/// Barometric/environment block of a snapshot.
#[derive(Debug, Clone, Copy)]
pub struct EnvironmentValues {
    pub temperature: f64,
    pub pressure: f64,
    /// Barometric altitude [m].
    pub altitude: f64,
    pub heading: f64,
    pub total_ascent: f64,
    pub total_descent: f64,
}

/// Fused values the recorder aggregates.
#[derive(Debug, Clone, Copy)]
pub struct IntegratedValues {
    pub heart_rate: f64,
    pub cadence: f64,
    /// Ride distance [m].
    pub distance: f64,
    /// Speed [m/s].
    pub speed: f64,
    pub power: f64,
    /// Accumulated work [J].
    pub accumulated_power: f64,
    /// Measured grade [%], NaN when unknown.
    pub grade: f64,
}

/// One snapshot of everything the core reads from the sensor layer.
#[derive(Debug, Clone, Copy)]
pub struct SensorValues {
    pub gps: GpsValues,
    pub environment: EnvironmentValues,
    pub integrated: IntegratedValues,
    /// Course altitude interpolated at the matched position [m], NaN when
    /// off course.
    pub course_altitude: f64,
    /// DEM altitude at the current position [m], NaN when unavailable.
    pub dem_altitude: f64,
}

impl Default for GpsValues {
    fn default() -> Self {
        Self {
            lat: f64::NAN,
            lon: f64::NAN,
            alt: f64::NAN,
            speed: f64::NAN,
            track: f64::NAN,
            mode: f64::NAN,
            used_sats: f64::NAN,
            total_sats: f64::NAN,
            distance: 0.0,
        }
    }
}

impl Default for EnvironmentValues {
    fn default() -> Self {
        Self {
            temperature: f64::NAN,
            pressure: f64::NAN,
            altitude: f64::NAN,
            heading: f64::NAN,
            total_ascent: f64::NAN,
            total_descent: f64::NAN,
        }
    }
}

impl Default for IntegratedValues {
    fn default() -> Self {
        Self {
            heart_rate: f64::NAN,
            cadence: f64::NAN,
            distance: f64::NAN,
            speed: f64::NAN,
            power: f64::NAN,
            accumulated_power: f64::NAN,
            grade: f64::NAN,
        }
    }
}

impl Default for SensorValues {
    fn default() -> Self {
        Self {
            gps: GpsValues::default(),
            environment: EnvironmentValues::default(),
            integrated: IntegratedValues::default(),
            course_altitude: f64::NAN,
            dem_altitude: f64::NAN,
        }
    }
}

/// NULL-mapping helper for database binds: NaN becomes `None`.
pub fn opt(v: f64) -> Option<f64> {
    if v.is_nan() {
        None
    } else {
        Some(v)
    }
}
