//! Mutable "where am I on the course" state.

/// Position on the loaded course, updated once per GPS fix by the indexer.
///
/// `confirmation` is the sliding buffer that delays jumps to penalised scan
/// ranges: it holds one entry per recent accepted fix, `true` for the
/// forward ranges and `false` for the penalised ones. A penalised candidate
/// is only accepted once the buffer contains no `true` entry.
#[derive(Debug, Clone)]
pub struct CourseIndex {
    /// Segment index of the last accepted match.
    pub segment: usize,
    /// Index of the next course point (cue) ahead.
    pub next_course_point: usize,
    /// Along-course distance [m].
    pub along_distance_m: f64,
    /// Course altitude interpolated at the current position [m].
    pub altitude: f64,
    pub on_course: bool,
    confirmation: Vec<bool>,
}

impl CourseIndex {
    pub fn new(keep_on_course_cutoff: usize) -> Self {
        Self {
            segment: 0,
            next_course_point: 0,
            along_distance_m: 0.0,
            altitude: f64::NAN,
            on_course: false,
            confirmation: vec![true; keep_on_course_cutoff],
        }
    }

    /// Back to the state right after a course load.
    pub fn reset(&mut self) {
        let n = self.confirmation.len();
        *self = Self::new(n);
    }

    /// Record one accepted observation and report whether a penalised jump
    /// is allowed. Shifts the buffer left, pushes `forward`, and returns
    /// true only when every remaining entry is penalised.
    pub fn observe(&mut self, forward: bool) -> bool {
        self.confirmation.rotate_left(1);
        if let Some(last) = self.confirmation.last_mut() {
            *last = forward;
        }
        !forward && self.confirmation.iter().all(|v| !v)
    }
}
