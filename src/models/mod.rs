//! Domain data model: courses, cues, the mutable course index, and the
//! sensor snapshot the recorder consumes.

pub mod course;
pub mod course_index;
pub mod sensors;
