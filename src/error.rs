//! Error types for the core subsystems.
//!
//! Each subsystem surface gets its own enum; `CoreError` is the crate-level
//! umbrella used at the wiring layer. All of them are cheap to construct from
//! a message, which keeps call sites short.

/// Result type used across the crate.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors from course loading and processing.
#[derive(Debug, thiserror::Error)]
pub enum CourseError {
    /// The file could not be read.
    #[error("course file error: {0}")]
    Io(#[from] std::io::Error),

    /// The file parsed, but its contents are inconsistent (for example a
    /// latitude/longitude length mismatch). The course is reset to empty.
    #[error("malformed course: {0}")]
    Malformed(String),

    /// The extension is not handled by any loader.
    #[error("unsupported course format: .{0}")]
    UnsupportedFormat(String),
}

impl CourseError {
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed(message.into())
    }
}

/// Errors from the tile cache and fetcher.
#[derive(Debug, thiserror::Error)]
pub enum TileError {
    #[error("tile store error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors from the recorder and its log database.
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    #[error("log database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("log file error: {0}")]
    Io(#[from] std::io::Error),

    /// A reset was requested but the export of the current ride failed.
    /// The database is left in place.
    #[error("reset aborted: {0}")]
    ResetAborted(String),
}

/// Errors from the activity exporters.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("log database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("output file error: {0}")]
    Io(#[from] std::io::Error),

    /// The log holds no rows, so there is nothing to export.
    #[error("empty activity log")]
    EmptyLog,
}

/// Errors from the session-state store.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("state file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("state encode error: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Crate-level umbrella error.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error(transparent)]
    Course(#[from] CourseError),

    #[error(transparent)]
    Tile(#[from] TileError),

    #[error(transparent)]
    Recorder(#[from] RecorderError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl CoreError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
