//! Altimeter recalibration messages.
//!
//! The barometric altimeter drifts with weather; the first successful course
//! match carries a trustworthy altitude, which the indexer publishes here
//! exactly once per loaded course. The sensor side owns the receiver.

use tokio::sync::mpsc;

/// One recalibration request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Recalibration {
    /// Course altitude at the matched position [m].
    pub altitude_m: f64,
}

pub type RecalibrationSender = mpsc::UnboundedSender<Recalibration>;
pub type RecalibrationReceiver = mpsc::UnboundedReceiver<Recalibration>;

pub fn recalibration_channel() -> (RecalibrationSender, RecalibrationReceiver) {
    mpsc::unbounded_channel()
}
