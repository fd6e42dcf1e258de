//! Long-lived services driven by the GPS fix stream and the logging tick.

pub mod altimeter;
pub mod indexer;
pub mod recorder;

#[cfg(test)]
mod recorder_tests;
