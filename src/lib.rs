//! Core engine of a cycling head unit.
//!
//! The crate wires together six cooperating subsystems:
//! - course loading and on-course indexing ([`models::course`], [`services::indexer`])
//! - slippy-map tile caching and fetching ([`tiles`])
//! - terrain-RGB elevation lookup ([`tiles::dem`])
//! - ride recording into a sqlite log ([`services::recorder`], [`db`])
//! - activity export to FIT and CSV ([`export`])
//! - a shared connectivity gate for the uplink ([`net::gate`])
//!
//! Everything is driven by a 1 Hz logging tick plus the GPS fix stream; the
//! binary in `src/bin/headunit.rs` owns the runtime wiring.

pub mod algorithms;
pub mod config;
pub mod db;
pub mod error;
pub mod export;
pub mod loaders;
pub mod models;
pub mod net;
pub mod services;
pub mod state;
pub mod tiles;

pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use models::course::Course;
pub use models::course_index::CourseIndex;
pub use models::sensors::SensorValues;
