//! Numeric building blocks shared by the course model and the indexer.

pub mod filters;
pub mod geo;
pub mod rdp;
