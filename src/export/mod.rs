//! Activity exporters. Both read the log database on their own connection.

pub mod csv;
pub mod fit;
