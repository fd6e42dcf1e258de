//! Course file loaders. TCX 1.0 is the only supported input format.

pub mod tcx;
