//! Network plumbing shared by everything that talks to the internet.

pub mod gate;
