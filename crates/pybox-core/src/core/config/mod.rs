//! Harness configuration read from `PYBOX_*` variables.

pub mod settings;

pub use settings::*;
