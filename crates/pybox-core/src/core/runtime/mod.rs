//! Subprocess execution and per-environment context shaping.

pub mod context;
pub mod process;

pub use context::ExecContext;
pub use process::{command_line, RunOutput};
