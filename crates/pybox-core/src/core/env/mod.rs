//! Isolated environments and the per-test sessions that own them.

pub mod session;
pub mod venv;

pub use session::EnvSession;
pub use venv::{Capture, CommandOutput, IsolatedEnv, Isolation};
