#![deny(clippy::all)]

//! Disposable Python environments for integration-testing a packaging tool.
//!
//! A test asks for an [`EnvSession`] (wheelhouse-backed via
//! [`EnvSession::isolated`], or online via [`EnvSession::virtualenv`]) and/or a
//! [`PackageFixture`], drives the build tool through the session, and lets
//! both drop.

mod core;

pub(crate) use crate::core::python::python_sys;
pub(crate) use crate::core::runtime::process;

pub use crate::core::config::HarnessConfig;
pub use crate::core::env::{Capture, CommandOutput, EnvSession, IsolatedEnv, Isolation};
pub use crate::core::errors::{HarnessError, Result};
pub use crate::core::fixture::{check_sdist, sdist_digest, HashCheck, PackageFixture};
pub use crate::core::python::{
    detect_interpreter, find_optional_tools, probe_interpreter, InterpreterInfo,
};
pub use crate::core::report::{packages_of_interest, render_report, PACKAGES_OF_INTEREST};
pub use crate::core::runtime::{command_line, ExecContext, RunOutput};
pub use crate::core::wheelhouse::{
    build_wheelhouse, SharedWheelhouse, Wheelhouse, OPTIONAL_TOOLS, WHEELHOUSE_PACKAGES,
};

pub use pybox_domain::{known_packages, BuildTimestamp, PackageInfo, PythonBucket, SOURCE_DATE_EPOCH};
