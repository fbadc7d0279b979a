pub mod config;
pub mod env;
pub(crate) mod errors;
pub(crate) mod fixture;
pub(crate) mod fs;
pub mod python;
pub(crate) mod report;
pub mod runtime;
pub(crate) mod wheelhouse;
