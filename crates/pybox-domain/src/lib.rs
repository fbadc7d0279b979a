#![deny(clippy::all, warnings)]
#![allow(clippy::must_use_candidate)]

pub mod registry;

pub use registry::{
    known_packages, BuildTimestamp, PackageInfo, PythonBucket, SOURCE_DATE_EPOCH,
};
