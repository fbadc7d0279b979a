//! Fresh copies of sample package source trees.

use std::cell::Cell;
use std::env;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use pybox_domain::{BuildTimestamp, PackageInfo, PythonBucket};
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use tracing::{debug, info};

use crate::core::config::settings::launch_dir;
use crate::core::config::HarnessConfig;
use crate::core::errors::{HarnessError, Result};
use crate::core::fs::{copy_dir_all, remove_dir_all_writable};

/// Serializes working-directory switches; the cwd is process-global.
static CWD_LOCK: Mutex<()> = Mutex::new(());

thread_local! {
    /// Set while this thread holds [`CWD_LOCK`] through a live fixture.
    static HOLDS_CWD: Cell<bool> = const { Cell::new(false) };
}

/// A sample package copied into its own scratch directory, with the process
/// working directory switched into it.
///
/// Dropping the fixture restores the previous working directory and removes
/// the copy.
pub struct PackageFixture {
    package: PackageInfo,
    path: PathBuf,
    previous_cwd: PathBuf,
    scratch: Option<TempDir>,
    _cwd: MutexGuard<'static, ()>,
}

impl std::fmt::Debug for PackageFixture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageFixture")
            .field("package", &self.package.name)
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl PackageFixture {
    /// Provisions a registered package by name.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Fixture`] for unknown names and copy failures.
    pub fn named(config: &HarnessConfig, name: &str) -> Result<Self> {
        let package = PackageInfo::lookup(name).ok_or_else(|| HarnessError::Fixture {
            package: name.to_string(),
            reason: "not a registered sample package".into(),
        })?;
        Self::provision(config, package)
    }

    /// Copies `<packages_dir>/<name>` into a fresh scratch directory, removes
    /// any stale `dist` output there and switches the working directory to it.
    ///
    /// Blocks while a fixture on another thread holds the working directory.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Fixture`] when the template is missing, the
    /// copy fails, or this thread already holds a fixture.
    pub fn provision(config: &HarnessConfig, package: &PackageInfo) -> Result<Self> {
        let fail = |reason: String| HarnessError::Fixture {
            package: package.name.to_string(),
            reason,
        };
        let template = config.packages_dir().join(package.name);
        if !template.is_dir() {
            return Err(fail(format!("template {} not found", template.display())));
        }

        if HOLDS_CWD.with(Cell::get) {
            return Err(fail("another fixture is active on this thread".into()));
        }
        let cwd = CWD_LOCK.lock().unwrap_or_else(PoisonError::into_inner);
        let scratch_root = config.scratch_root();
        std::fs::create_dir_all(scratch_root)
            .map_err(|err| fail(format!("failed to create {}: {err}", scratch_root.display())))?;
        let scratch = tempfile::Builder::new()
            .prefix("pybox-pkg-")
            .tempdir_in(scratch_root)
            .map_err(|err| fail(format!("failed to create scratch dir: {err}")))?;
        let path = scratch.path().join("pkg");
        copy_dir_all(&template, &path).map_err(|err| fail(format!("{err:#}")))?;

        let dist = path.join("dist");
        if dist.is_dir() {
            debug!(dist = %dist.display(), "clearing stale build output");
            remove_dir_all_writable(&dist).map_err(|err| fail(format!("{err:#}")))?;
        }

        launch_dir();
        let previous_cwd = env::current_dir()
            .map_err(|err| HarnessError::io("failed to read working directory", err))?;
        env::set_current_dir(&path).map_err(|err| {
            HarnessError::io(format!("failed to enter {}", path.display()), err)
        })?;
        HOLDS_CWD.with(|holds| holds.set(true));
        info!(package = package.name, path = %path.display(), "provisioned package fixture");

        Ok(Self {
            package: package.clone(),
            path,
            previous_cwd,
            scratch: Some(scratch),
            _cwd: cwd,
        })
    }

    #[must_use]
    pub fn package(&self) -> &PackageInfo {
        &self.package
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Compares a built sdist against the checksum pinned for this package.
    ///
    /// # Errors
    ///
    /// Returns an error when the sdist cannot be read.
    pub fn check_sdist(
        &self,
        sdist: &Path,
        bucket: PythonBucket,
        timestamp: BuildTimestamp,
    ) -> Result<HashCheck> {
        check_sdist(&self.package, sdist, bucket, timestamp)
    }
}

impl Drop for PackageFixture {
    fn drop(&mut self) {
        HOLDS_CWD.with(|holds| holds.set(false));
        if let Err(err) = env::set_current_dir(&self.previous_cwd) {
            debug!(error = %err, "failed to restore working directory");
        }
        if let Some(scratch) = self.scratch.take() {
            if let Err(err) = scratch.close() {
                debug!(path = %self.path.display(), error = %err, "failed to remove fixture copy");
            }
        }
    }
}

/// Outcome of comparing an sdist against its pinned checksum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashCheck {
    Match,
    Mismatch { expected: String, actual: String },
    /// No checksum is pinned for these conditions; nothing to assert.
    NotPinned,
}

impl HashCheck {
    /// True unless a pinned checksum was contradicted.
    #[must_use]
    pub fn is_acceptable(&self) -> bool {
        !matches!(self, Self::Mismatch { .. })
    }
}

/// Lowercase hex sha256 of the file at `path`.
///
/// # Errors
///
/// Returns an error when the file cannot be read.
pub fn sdist_digest(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .map_err(|err| HarnessError::io(format!("failed to open {}", path.display()), err))?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)
        .map_err(|err| HarnessError::io(format!("failed to read {}", path.display()), err))?;
    Ok(hex::encode(hasher.finalize()))
}

/// Compares `sdist` against the checksum `package` pins for the conditions.
///
/// # Errors
///
/// Returns an error when the sdist cannot be read.
pub fn check_sdist(
    package: &PackageInfo,
    sdist: &Path,
    bucket: PythonBucket,
    timestamp: BuildTimestamp,
) -> Result<HashCheck> {
    let Some(expected) = package.expected_sdist_hash(bucket, timestamp) else {
        return Ok(HashCheck::NotPinned);
    };
    let actual = sdist_digest(sdist)?;
    if actual == expected {
        Ok(HashCheck::Match)
    } else {
        Ok(HashCheck::Mismatch {
            expected: expected.to_string(),
            actual,
        })
    }
}
