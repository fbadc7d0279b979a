use std::collections::HashMap;
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;

use crate::core::errors::{HarnessError, Result};

pub(crate) const DEFAULT_PROJECT_EXTRA: &str = "pyproject";
pub(crate) const DEFAULT_MIN_PIP: &str = "pip>=21.3.1";

/// Working directory of the process before any fixture switched it.
static LAUNCH_DIR: Lazy<PathBuf> =
    Lazy::new(|| env::current_dir().unwrap_or_else(|_| PathBuf::from("/")));

/// The directory relative settings resolve against.
///
/// Pinned on first use; fixtures force it before they change the working
/// directory, so it never points into a fixture copy.
pub(crate) fn launch_dir() -> &'static Path {
    &LAUNCH_DIR
}

fn absolutize(base: &Path, value: &str) -> PathBuf {
    let path = PathBuf::from(value);
    if path.is_absolute() {
        path
    } else {
        base.join(path)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct EnvSnapshot {
    vars: HashMap<String, String>,
}

impl EnvSnapshot {
    pub(crate) fn capture() -> Self {
        Self {
            vars: env::vars_os()
                .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?)))
                .collect(),
        }
    }

    pub(crate) fn flag_is_enabled(&self, key: &str) -> bool {
        matches!(self.vars.get(key).map(String::as_str), Some("1"))
    }

    /// Returns the value of `key`, treating blank values as unset.
    pub(crate) fn var(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    #[cfg(test)]
    pub(crate) fn testing(pairs: &[(&str, &str)]) -> Self {
        let vars = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        Self { vars }
    }
}

/// Settings shared by every fixture in a test session.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub(crate) python: Option<String>,
    pub(crate) project_root: PathBuf,
    pub(crate) project_extra: String,
    pub(crate) packages_dir: PathBuf,
    pub(crate) scratch_root: PathBuf,
    pub(crate) min_pip: String,
    pub(crate) wheelhouse: Option<PathBuf>,
    pub(crate) online: bool,
    pub(crate) search_path: Option<OsString>,
    pub(crate) launch_dir: PathBuf,
}

impl HarnessConfig {
    /// Builds a configuration snapshot from the current process environment.
    #[must_use]
    pub fn from_env() -> Self {
        let snapshot = EnvSnapshot::capture();
        Self::from_snapshot(&snapshot, launch_dir())
    }

    pub(crate) fn from_snapshot(snapshot: &EnvSnapshot, cwd: &Path) -> Self {
        let resolve = |value: &str| absolutize(cwd, value);
        let project_root = snapshot
            .var("PYBOX_PROJECT_ROOT")
            .map_or_else(|| cwd.to_path_buf(), resolve);
        let packages_dir = snapshot.var("PYBOX_PACKAGES_DIR").map_or_else(
            || project_root.join("tests").join("packages"),
            resolve,
        );
        Self {
            python: snapshot.var("PYBOX_PYTHON").map(ToOwned::to_owned),
            project_extra: snapshot
                .var("PYBOX_PROJECT_EXTRA")
                .unwrap_or(DEFAULT_PROJECT_EXTRA)
                .to_string(),
            packages_dir,
            project_root,
            scratch_root: snapshot
                .var("PYBOX_SCRATCH")
                .map_or_else(env::temp_dir, resolve),
            min_pip: snapshot
                .var("PYBOX_MIN_PIP")
                .unwrap_or(DEFAULT_MIN_PIP)
                .to_string(),
            wheelhouse: snapshot.var("PYBOX_WHEELHOUSE").map(resolve),
            online: snapshot.flag_is_enabled("PYBOX_ONLINE"),
            search_path: snapshot.var("PATH").map(OsString::from),
            launch_dir: cwd.to_path_buf(),
        }
    }

    /// Resolves the base interpreter used to create environments.
    ///
    /// # Errors
    /// Returns [`HarnessError::Config`] when no interpreter can be found.
    pub fn python(&self) -> Result<String> {
        match &self.python {
            Some(explicit) => Ok(explicit.clone()),
            None => crate::python_sys::detect_interpreter(
                self.search_path.as_deref(),
                &self.launch_dir,
            ),
        }
    }

    #[must_use]
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    #[must_use]
    pub fn project_extra(&self) -> &str {
        &self.project_extra
    }

    #[must_use]
    pub fn packages_dir(&self) -> &Path {
        &self.packages_dir
    }

    #[must_use]
    pub fn scratch_root(&self) -> &Path {
        &self.scratch_root
    }

    #[must_use]
    pub fn min_pip(&self) -> &str {
        &self.min_pip
    }

    /// A prebuilt wheelhouse to use instead of building one.
    #[must_use]
    pub fn wheelhouse(&self) -> Option<&Path> {
        self.wheelhouse.as_deref()
    }

    /// Whether tests that need a live package index may run.
    #[must_use]
    pub fn online(&self) -> bool {
        self.online
    }

    #[must_use]
    pub fn with_python(mut self, python: impl Into<String>) -> Self {
        self.python = Some(python.into());
        self
    }

    #[must_use]
    pub fn with_project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = root.into();
        self
    }

    #[must_use]
    pub fn with_packages_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.packages_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_scratch_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_root = dir.into();
        self
    }

    #[must_use]
    pub fn with_prebuilt_wheelhouse(mut self, dir: Option<PathBuf>) -> Self {
        self.wheelhouse = dir;
        self
    }

    /// Requirement string for `<project_root>[<extra>]`.
    pub(crate) fn project_requirement(&self) -> Result<String> {
        let root = self.project_root.to_str().ok_or_else(|| HarnessError::Config {
            message: format!("non-utf8 project root {}", self.project_root.display()),
        })?;
        if self.project_extra.is_empty() {
            Ok(root.to_string())
        } else {
            Ok(format!("{root}[{}]", self.project_extra))
        }
    }
}
