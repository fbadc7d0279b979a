//! Offline package cache shared by every environment in a test session.

use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};

use once_cell::sync::{Lazy, OnceCell};
use tempfile::TempDir;
use tracing::{info, warn};

use crate::core::config::HarnessConfig;
use crate::core::errors::{HarnessError, Result};
use crate::process::{command_line, run_command_passthrough};
use crate::python_sys::find_optional_tools;

/// Build and test dependencies every wheelhouse carries.
pub const WHEELHOUSE_PACKAGES: [&str; 8] = [
    "build",
    "hatchling",
    "pip>=23",
    "pybind11",
    "rich",
    "setuptools",
    "virtualenv",
    "wheel",
];

/// Native build tools fetched only when the host already has them, so
/// platforms without wheels for them are not forced to build them.
pub const OPTIONAL_TOOLS: [&str; 2] = ["cmake", "ninja"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Wheelhouse {
    path: PathBuf,
}

impl Wheelhouse {
    /// Wraps an existing wheelhouse directory.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Wheelhouse`] when `path` is not a directory.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.is_dir() {
            return Err(HarnessError::Wheelhouse {
                reason: format!("{} is not a directory", path.display()),
            });
        }
        Ok(Self { path })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Installable artifacts (`.whl`, `.tar.gz`, `.zip`), sorted by name.
    ///
    /// # Errors
    ///
    /// Returns an error when the directory cannot be listed.
    pub fn artifacts(&self) -> Result<Vec<PathBuf>> {
        let entries = fs::read_dir(&self.path).map_err(|err| {
            HarnessError::io(format!("failed to list {}", self.path.display()), err)
        })?;
        let mut artifacts: Vec<PathBuf> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| is_artifact(path))
            .collect();
        artifacts.sort();
        Ok(artifacts)
    }
}

fn is_artifact(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(OsStr::to_str) else {
        return false;
    };
    let name = name.to_ascii_lowercase();
    name.ends_with(".whl") || name.ends_with(".tar.gz") || name.ends_with(".zip")
}

/// Builds the project wheel and downloads the pinned dependency set into
/// `dir` using the host interpreter.
///
/// # Errors
///
/// Returns [`HarnessError::Wheelhouse`] when any step fails.
pub fn build_wheelhouse(config: &HarnessConfig, dir: &Path) -> Result<Wheelhouse> {
    let as_wheelhouse = |err: HarnessError| HarnessError::Wheelhouse {
        reason: err.to_string(),
    };
    let python = config.python().map_err(as_wheelhouse)?;
    fs::create_dir_all(dir)
        .map_err(|err| HarnessError::io(format!("failed to create {}", dir.display()), err))
        .map_err(as_wheelhouse)?;
    info!(dir = %dir.display(), python = %python, "building wheelhouse");

    let project = config.project_requirement().map_err(as_wheelhouse)?;
    let mut wheel_args = pip_args(&["wheel", "--wheel-dir"]);
    wheel_args.push(dir.as_os_str().to_os_string());
    wheel_args.push(OsString::from(project));
    run_step(&python, &wheel_args)?;

    let tools = find_optional_tools(&python, &OPTIONAL_TOOLS).map_err(as_wheelhouse)?;
    let mut download_args = pip_args(&["download", "-q", "-d"]);
    download_args.push(dir.as_os_str().to_os_string());
    download_args.extend(
        download_packages(&tools)
            .into_iter()
            .map(OsString::from),
    );
    run_step(&python, &download_args)?;

    let wheelhouse = Wheelhouse::open(dir)?;
    info!(
        dir = %dir.display(),
        artifacts = wheelhouse.artifacts().map(|a| a.len()).unwrap_or_default(),
        "wheelhouse ready"
    );
    Ok(wheelhouse)
}

pub(crate) fn download_packages(available_tools: &[String]) -> Vec<String> {
    let mut packages: Vec<String> = WHEELHOUSE_PACKAGES.iter().map(|p| (*p).to_string()).collect();
    packages.extend(
        OPTIONAL_TOOLS
            .iter()
            .filter(|tool| available_tools.iter().any(|found| found == *tool))
            .map(|tool| (*tool).to_string()),
    );
    packages
}

fn pip_args(rest: &[&str]) -> Vec<OsString> {
    ["-m", "pip"]
        .iter()
        .chain(rest)
        .map(OsString::from)
        .collect()
}

fn run_step(python: &str, args: &[OsString]) -> Result<()> {
    let program = OsStr::new(python);
    let command = command_line(program, args);
    let output = run_command_passthrough(program, args, &[]).map_err(|err| {
        HarnessError::Wheelhouse {
            reason: format!("`{command}`: {err}"),
        }
    })?;
    if !output.success() {
        warn!(command = %command, code = output.code, "wheelhouse step failed");
        return Err(HarnessError::Wheelhouse {
            reason: format!("`{command}` exited with code {}", output.code),
        });
    }
    Ok(())
}

struct BuiltWheelhouse {
    wheelhouse: Wheelhouse,
    _scratch: Option<TempDir>,
}

/// The session-scoped wheelhouse: built on first request, never rebuilt.
///
/// A failed build is remembered, so every later request fails with the same
/// reason instead of retrying. Concurrent first requests block until the one
/// build finishes.
pub struct SharedWheelhouse {
    cell: OnceCell<std::result::Result<BuiltWheelhouse, String>>,
}

static GLOBAL: Lazy<SharedWheelhouse> = Lazy::new(SharedWheelhouse::new);

impl SharedWheelhouse {
    #[must_use]
    pub fn new() -> Self {
        Self {
            cell: OnceCell::new(),
        }
    }

    /// Uses an already populated directory instead of building one.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Wheelhouse`] when `path` is not a directory.
    pub fn prebuilt(path: impl Into<PathBuf>) -> Result<Self> {
        let wheelhouse = Wheelhouse::open(path)?;
        let shared = Self::new();
        let _ = shared.cell.set(Ok(BuiltWheelhouse {
            wheelhouse,
            _scratch: None,
        }));
        Ok(shared)
    }

    /// The process-wide instance shared by every test in the binary.
    pub fn global() -> &'static SharedWheelhouse {
        &GLOBAL
    }

    /// Whether the wheelhouse has been built (or its build attempted).
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.cell.get().is_some()
    }

    /// Returns the wheelhouse, building it on the first call.
    ///
    /// `PYBOX_WHEELHOUSE`-style prebuilt directories from the config are used
    /// as is; otherwise a fresh directory is created under the scratch root.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Wheelhouse`] if the (single) build failed.
    pub fn get_or_build(&self, config: &HarnessConfig) -> Result<&Wheelhouse> {
        let built = self.cell.get_or_init(|| {
            build_once(config).map_err(|err| {
                warn!(error = %err, "wheelhouse build failed; dependent tests will fail");
                err.to_string()
            })
        });
        match built {
            Ok(built) => Ok(&built.wheelhouse),
            Err(reason) => Err(HarnessError::Wheelhouse {
                reason: reason.clone(),
            }),
        }
    }
}

impl Default for SharedWheelhouse {
    fn default() -> Self {
        Self::new()
    }
}

fn build_once(config: &HarnessConfig) -> Result<BuiltWheelhouse> {
    if let Some(existing) = config.wheelhouse() {
        info!(dir = %existing.display(), "using prebuilt wheelhouse");
        return Ok(BuiltWheelhouse {
            wheelhouse: Wheelhouse::open(existing)?,
            _scratch: None,
        });
    }
    let root = config.scratch_root();
    fs::create_dir_all(root)
        .map_err(|err| HarnessError::io(format!("failed to create {}", root.display()), err))?;
    let scratch = tempfile::Builder::new()
        .prefix("pybox-wheelhouse-")
        .tempdir_in(root)
        .map_err(|err| {
            HarnessError::io(format!("failed to create temp dir under {}", root.display()), err)
        })?;
    let wheelhouse = build_wheelhouse(config, &scratch.path().join("wheelhouse"))?;
    Ok(BuiltWheelhouse {
        wheelhouse,
        _scratch: Some(scratch),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn optional_tools_only_when_available() {
        let base = download_packages(&[]);
        assert_eq!(base.len(), WHEELHOUSE_PACKAGES.len());
        assert!(!base.iter().any(|p| p == "cmake" || p == "ninja"));

        let with_ninja = download_packages(&["ninja".to_string()]);
        assert_eq!(with_ninja.last().map(String::as_str), Some("ninja"));
        assert!(!with_ninja.iter().any(|p| p == "cmake"));

        let both = download_packages(&["ninja".to_string(), "cmake".to_string()]);
        assert_eq!(&both[both.len() - 2..], ["cmake", "ninja"]);
    }

    #[test]
    fn artifacts_lists_installables_only() {
        let temp = tempfile::tempdir().expect("tempdir");
        for name in ["rich-13.0.0-py3-none-any.whl", "pybind11-2.11.1.tar.gz", "notes.txt"] {
            fs::write(temp.path().join(name), b"").expect("write");
        }
        let wheelhouse = Wheelhouse::open(temp.path()).expect("open");
        let names: Vec<String> = wheelhouse
            .artifacts()
            .expect("list")
            .iter()
            .filter_map(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
            .collect();
        assert_eq!(names, ["pybind11-2.11.1.tar.gz", "rich-13.0.0-py3-none-any.whl"]);
    }

    #[test]
    fn open_rejects_missing_dir() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = Wheelhouse::open(temp.path().join("missing")).unwrap_err();
        assert!(err.is_setup_failure());
    }

    #[test]
    fn prebuilt_is_returned_without_building() {
        let temp = tempfile::tempdir().expect("tempdir");
        let shared = SharedWheelhouse::prebuilt(temp.path()).expect("prebuilt");
        assert!(shared.is_initialized());
        // The interpreter is never consulted for a prebuilt wheelhouse.
        let config = HarnessConfig::from_env().with_python("/nonexistent/python");
        let wheelhouse = shared.get_or_build(&config).expect("wheelhouse");
        assert_eq!(wheelhouse.path(), temp.path());
    }

    #[test]
    fn failed_build_is_memoized() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = HarnessConfig::from_env()
            .with_python("/nonexistent/pybox-python")
            .with_scratch_root(temp.path())
            .with_prebuilt_wheelhouse(None);
        let shared = SharedWheelhouse::new();
        let first = shared.get_or_build(&config).unwrap_err();
        assert!(matches!(first, HarnessError::Wheelhouse { .. }), "{first:?}");
        assert!(shared.is_initialized());

        // A config that would point at a usable directory does not trigger a
        // second attempt.
        let retry = config.with_prebuilt_wheelhouse(Some(temp.path().to_path_buf()));
        let second = shared.get_or_build(&retry).unwrap_err();
        assert_eq!(first.to_string(), second.to_string());
    }
}
