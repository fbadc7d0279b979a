//! One-line summary of the host's packaging toolchain, for test logs.

use crate::core::errors::Result;
use crate::python_sys::probe_python;

pub const PACKAGES_OF_INTEREST: [&str; 11] = [
    "build",
    "packaging",
    "pathspec",
    "pip",
    "pybind11",
    "pyproject_metadata",
    "rich",
    "scikit_build_core",
    "setuptools",
    "virtualenv",
    "wheel",
];

const VERSIONS_SCRIPT: &str = r#"import json, sys
try:
    from importlib import metadata
except ImportError:
    import importlib_metadata as metadata
found = []
for name in sys.argv[1:]:
    try:
        found.append([name, metadata.version(name)])
    except Exception:
        pass
print(json.dumps(found))
"#;

/// Installed versions of [`PACKAGES_OF_INTEREST`] for `python`, skipping
/// packages that are not installed.
///
/// # Errors
///
/// Returns an error when the interpreter cannot be probed.
pub fn packages_of_interest(python: &str) -> Result<Vec<(String, String)>> {
    probe_python(python, VERSIONS_SCRIPT, &PACKAGES_OF_INTEREST, "package versions")
}

#[must_use]
pub fn render_report(packages: &[(String, String)]) -> String {
    let reqs = packages
        .iter()
        .map(|(name, version)| format!("{name}=={version}"))
        .collect::<Vec<_>>()
        .join(" ");
    format!("installed packages of interest: {reqs}")
}
