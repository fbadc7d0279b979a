use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use pybox_domain::PythonBucket;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use which::which_in;

use crate::core::errors::{HarnessError, Result};
use crate::process::run_command;

const INFO_SCRIPT: &str = r#"import json, sys
print(json.dumps({"version": list(sys.version_info[:3]), "executable": sys.executable}))
"#;

const FIND_SPEC_SCRIPT: &str = r#"import importlib.util, json, sys
print(json.dumps({name: importlib.util.find_spec(name) is not None for name in sys.argv[1:]}))
"#;

/// Detects the host interpreter on `search_path` (a `PATH`-style list).
///
/// # Errors
///
/// Returns an error when no interpreter can be found or the detected path is
/// not valid UTF-8.
pub fn detect_interpreter(search_path: Option<&OsStr>, cwd: &Path) -> Result<String> {
    for candidate in ["python3", "python"] {
        if let Ok(path) = which_in(candidate, search_path, cwd) {
            return path.into_os_string().into_string().map_err(|raw| {
                HarnessError::Config {
                    message: format!("non-utf8 interpreter path {}", raw.to_string_lossy()),
                }
            });
        }
    }
    Err(HarnessError::Config {
        message: "no python interpreter found; set PYBOX_PYTHON".into(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterpreterInfo {
    pub version: (u32, u32, u32),
    pub executable: PathBuf,
}

impl InterpreterInfo {
    #[must_use]
    pub fn bucket(&self) -> PythonBucket {
        PythonBucket::from_version(self.version.0, self.version.1)
    }

    #[must_use]
    pub fn version_string(&self) -> String {
        let (major, minor, patch) = self.version;
        format!("{major}.{minor}.{patch}")
    }
}

#[derive(Deserialize)]
struct InfoPayload {
    version: Vec<u32>,
    executable: String,
}

/// Reports the version and resolved executable of `python`.
///
/// # Errors
///
/// Returns an error when the interpreter cannot be invoked or the payload is
/// malformed.
pub fn probe_interpreter(python: &str) -> Result<InterpreterInfo> {
    let payload: InfoPayload = probe_python(python, INFO_SCRIPT, &[], "interpreter")?;
    let version = match payload.version.as_slice() {
        [major, minor, patch] => (*major, *minor, *patch),
        other => {
            return Err(HarnessError::Probe {
                what: "interpreter".into(),
                reason: format!("unexpected version_info {other:?}"),
            })
        }
    };
    Ok(InterpreterInfo {
        version,
        executable: PathBuf::from(payload.executable),
    })
}

/// Returns the subset of `modules` importable by `python`, in input order.
///
/// # Errors
///
/// Returns an error when the interpreter cannot be invoked.
pub fn find_optional_tools(python: &str, modules: &[&str]) -> Result<Vec<String>> {
    let found: std::collections::HashMap<String, bool> =
        probe_python(python, FIND_SPEC_SCRIPT, modules, "module availability")?;
    Ok(modules
        .iter()
        .filter(|name| found.get(**name).copied().unwrap_or(false))
        .map(|name| (*name).to_string())
        .collect())
}

pub(crate) fn probe_python<T>(python: &str, script: &str, extra: &[&str], what: &str) -> Result<T>
where
    T: DeserializeOwned,
{
    let mut args = vec![OsString::from("-c"), OsString::from(script)];
    args.extend(extra.iter().map(OsString::from));
    let output = run_command(OsStr::new(python), &args, &[])?;
    if !output.success() {
        return Err(HarnessError::Probe {
            what: what.into(),
            reason: output.stderr.trim().to_string(),
        });
    }
    serde_json::from_str(output.stdout.trim()).map_err(|err| HarnessError::Probe {
        what: what.into(),
        reason: format!("invalid payload: {err}"),
    })
}
