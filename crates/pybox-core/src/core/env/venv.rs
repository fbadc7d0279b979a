use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::core::config::HarnessConfig;
use crate::core::errors::{HarnessError, Result};
use crate::core::runtime::context::ExecContext;
use crate::core::wheelhouse::Wheelhouse;
use crate::process::{command_line, run_command, run_command_passthrough};
use crate::python_sys::probe_interpreter;

/// CPython 3.11.0 emits this from `venv` by mistake (python/cpython#98743).
const CHECK_HOME_WARNING: &str = "check_home argument is deprecated and ignored.";
const CHECK_HOME_VERSION: (u32, u32, u32) = (3, 11, 0);

/// Whether a command's output is inherited or captured for assertions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capture {
    Inherit,
    Capture,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutput {
    Inherited,
    /// Trimmed stdout.
    Captured(String),
}

impl CommandOutput {
    #[must_use]
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Inherited => None,
            Self::Captured(text) => Some(text),
        }
    }

    #[must_use]
    pub fn into_text(self) -> Option<String> {
        match self {
            Self::Inherited => None,
            Self::Captured(text) => Some(text),
        }
    }
}

/// Whether `pip install` builds sdists in an isolated build environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Isolation {
    #[default]
    Enabled,
    /// Adds `--no-build-isolation`, for packages whose build requirements
    /// were installed by hand beforehand.
    Disabled,
}

/// A disposable virtual environment with a fixed execution context.
///
/// Every command goes through [`IsolatedEnv::run`], which applies the
/// [`ExecContext`] and turns a non-zero exit into
/// [`HarnessError::CommandFailed`].
#[derive(Debug)]
pub struct IsolatedEnv {
    root: PathBuf,
    executable: PathBuf,
    context: ExecContext,
}

impl IsolatedEnv {
    /// Creates a virtual environment at `root` and upgrades its pip.
    ///
    /// pip is always upgraded from the live index; the wheelhouse only
    /// applies to commands run after creation.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::EnvCreate`] for any failure while creating the
    /// environment or bootstrapping pip.
    pub fn create(
        config: &HarnessConfig,
        root: &Path,
        wheelhouse: Option<&Wheelhouse>,
    ) -> Result<Self> {
        let fail = |reason: String| HarnessError::EnvCreate {
            root: root.to_path_buf(),
            reason,
        };
        let python = config.python().map_err(|err| fail(err.to_string()))?;
        let base = probe_interpreter(&python).map_err(|err| fail(err.to_string()))?;
        info!(
            root = %root.display(),
            python = %python,
            version = %base.version_string(),
            "creating isolated environment"
        );

        let args = venv_args(base.version, root);
        let output = run_command(OsStr::new(&python), &args, &[])
            .map_err(|err| fail(err.to_string()))?;
        if !output.success() {
            return Err(fail(format!(
                "`{}` exited with code {}: {}",
                command_line(OsStr::new(&python), &args),
                output.code,
                output.stderr.trim()
            )));
        }

        let executable = venv_executable(root);
        if !executable.is_file() {
            return Err(fail(format!(
                "interpreter missing at {}",
                executable.display()
            )));
        }
        let bootstrap = Self::from_parts(root, &executable, None);
        bootstrap
            .install(&[config.min_pip()], Isolation::Enabled)
            .map_err(|err| fail(err.to_string()))?;
        Ok(bootstrap.with_wheelhouse(wheelhouse.map(Wheelhouse::path)))
    }

    pub(crate) fn from_parts(root: &Path, executable: &Path, wheelhouse: Option<&Path>) -> Self {
        let bin_dir = executable.parent().unwrap_or(root);
        Self {
            root: root.to_path_buf(),
            executable: executable.to_path_buf(),
            context: ExecContext::new(root, bin_dir, wheelhouse),
        }
    }

    fn with_wheelhouse(self, wheelhouse: Option<&Path>) -> Self {
        Self::from_parts(&self.root, &self.executable, wheelhouse)
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn executable(&self) -> &Path {
        &self.executable
    }

    #[must_use]
    pub fn bin_dir(&self) -> &Path {
        self.context.bin_dir()
    }

    #[must_use]
    pub fn wheelhouse(&self) -> Option<&Path> {
        self.context.wheelhouse()
    }

    #[must_use]
    pub fn context(&self) -> &ExecContext {
        &self.context
    }

    /// Runs `program args...` with this environment's context applied.
    ///
    /// On a non-zero exit the captured streams (if any) and a
    /// `FAILED RUN: <command line>` marker are written to the parent's
    /// stdout/stderr before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::CommandFailed`] on a non-zero exit and
    /// [`HarnessError::Spawn`] when the program cannot be started.
    pub fn run<P, S>(&self, program: P, args: &[S], capture: Capture) -> Result<CommandOutput>
    where
        P: AsRef<OsStr>,
        S: AsRef<OsStr>,
    {
        let program = program.as_ref();
        let args: Vec<OsString> = args.iter().map(|arg| arg.as_ref().to_os_string()).collect();
        let envs = self.context.envs();
        let output = match capture {
            Capture::Inherit => run_command_passthrough(program, &args, &envs)?,
            Capture::Capture => run_command(program, &args, &envs)?,
        };
        if !output.success() {
            let command = command_line(program, &args);
            if capture == Capture::Capture {
                println!("{}", output.stdout);
                eprintln!("{}", output.stderr);
            }
            eprintln!("FAILED RUN: {command}");
            warn!(command = %command, code = output.code, "command failed");
            return Err(HarnessError::CommandFailed {
                command,
                code: output.code,
                stdout: output.stdout,
                stderr: output.stderr,
            });
        }
        debug!(code = output.code, "command succeeded");
        Ok(match capture {
            Capture::Inherit => CommandOutput::Inherited,
            Capture::Capture => CommandOutput::Captured(output.stdout.trim().to_string()),
        })
    }

    /// Runs a command and returns its trimmed stdout.
    ///
    /// # Errors
    ///
    /// See [`IsolatedEnv::run`].
    pub fn run_captured<P, S>(&self, program: P, args: &[S]) -> Result<String>
    where
        P: AsRef<OsStr>,
        S: AsRef<OsStr>,
    {
        Ok(self
            .run(program, args, Capture::Capture)?
            .into_text()
            .unwrap_or_default())
    }

    /// Runs `python -c <snippet>` and returns its trimmed stdout.
    ///
    /// # Errors
    ///
    /// See [`IsolatedEnv::run`].
    pub fn execute(&self, snippet: &str) -> Result<String> {
        self.run_captured(&self.executable, &["-c", snippet])
    }

    /// Runs `python -m <name> args...` with inherited output.
    ///
    /// # Errors
    ///
    /// See [`IsolatedEnv::run`].
    pub fn module<S: AsRef<OsStr>>(&self, name: &str, args: &[S]) -> Result<()> {
        let mut argv = vec![OsString::from("-m"), OsString::from(name)];
        argv.extend(args.iter().map(|arg| arg.as_ref().to_os_string()));
        self.run(&self.executable, &argv, Capture::Inherit)?;
        Ok(())
    }

    /// Runs `python -m pip install args...`.
    ///
    /// # Errors
    ///
    /// See [`IsolatedEnv::run`].
    pub fn install<S: AsRef<OsStr>>(&self, args: &[S], isolation: Isolation) -> Result<()> {
        let mut argv = vec![OsString::from("install")];
        if isolation == Isolation::Disabled {
            argv.push(OsString::from("--no-build-isolation"));
        }
        argv.extend(args.iter().map(|arg| arg.as_ref().to_os_string()));
        self.module("pip", &argv)
    }
}

/// Arguments for `python ... -m venv <root>`.
///
/// DeprecationWarnings raised while creating the env are errors, except the
/// one emitted by mistake by exactly [`CHECK_HOME_VERSION`].
fn venv_args(version: (u32, u32, u32), root: &Path) -> Vec<OsString> {
    let mut args = vec![
        OsString::from("-W"),
        OsString::from("error::DeprecationWarning"),
    ];
    if version == CHECK_HOME_VERSION {
        args.push(OsString::from("-W"));
        args.push(OsString::from(format!(
            "ignore:{CHECK_HOME_WARNING}:DeprecationWarning"
        )));
    }
    args.push(OsString::from("-m"));
    args.push(OsString::from("venv"));
    args.push(root.as_os_str().to_os_string());
    args
}

#[cfg(windows)]
fn venv_executable(root: &Path) -> PathBuf {
    root.join("Scripts").join("python.exe")
}

#[cfg(not(windows))]
fn venv_executable(root: &Path) -> PathBuf {
    root.join("bin").join("python")
}
