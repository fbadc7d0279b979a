use std::fs;
use std::ops::Deref;
use std::path::Path;

use tempfile::TempDir;
use tracing::{debug, info};

use crate::core::config::HarnessConfig;
use crate::core::env::venv::IsolatedEnv;
use crate::core::errors::{HarnessError, Result};
use crate::core::fs::remove_dir_all_writable;
use crate::core::wheelhouse::{SharedWheelhouse, Wheelhouse};

/// A ready environment owned by one test.
///
/// Dropping the session removes the environment root, whether the test
/// returned normally, returned an error or panicked. Removal failures are
/// logged and otherwise ignored.
#[derive(Debug)]
pub struct EnvSession {
    env: IsolatedEnv,
    scratch: Option<TempDir>,
}

impl EnvSession {
    /// An environment whose installs resolve only from the session wheelhouse.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::Wheelhouse`] if the shared wheelhouse could not
    /// be built and [`HarnessError::EnvCreate`] if the environment could not
    /// be created.
    pub fn isolated(config: &HarnessConfig, wheelhouse: &SharedWheelhouse) -> Result<Self> {
        let wheelhouse = wheelhouse.get_or_build(config)?;
        Self::create(config, Some(wheelhouse))
    }

    /// An environment that installs from the live package index.
    ///
    /// # Errors
    ///
    /// Returns [`HarnessError::EnvCreate`] if the environment could not be
    /// created.
    pub fn virtualenv(config: &HarnessConfig) -> Result<Self> {
        Self::create(config, None)
    }

    fn create(config: &HarnessConfig, wheelhouse: Option<&Wheelhouse>) -> Result<Self> {
        let scratch = scratch_dir(config)?;
        let root = scratch.path().join("venv");
        match IsolatedEnv::create(config, &root, wheelhouse) {
            Ok(env) => Ok(Self {
                env,
                scratch: Some(scratch),
            }),
            Err(err) => {
                teardown(&root);
                Err(err)
            }
        }
    }

    /// Takes ownership of an environment created elsewhere.
    #[must_use]
    pub fn acquire(env: IsolatedEnv) -> Self {
        Self { env, scratch: None }
    }

    #[must_use]
    pub fn env(&self) -> &IsolatedEnv {
        &self.env
    }
}

impl Deref for EnvSession {
    type Target = IsolatedEnv;

    fn deref(&self) -> &Self::Target {
        &self.env
    }
}

impl Drop for EnvSession {
    fn drop(&mut self) {
        teardown(self.env.root());
        if let Some(scratch) = self.scratch.take() {
            let path = scratch.path().to_path_buf();
            if let Err(err) = scratch.close() {
                debug!(path = %path.display(), error = %err, "failed to remove session scratch");
            }
        }
    }
}

fn teardown(root: &Path) {
    match remove_dir_all_writable(root) {
        Ok(()) => info!(root = %root.display(), "removed isolated environment"),
        Err(err) => debug!(root = %root.display(), error = %err, "environment teardown failed"),
    }
}

fn scratch_dir(config: &HarnessConfig) -> Result<TempDir> {
    let root = config.scratch_root();
    fs::create_dir_all(root)
        .map_err(|err| HarnessError::io(format!("failed to create {}", root.display()), err))?;
    tempfile::Builder::new()
        .prefix("pybox-env-")
        .tempdir_in(root)
        .map_err(|err| {
            HarnessError::io(format!("failed to create temp dir under {}", root.display()), err)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_env(root: &Path) -> IsolatedEnv {
        let bin = root.join("bin");
        fs::create_dir_all(&bin).expect("bin dir");
        fs::write(bin.join("python"), b"").expect("python stub");
        IsolatedEnv::from_parts(root, &bin.join("python"), None)
    }

    #[test]
    fn drop_removes_root_after_success() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("venv");
        {
            let session = EnvSession::acquire(fake_env(&root));
            assert!(session.root().exists());
        }
        assert!(!root.exists());
    }

    #[test]
    fn drop_removes_root_when_test_fails() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("venv");
        let failing = || -> Result<()> {
            let session = EnvSession::acquire(fake_env(&root));
            session.run("pybox-no-such-program", &["--version"], crate::Capture::Capture)?;
            Ok(())
        };
        assert!(failing().is_err());
        assert!(!root.exists());
    }

    #[test]
    fn drop_removes_root_on_panic() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("venv");
        let panicking_root = root.clone();
        let outcome = std::panic::catch_unwind(move || {
            let _session = EnvSession::acquire(fake_env(&panicking_root));
            panic!("test body failed");
        });
        assert!(outcome.is_err());
        assert!(!root.exists());
    }

    #[test]
    fn drop_tolerates_root_already_gone() {
        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("venv");
        let session = EnvSession::acquire(fake_env(&root));
        fs::remove_dir_all(&root).expect("remove early");
        drop(session);
        assert!(!root.exists());
    }

    #[test]
    fn failed_creation_leaves_nothing_behind() {
        let temp = tempfile::tempdir().expect("tempdir");
        let config = HarnessConfig::from_env()
            .with_python("/nonexistent/pybox-python")
            .with_scratch_root(temp.path());
        let err = EnvSession::virtualenv(&config).unwrap_err();
        assert!(err.is_setup_failure(), "{err:?}");
        let leftovers: Vec<_> = fs::read_dir(temp.path()).expect("list").flatten().collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }
}
