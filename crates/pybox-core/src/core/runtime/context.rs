//! Environment-variable shaping for commands run inside an isolated env.

use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

pub(crate) const ON: &str = "ON";

/// Variable overrides applied to every command run in an environment.
///
/// Built only from the environment root, its binary directory and the
/// optional wheelhouse. There are no setters: when either input changes a new
/// context is constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecContext {
    root: PathBuf,
    bin_dir: PathBuf,
    wheelhouse: Option<PathBuf>,
}

impl ExecContext {
    #[must_use]
    pub fn new(root: &Path, bin_dir: &Path, wheelhouse: Option<&Path>) -> Self {
        Self {
            root: root.to_path_buf(),
            bin_dir: bin_dir.to_path_buf(),
            wheelhouse: wheelhouse.map(Path::to_path_buf),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn bin_dir(&self) -> &Path {
        &self.bin_dir
    }

    #[must_use]
    pub fn wheelhouse(&self) -> Option<&Path> {
        self.wheelhouse.as_deref()
    }

    #[must_use]
    pub fn is_offline(&self) -> bool {
        self.wheelhouse.is_some()
    }

    /// Overrides to apply on top of the caller's environment, with `PATH`
    /// derived from the caller's current `PATH`.
    #[must_use]
    pub fn envs(&self) -> Vec<(String, OsString)> {
        self.envs_with_path(env::var_os("PATH"))
    }

    pub(crate) fn envs_with_path(&self, inherited: Option<OsString>) -> Vec<(String, OsString)> {
        let mut envs = vec![
            ("PATH".to_string(), prepend_path(&self.bin_dir, inherited)),
            ("VIRTUAL_ENV".to_string(), self.root.clone().into_os_string()),
            ("PIP_DISABLE_PIP_VERSION_CHECK".to_string(), ON.into()),
        ];
        if let Some(wheelhouse) = &self.wheelhouse {
            envs.push(("PIP_NO_INDEX".to_string(), ON.into()));
            envs.push((
                "PIP_FIND_LINKS".to_string(),
                wheelhouse.clone().into_os_string(),
            ));
        }
        envs
    }
}

fn prepend_path(bin_dir: &Path, inherited: Option<OsString>) -> OsString {
    let mut entries = vec![bin_dir.to_path_buf()];
    if let Some(existing) = inherited {
        entries.extend(env::split_paths(&existing));
    }
    // join_paths only fails when an entry contains the separator; fall back to
    // the bin dir alone rather than dropping the override.
    env::join_paths(&entries).unwrap_or_else(|_| bin_dir.as_os_str().to_os_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lookup<'a>(envs: &'a [(String, OsString)], key: &str) -> Option<&'a OsString> {
        envs.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    #[test]
    fn online_context_sets_isolation_marker_and_path() {
        let ctx = ExecContext::new(Path::new("/t/venv"), Path::new("/t/venv/bin"), None);
        let inherited = env::join_paths(["/usr/bin", "/bin"]).unwrap();
        let envs = ctx.envs_with_path(Some(inherited));
        let path = lookup(&envs, "PATH").expect("PATH");
        let first = env::split_paths(path).next().expect("entry");
        assert_eq!(first, PathBuf::from("/t/venv/bin"));
        assert_eq!(env::split_paths(path).count(), 3);
        assert_eq!(lookup(&envs, "VIRTUAL_ENV").unwrap(), "/t/venv");
        assert_eq!(lookup(&envs, "PIP_DISABLE_PIP_VERSION_CHECK").unwrap(), "ON");
        assert!(lookup(&envs, "PIP_NO_INDEX").is_none());
        assert!(lookup(&envs, "PIP_FIND_LINKS").is_none());
        assert!(!ctx.is_offline());
    }

    #[test]
    fn wheelhouse_context_disables_index() {
        let ctx = ExecContext::new(
            Path::new("/t/venv"),
            Path::new("/t/venv/bin"),
            Some(Path::new("/s/wheelhouse")),
        );
        let envs = ctx.envs_with_path(None);
        assert_eq!(lookup(&envs, "PIP_NO_INDEX").unwrap(), "ON");
        assert_eq!(lookup(&envs, "PIP_FIND_LINKS").unwrap(), "/s/wheelhouse");
        assert_eq!(lookup(&envs, "PATH").unwrap(), "/t/venv/bin");
        assert!(ctx.is_offline());
    }

    #[test]
    fn same_inputs_build_equal_contexts() {
        let a = ExecContext::new(Path::new("/r"), Path::new("/r/bin"), Some(Path::new("/w")));
        let b = ExecContext::new(Path::new("/r"), Path::new("/r/bin"), Some(Path::new("/w")));
        assert_eq!(a, b);
        assert_eq!(a.envs_with_path(None), b.envs_with_path(None));
        let offline = ExecContext::new(Path::new("/r"), Path::new("/r/bin"), None);
        assert_ne!(a, offline);
    }
}
