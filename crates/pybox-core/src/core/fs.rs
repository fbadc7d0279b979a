use std::fs;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};

/// Best-effort recursive chmod for trees that contain read-only files
/// (pip marks some installed files read-only on a few platforms).
#[cfg(unix)]
pub(crate) fn make_writable_recursive(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let Ok(meta) = fs::symlink_metadata(path) else {
        return;
    };
    if meta.file_type().is_symlink() {
        return;
    }
    let mode = if meta.is_dir() { 0o755 } else { 0o644 };
    let _ = fs::set_permissions(path, fs::Permissions::from_mode(mode));
    if meta.is_dir() {
        if let Ok(entries) = fs::read_dir(path) {
            for entry in entries.flatten() {
                make_writable_recursive(&entry.path());
            }
        }
    }
}

#[cfg(not(unix))]
pub(crate) fn make_writable_recursive(path: &Path) {
    let Ok(meta) = fs::symlink_metadata(path) else {
        return;
    };
    if meta.file_type().is_symlink() {
        return;
    }
    let mut perms = meta.permissions();
    if perms.readonly() {
        perms.set_readonly(false);
        let _ = fs::set_permissions(path, perms);
    }
    if meta.is_dir() {
        if let Ok(entries) = fs::read_dir(path) {
            for entry in entries.flatten() {
                make_writable_recursive(&entry.path());
            }
        }
    }
}

/// Removes `path` recursively. A missing path is not an error.
pub(crate) fn remove_dir_all_writable(path: &Path) -> Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err).with_context(|| format!("failed to stat {}", path.display())),
    };
    if meta.file_type().is_symlink() {
        fs::remove_file(path)
            .with_context(|| format!("failed to remove symlink {}", path.display()))?;
        return Ok(());
    }
    match fs::remove_dir_all(path) {
        Ok(()) => return Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(_) => {}
    }
    make_writable_recursive(path);
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err).with_context(|| format!("failed to remove {}", path.display())),
    }
}

/// Copies the tree at `src` into `dst`, preserving symlinks on unix.
pub(crate) fn copy_dir_all(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst).with_context(|| format!("failed to create {}", dst.display()))?;
    for entry in fs::read_dir(src).with_context(|| format!("failed to read {}", src.display()))? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            copy_dir_all(&src_path, &dst_path)?;
        } else if file_type.is_symlink() {
            copy_symlink(&src_path, &dst_path)?;
        } else {
            fs::copy(&src_path, &dst_path).with_context(|| {
                format!(
                    "failed to copy {} to {}",
                    src_path.display(),
                    dst_path.display()
                )
            })?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    let target = fs::read_link(src).with_context(|| format!("failed to read {}", src.display()))?;
    std::os::unix::fs::symlink(&target, dst)
        .with_context(|| format!("failed to link {}", dst.display()))
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> Result<()> {
    fs::copy(src, dst)
        .map(|_| ())
        .with_context(|| format!("failed to copy {}", src.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remove_ignores_missing_path() {
        let temp = tempfile::tempdir().expect("tempdir");
        remove_dir_all_writable(&temp.path().join("never-created")).expect("missing is ok");
    }

    #[cfg(unix)]
    #[test]
    fn remove_clears_read_only_children() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempfile::tempdir().expect("tempdir");
        let root = temp.path().join("venv");
        let nested = root.join("lib").join("site-packages");
        fs::create_dir_all(&nested).expect("nested");
        fs::write(nested.join("RECORD"), b"x").expect("file");
        fs::set_permissions(&nested, fs::Permissions::from_mode(0o555)).expect("chmod");

        remove_dir_all_writable(&root).expect("remove");
        assert!(!root.exists());
    }

    #[test]
    fn copy_reproduces_tree() {
        let temp = tempfile::tempdir().expect("tempdir");
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("pkg")).expect("src");
        fs::write(src.join("pyproject.toml"), b"[project]\nname = \"x\"\n").expect("write");
        fs::write(src.join("pkg").join("__init__.py"), b"").expect("write");

        let dst = temp.path().join("dst");
        copy_dir_all(&src, &dst).expect("copy");
        assert_eq!(
            fs::read(dst.join("pyproject.toml")).expect("read"),
            fs::read(src.join("pyproject.toml")).expect("read")
        );
        assert!(dst.join("pkg").join("__init__.py").is_file());
    }
}
