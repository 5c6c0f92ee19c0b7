// fsutil.rs - Shared filesystem helpers: atomic writes, recursive copy, moves

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Write `content` to `path` via tempfile + rename so readers never see a
/// partial file.
pub fn atomic_write(path: &Path, content: &str) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).with_context(|| format!("failed to create {}", parent.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent)
        .with_context(|| format!("failed to create tempfile in {}", parent.display()))?;
    use std::io::Write;
    tmp.write_all(content.as_bytes())
        .with_context(|| format!("failed to write tempfile for {}", path.display()))?;
    tmp.persist(path)
        .with_context(|| format!("failed to persist {}", path.display()))?;
    Ok(())
}

/// Pretty-print JSON with a trailing newline and write it atomically.
pub fn atomic_write_json(path: &Path, data: &serde_json::Value) -> Result<()> {
    let content = serde_json::to_string_pretty(data)? + "\n";
    atomic_write(path, &content)
}

/// Recursively copy `src` into `dst`.
///
/// With `resolve_links` set, symlinks are followed and their targets
/// copied as real files/dirs; otherwise symlinks are recreated verbatim.
pub fn copy_dir_all(src: &Path, dst: &Path, resolve_links: bool) -> Result<()> {
    fs::create_dir_all(dst).with_context(|| format!("failed to create {}", dst.display()))?;
    for entry in fs::read_dir(src).with_context(|| format!("failed to read {}", src.display()))? {
        let entry = entry?;
        let from = entry.path();
        let to = dst.join(entry.file_name());
        copy_entry(&from, &to, resolve_links)?;
    }
    Ok(())
}

/// Copy a single file, directory, or symlink.
pub fn copy_entry(from: &Path, to: &Path, resolve_links: bool) -> Result<()> {
    let meta = fs::symlink_metadata(from)
        .with_context(|| format!("failed to inspect {}", from.display()))?;

    if meta.file_type().is_symlink() {
        if resolve_links {
            // Broken links are dropped rather than copied.
            if !from.exists() {
                return Ok(());
            }
            let resolved = fs::canonicalize(from)
                .with_context(|| format!("failed to resolve {}", from.display()))?;
            return copy_entry(&resolved, to, resolve_links);
        }
        let target = fs::read_link(from)?;
        crate::symlink::remove(to)?;
        return recreate_symlink(&target, to);
    }

    if meta.is_dir() {
        return copy_dir_all(from, to, resolve_links);
    }

    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::copy(from, to)
        .with_context(|| format!("failed to copy {} to {}", from.display(), to.display()))?;
    Ok(())
}

#[cfg(unix)]
fn recreate_symlink(target: &Path, to: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, to)
        .with_context(|| format!("failed to recreate symlink {}", to.display()))
}

#[cfg(not(unix))]
fn recreate_symlink(_target: &Path, _to: &Path) -> Result<()> {
    anyhow::bail!("symlinks are only supported on Unix")
}

/// Move a file or directory, falling back to copy+remove across filesystems.
pub fn move_path(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    match fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            copy_entry(from, to, false)?;
            remove_any(from)
        }
    }
}

/// Remove a file, symlink, or directory tree.
pub fn remove_any(path: &Path) -> Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path)
            .with_context(|| format!("failed to remove {}", path.display())),
        Ok(_) => {
            fs::remove_file(path).with_context(|| format!("failed to remove {}", path.display()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("failed to inspect {}", path.display())),
    }
}

/// Copy the permission bits of `src` onto `dst`.
#[cfg(unix)]
pub fn copy_permissions(src: &Path, dst: &Path) -> Result<()> {
    let perms = fs::metadata(src)
        .with_context(|| format!("failed to stat {}", src.display()))?
        .permissions();
    fs::set_permissions(dst, perms)
        .with_context(|| format!("failed to chmod {}", dst.display()))?;
    Ok(())
}

#[cfg(not(unix))]
pub fn copy_permissions(_src: &Path, _dst: &Path) -> Result<()> {
    Ok(())
}

/// Replace the leading home-dir prefix with a literal `$HOME` so paths in
/// generated files survive a change of home directory.
pub fn home_prefixed(path: &Path) -> String {
    if let Some(home) = dirs::home_dir() {
        if let Ok(rest) = path.strip_prefix(&home) {
            if rest.as_os_str().is_empty() {
                return "$HOME".to_string();
            }
            return format!("$HOME/{}", rest.display());
        }
    }
    path.display().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_creates_parents() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("a/b/c.json");
        atomic_write(&path, "{}\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{}\n");
    }

    #[test]
    fn copy_dir_resolves_symlinks_to_real_files() {
        let tmp = TempDir::new().unwrap();
        let target_dir = tmp.path().join("real");
        fs::create_dir_all(&target_dir).unwrap();
        fs::write(target_dir.join("file.txt"), "content").unwrap();

        let src = tmp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        crate::symlink::create(&src.join("linked"), &target_dir).unwrap();

        let dst = tmp.path().join("dst");
        copy_dir_all(&src, &dst, true).unwrap();

        let copied = dst.join("linked");
        assert!(copied.is_dir());
        assert!(!copied.is_symlink());
        assert_eq!(
            fs::read_to_string(copied.join("file.txt")).unwrap(),
            "content"
        );
    }

    #[test]
    fn copy_dir_preserves_symlinks_when_asked() {
        let tmp = TempDir::new().unwrap();
        let target = tmp.path().join("t");
        fs::write(&target, "x").unwrap();

        let src = tmp.path().join("src");
        fs::create_dir_all(&src).unwrap();
        #[cfg(unix)]
        std::os::unix::fs::symlink("../t", src.join("link")).unwrap();

        let dst = tmp.path().join("dst");
        copy_dir_all(&src, &dst, false).unwrap();
        assert!(dst.join("link").is_symlink());
        assert_eq!(
            fs::read_link(dst.join("link")).unwrap(),
            std::path::PathBuf::from("../t")
        );
    }

    #[test]
    fn move_path_moves_directories() {
        let tmp = TempDir::new().unwrap();
        let from = tmp.path().join("from");
        fs::create_dir_all(&from).unwrap();
        fs::write(from.join("f"), "1").unwrap();
        let to = tmp.path().join("nested/to");

        move_path(&from, &to).unwrap();
        assert!(!from.exists());
        assert_eq!(fs::read_to_string(to.join("f")).unwrap(), "1");
    }
}
