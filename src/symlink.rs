// symlink.rs - Symlink creation, inspection, validation, and atomic swap

use anyhow::{Context, Result};
use std::fs;
use std::path::{Component, Path, PathBuf};

/// What a path looks like on disk, symlink-wise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkInfo {
    pub exists: bool,
    pub is_symlink: bool,
    /// Symlink whose resolved target does not exist.
    pub is_broken: bool,
    /// The target exactly as stored in the link.
    pub target: Option<PathBuf>,
}

/// Compute the relative path from `link`'s parent directory to `target`.
///
/// Both paths must be absolute. The result is what gets written into the
/// symlink so the whole tree stays relocatable.
pub fn relative_target(link: &Path, target: &Path) -> PathBuf {
    let from = link.parent().unwrap_or_else(|| Path::new("/"));
    let from = lexical_normalize(from);
    let to = lexical_normalize(target);

    let from_parts: Vec<_> = from.components().collect();
    let to_parts: Vec<_> = to.components().collect();

    let common = from_parts
        .iter()
        .zip(to_parts.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..from_parts.len() {
        rel.push("..");
    }
    for part in &to_parts[common..] {
        rel.push(part);
    }
    if rel.as_os_str().is_empty() {
        rel.push(".");
    }
    rel
}

/// Resolve `.` and `..` components without touching the filesystem.
fn lexical_normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Create a symlink at `link` pointing to `target` via a relative path.
/// The parent directory is created if needed.
pub fn create(link: &Path, target: &Path) -> Result<()> {
    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let rel = relative_target(link, target);
    write_symlink(&rel, link)
        .with_context(|| format!("failed to link {} -> {}", link.display(), rel.display()))
}

#[cfg(unix)]
fn write_symlink(target: &Path, link: &Path) -> Result<()> {
    std::os::unix::fs::symlink(target, link)?;
    Ok(())
}

// Symlink failures on platforms without user-writable symlinks surface as
// errors; they are never downgraded to copies.
#[cfg(not(unix))]
fn write_symlink(_target: &Path, _link: &Path) -> Result<()> {
    anyhow::bail!("symlinks are only supported on Unix")
}

/// Remove a symlink (not its target). No-op if nothing is there.
pub fn remove(link: &Path) -> Result<()> {
    match fs::symlink_metadata(link) {
        Ok(_) => fs::remove_file(link)
            .with_context(|| format!("failed to remove symlink {}", link.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| format!("failed to inspect {}", link.display())),
    }
}

/// Read the stored (relative) target of a symlink.
pub fn read_target(link: &Path) -> Result<PathBuf> {
    fs::read_link(link).with_context(|| format!("failed to read symlink {}", link.display()))
}

/// Resolve a symlink's target to an absolute (lexically normalized) path.
pub fn resolved_target(link: &Path) -> Result<PathBuf> {
    let stored = read_target(link)?;
    if stored.is_absolute() {
        return Ok(lexical_normalize(&stored));
    }
    let parent = link.parent().unwrap_or_else(|| Path::new("/"));
    Ok(lexical_normalize(&parent.join(stored)))
}

/// Inspect a path without following it.
pub fn info(path: &Path) -> LinkInfo {
    let meta = fs::symlink_metadata(path);
    if meta.is_err() {
        return LinkInfo {
            exists: false,
            is_symlink: false,
            is_broken: false,
            target: None,
        };
    }
    let is_symlink = meta.map(|m| m.file_type().is_symlink()).unwrap_or(false);
    if !is_symlink {
        return LinkInfo {
            exists: true,
            is_symlink: false,
            is_broken: false,
            target: None,
        };
    }
    let target = fs::read_link(path).ok();
    // Path::exists follows the link, so a false here means broken.
    let is_broken = !path.exists();
    LinkInfo {
        exists: true,
        is_symlink: true,
        is_broken,
        target,
    }
}

/// True iff `link` is a symlink whose resolved target exists and is the
/// same file as `expected_target`.
pub fn validate(link: &Path, expected_target: &Path) -> bool {
    if !link.is_symlink() {
        return false;
    }
    let (Ok(actual), Ok(expected)) = (fs::canonicalize(link), fs::canonicalize(expected_target))
    else {
        return false;
    };
    actual == expected
}

/// Atomically repoint `link` at `new_target`.
///
/// Writes a temporary sibling link and renames it over the old one; rename
/// is atomic on the same filesystem. On rename failure the swap falls back
/// to remove-then-create and accepts the small non-atomic window.
pub fn swap(link: &Path, new_target: &Path) -> Result<()> {
    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let rel = relative_target(link, new_target);
    let tmp = link.with_extension("tmp");
    let _ = fs::remove_file(&tmp);
    write_symlink(&rel, &tmp)
        .with_context(|| format!("failed to write temporary link {}", tmp.display()))?;

    if fs::rename(&tmp, link).is_err() {
        let _ = fs::remove_file(&tmp);
        remove(link)?;
        write_symlink(&rel, link)
            .with_context(|| format!("failed to relink {}", link.display()))?;
    }
    Ok(())
}
