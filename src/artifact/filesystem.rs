//! Filesystem utilities for staging application artifacts.

use anyhow::{Context, Result};
use std::ffi::OsString;
use std::fs;
use std::os::unix::fs::symlink;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use walkdir::WalkDir;

/// Time-stamped directory name, unique per call within one process.
pub fn tmp_name(prefix: &str) -> String {
    let n = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    format!("{prefix}-{n}")
}

/// Copy a file into place through a temporary sibling, so `dst` is either
/// absent or complete.
pub fn copy_file_atomic(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    let tmp = dst.with_extension("tmp");
    fs::copy(src, &tmp)
        .with_context(|| format!("Failed to copy {} to {}", src.display(), tmp.display()))?;
    fs::rename(&tmp, dst)
        .with_context(|| format!("Failed to move {} to {}", tmp.display(), dst.display()))?;
    Ok(())
}

/// Move every entry of `dir` into `backup`, leaving `dir` itself in place.
///
/// `dir` may be a mount point or sit under a parent the caller cannot write
/// to. Entries are renamed where possible and copied otherwise, for example
/// when `backup` is on another filesystem.
pub fn move_contents(dir: &Path, backup: &Path) -> Result<()> {
    fs::create_dir_all(backup)
        .with_context(|| format!("Failed to create directory: {}", backup.display()))?;
    for name in sorted_entries(dir)? {
        move_entry(&dir.join(&name), &backup.join(&name))?;
    }
    Ok(())
}

/// Put entries saved by [`move_contents`] back into `dir`, discarding
/// whatever is there now, then remove `backup`.
pub fn restore_contents(backup: &Path, dir: &Path) -> Result<()> {
    clear_dir(dir)?;
    move_contents(backup, dir)?;
    fs::remove_dir(backup)
        .with_context(|| format!("Failed to remove {}", backup.display()))?;
    Ok(())
}

/// Remove every entry of `dir`, creating it if missing.
pub fn clear_dir(dir: &Path) -> Result<()> {
    if !dir.exists() {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;
        return Ok(());
    }
    for name in sorted_entries(dir)? {
        remove_path(&dir.join(name))?;
    }
    Ok(())
}

/// Copy `from` to `to`, recreating symlinks rather than following them.
pub fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    for ent in WalkDir::new(from)
        .follow_links(false)
        .follow_root_links(false)
        .sort_by_file_name()
    {
        let ent = ent.with_context(|| format!("Failed to walk {}", from.display()))?;
        let src = ent.path();
        let dst = match src.strip_prefix(from) {
            Ok(rel) if rel.as_os_str().is_empty() => to.to_path_buf(),
            Ok(rel) => to.join(rel),
            Err(_) => to.to_path_buf(),
        };
        let ft = ent.file_type();

        if ft.is_symlink() {
            let target = fs::read_link(src)
                .with_context(|| format!("Failed to read link {}", src.display()))?;
            symlink(&target, &dst)
                .with_context(|| format!("Failed to create link {}", dst.display()))?;
        } else if ft.is_dir() {
            fs::create_dir_all(&dst)
                .with_context(|| format!("Failed to create directory: {}", dst.display()))?;
        } else {
            fs::copy(src, &dst).with_context(|| {
                format!("Failed to copy {} to {}", src.display(), dst.display())
            })?;
        }
    }
    Ok(())
}

fn move_entry(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    copy_tree(from, to)?;
    remove_path(from)
}

fn remove_path(path: &Path) -> Result<()> {
    let md = fs::symlink_metadata(path)
        .with_context(|| format!("Failed to stat {}", path.display()))?;
    let removed = if md.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    removed.with_context(|| format!("Failed to remove {}", path.display()))
}

fn sorted_entries(dir: &Path) -> Result<Vec<OsString>> {
    let mut names = fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?
        .map(|ent| ent.map(|e| e.file_name()))
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("Failed to read directory: {}", dir.display()))?;
    names.sort();
    Ok(names)
}
