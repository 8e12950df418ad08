//! Visit-every-path traversal with fail-fast semantics.
//!
//! [`walk_and_apply`] visits the root and everything below it in a stable
//! order and stops at the first failure, whether that failure comes from the
//! traversal itself or from the applied operation.
//!
//! Directories are visited after their contents (siblings sorted by file
//! name), so a directory is never read again once the operation has been
//! applied to it. Operations that touch access times rely on this.

use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

/// Why a walk stopped.
#[derive(Debug, Error)]
pub enum WalkError<E>
where
    E: std::error::Error + 'static,
{
    /// The directory tree could not be read at `path`.
    #[error("failed to walk {}", .path.display())]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    /// The applied operation failed for `path`.
    #[error("failed to apply operation to {}", .path.display())]
    Apply {
        path: PathBuf,
        #[source]
        source: E,
    },
}

/// Apply `apply` to `root` and every path beneath it.
///
/// Symlinks are visited as paths but not descended into. The root is visited
/// last. Returns the number of paths visited.
pub fn walk_and_apply<E, F>(root: &Path, mut apply: F) -> Result<usize, WalkError<E>>
where
    E: std::error::Error + 'static,
    F: FnMut(&Path) -> Result<(), E>,
{
    let mut visited = 0usize;
    for entry in WalkDir::new(root)
        .follow_links(false)
        .contents_first(true)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|source| WalkError::Walk {
            path: source
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| root.to_path_buf()),
            source,
        })?;
        apply(entry.path()).map_err(|source| WalkError::Apply {
            path: entry.path().to_path_buf(),
            source,
        })?;
        visited += 1;
    }
    Ok(visited)
}
