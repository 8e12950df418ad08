//! Content fingerprint of an application directory.
//!
//! Feeds the layer's expected metadata so that changed application content
//! invalidates a cached layer while timestamps and permissions do not.
//!
//! A contribution rewrites the application directory, so a digest taken
//! afterwards only matches the next run when that run starts from the same
//! output. Build outputs such as `application.jsa` are left out through the
//! `exclude` list.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use walkdir::WalkDir;

use crate::artifact::jar::entry_name;

/// sha256 over every relative path and file body under `dir`, in sorted order.
///
/// Symlinks are resolved, matching what the jar builder archives. Top-level
/// entries named in `exclude` are skipped along with their contents.
pub fn tree_sha256(dir: &Path, exclude: &[&str]) -> Result<String> {
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 1024 * 1024];

    let walker = WalkDir::new(dir)
        .follow_links(true)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|ent| {
            ent.depth() != 1
                || !exclude
                    .iter()
                    .any(|name| ent.file_name() == std::ffi::OsStr::new(name))
        });

    for ent in walker {
        let ent = ent.with_context(|| format!("Failed to walk {}", dir.display()))?;
        let rel = entry_name(dir, ent.path())?;

        if ent.file_type().is_dir() {
            hasher.update(b"D\0");
            hasher.update(rel.as_bytes());
            hasher.update(b"\0");
            continue;
        }

        hasher.update(b"F\0");
        hasher.update(rel.as_bytes());
        hasher.update(b"\0");

        let f = File::open(ent.path())
            .with_context(|| format!("Failed to open {}", ent.path().display()))?;
        let mut r = BufReader::new(f);
        let mut size = 0u64;
        loop {
            let n = r.read(&mut buf)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            size += n as u64;
        }
        hasher.update(size.to_le_bytes());
    }

    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn app(root: &Path) {
        fs::create_dir_all(root.join("BOOT-INF/lib")).unwrap();
        fs::write(root.join("BOOT-INF/lib/a.jar"), "a").unwrap();
        fs::write(root.join("app.properties"), "k=v").unwrap();
    }

    #[test]
    fn test_same_content_same_digest() {
        let temp = TempDir::new().unwrap();
        app(&temp.path().join("one"));
        app(&temp.path().join("two"));

        assert_eq!(
            tree_sha256(&temp.path().join("one"), &[]).unwrap(),
            tree_sha256(&temp.path().join("two"), &[]).unwrap()
        );
    }

    #[test]
    fn test_content_change_changes_digest() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("app");
        app(&root);
        let before = tree_sha256(&root, &[]).unwrap();

        fs::write(root.join("app.properties"), "k=changed").unwrap();
        assert_ne!(before, tree_sha256(&root, &[]).unwrap());
    }

    #[test]
    fn test_rename_changes_digest() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("app");
        app(&root);
        let before = tree_sha256(&root, &[]).unwrap();

        fs::rename(root.join("app.properties"), root.join("other.properties")).unwrap();
        assert_ne!(before, tree_sha256(&root, &[]).unwrap());
    }

    #[test]
    fn test_excluded_top_level_entry_is_ignored() {
        let temp = TempDir::new().unwrap();
        let root = temp.path().join("app");
        app(&root);
        let before = tree_sha256(&root, &["application.jsa"]).unwrap();

        fs::write(root.join("application.jsa"), "cds").unwrap();
        assert_eq!(before, tree_sha256(&root, &["application.jsa"]).unwrap());

        fs::write(root.join("BOOT-INF/application.jsa"), "nested").unwrap();
        assert_ne!(before, tree_sha256(&root, &["application.jsa"]).unwrap());
    }

    #[test]
    fn test_non_utf8_name_is_an_error() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let temp = TempDir::new().unwrap();
        let root = temp.path().join("app");
        app(&root);
        fs::write(root.join(OsStr::from_bytes(b"a\xff.class")), "x").unwrap();

        let err = tree_sha256(&root, &[]).unwrap_err();
        assert!(format!("{err:#}").contains("not valid UTF-8"));
    }
}
