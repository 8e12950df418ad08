//! Deterministic jar creation from an exploded application directory.
//!
//! The output is a plain zip with every entry stored uncompressed. The layer
//! step stays I/O-bound, and the Spring Boot extractor reads it back without
//! inflating anything.
//!
//! Identical input content always produces byte-identical output:
//! - entries are written in pre-order, siblings sorted by file name
//! - every entry carries the zip epoch (1980-01-01 00:00:00) as its mtime
//! - unix modes are normalized to [`DIR_MODE`], [`EXEC_MODE`] or [`FILE_MODE`]
//! - symlinks are resolved, so the archive never contains a link entry

use anyhow::{bail, Context, Result};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

/// File name of the rebuilt application jar, both in the staging directory
/// and in the layer.
pub const RUNNER_JAR: &str = "runner.jar";

/// Mode recorded for directory entries.
pub const DIR_MODE: u32 = 0o755;
/// Mode recorded for files with any execute bit set.
pub const EXEC_MODE: u32 = 0o755;
/// Mode recorded for all other files.
pub const FILE_MODE: u32 = 0o644;

/// Build an uncompressed jar at `destination` from the contents of `source_dir`.
///
/// The root directory itself is not recorded; entry names are paths relative
/// to it with `/` separators, directories carrying a trailing `/`.
///
/// Symlinks are followed: a link to a file is stored as the file's content
/// under the link's name, and a link to a directory is descended into. A link
/// that cannot be resolved fails the whole build.
///
/// On error the file at `destination` is incomplete and must not be used.
///
/// # Example
///
/// ```rust,ignore
/// use spring_cds::artifact::jar::build_jar;
/// use std::path::Path;
///
/// build_jar(Path::new("/workspace"), Path::new("/tmp/jar-dest/runner.jar"))?;
/// ```
pub fn build_jar(source_dir: &Path, destination: &Path) -> Result<()> {
    if !source_dir.is_dir() {
        bail!("Source directory not found: {}", source_dir.display());
    }

    let out = File::create(destination)
        .with_context(|| format!("Failed to create {}", destination.display()))?;
    let mut writer = ZipWriter::new(BufWriter::new(out));

    for ent in WalkDir::new(source_dir)
        .follow_links(true)
        .min_depth(1)
        .sort_by_file_name()
    {
        let ent = ent.map_err(|err| {
            let path = err
                .path()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| source_dir.to_path_buf());
            anyhow::Error::new(err).context(format!("Failed to resolve {}", path.display()))
        })?;
        let p = ent.path();

        let rel = entry_name(source_dir, p)?;

        // With follow_links this is the metadata of the link target.
        let md = ent
            .metadata()
            .with_context(|| format!("Failed to stat {}", p.display()))?;

        if md.is_dir() {
            writer
                .add_directory(format!("{rel}/"), entry_options(DIR_MODE, false))
                .with_context(|| format!("Failed to write directory entry {}", p.display()))?;
            continue;
        }

        if ent.path_is_symlink() {
            tracing::debug!(path = %p.display(), "archiving symlink target content");
        }

        let large = md.len() >= u64::from(u32::MAX);
        writer
            .start_file(rel, entry_options(file_mode(&md), large))
            .with_context(|| format!("Failed to write file entry {}", p.display()))?;
        let mut f = File::open(p).with_context(|| format!("Failed to open {}", p.display()))?;
        io::copy(&mut f, &mut writer)
            .with_context(|| format!("Failed to copy {} into archive", p.display()))?;
    }

    let mut out = writer
        .finish()
        .with_context(|| format!("Failed to finalize {}", destination.display()))?;
    out.flush()
        .with_context(|| format!("Failed to flush {}", destination.display()))?;
    Ok(())
}

/// `/`-separated name of `path` relative to `root`.
///
/// Zip entry names are UTF-8, so a path that is not valid UTF-8 is an error
/// rather than a lossy name that could collide with a sibling.
pub(crate) fn entry_name(root: &Path, path: &Path) -> Result<String> {
    let rel = path.strip_prefix(root).unwrap_or(path);
    let name = rel
        .to_str()
        .with_context(|| format!("File name is not valid UTF-8: {}", path.display()))?;
    Ok(name.replace('\\', "/"))
}

fn entry_options(mode: u32, large: bool) -> FileOptions {
    FileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .last_modified_time(DateTime::default())
        .unix_permissions(mode)
        .large_file(large)
}

#[cfg(unix)]
fn file_mode(md: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    if md.permissions().mode() & 0o111 != 0 {
        EXEC_MODE
    } else {
        FILE_MODE
    }
}

#[cfg(not(unix))]
fn file_mode(_md: &fs::Metadata) -> u32 {
    FILE_MODE
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use std::os::unix::fs::{symlink, PermissionsExt};
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;
    use zip::ZipArchive;

    fn sample_app(root: &Path) {
        fs::create_dir_all(root.join("BOOT-INF/classes/com/example")).unwrap();
        fs::create_dir_all(root.join("BOOT-INF/lib")).unwrap();
        fs::create_dir_all(root.join("META-INF")).unwrap();
        fs::write(
            root.join("META-INF/MANIFEST.MF"),
            "Manifest-Version: 1.0\nStart-Class: com.example.App\n",
        )
        .unwrap();
        fs::write(
            root.join("BOOT-INF/classes/com/example/App.class"),
            b"\xca\xfe\xba\xbe",
        )
        .unwrap();
        fs::write(root.join("BOOT-INF/lib/dep.jar"), b"dependency").unwrap();
    }

    fn read_entries(jar: &Path) -> Vec<(String, bool, Vec<u8>)> {
        let mut archive = ZipArchive::new(File::open(jar).unwrap()).unwrap();
        let mut out = vec![];
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).unwrap();
            assert_eq!(entry.compression(), CompressionMethod::Stored);
            let mut body = vec![];
            entry.read_to_end(&mut body).unwrap();
            out.push((entry.name().to_string(), entry.is_dir(), body));
        }
        out
    }

    #[test]
    fn test_build_jar_roundtrip() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("app");
        let jar = temp.path().join("runner.jar");
        sample_app(&src);

        build_jar(&src, &jar).unwrap();

        let dest = temp.path().join("extracted");
        let mut archive = ZipArchive::new(File::open(&jar).unwrap()).unwrap();
        archive.extract(&dest).unwrap();

        for rel in [
            "META-INF/MANIFEST.MF",
            "BOOT-INF/classes/com/example/App.class",
            "BOOT-INF/lib/dep.jar",
        ] {
            assert_eq!(
                fs::read(src.join(rel)).unwrap(),
                fs::read(dest.join(rel)).unwrap(),
                "content of {rel}"
            );
        }
    }

    #[test]
    fn test_build_jar_entry_order_and_directories() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("app");
        let jar = temp.path().join("runner.jar");
        sample_app(&src);

        build_jar(&src, &jar).unwrap();

        let entries = read_entries(&jar);
        let names: Vec<&str> = entries.iter().map(|(n, _, _)| n.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "BOOT-INF/",
                "BOOT-INF/classes/",
                "BOOT-INF/classes/com/",
                "BOOT-INF/classes/com/example/",
                "BOOT-INF/classes/com/example/App.class",
                "BOOT-INF/lib/",
                "BOOT-INF/lib/dep.jar",
                "META-INF/",
                "META-INF/MANIFEST.MF",
            ]
        );

        for (name, is_dir, body) in &entries {
            if name.ends_with('/') {
                assert!(is_dir, "{name} should be a directory entry");
                assert!(body.is_empty(), "{name} should carry no content");
            } else {
                assert!(!is_dir);
            }
        }
    }

    #[test]
    fn test_build_jar_resolves_file_symlink() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("app");
        let jar = temp.path().join("runner.jar");
        let outside = temp.path().join("shared.jar");
        fs::create_dir_all(src.join("lib")).unwrap();
        fs::write(&outside, b"shared library").unwrap();
        symlink(&outside, src.join("lib/linked.jar")).unwrap();

        build_jar(&src, &jar).unwrap();

        let entries = read_entries(&jar);
        let linked = entries
            .iter()
            .find(|(n, _, _)| n == "lib/linked.jar")
            .expect("linked entry missing");
        assert_eq!(linked.2, b"shared library");

        let mut archive = ZipArchive::new(File::open(&jar).unwrap()).unwrap();
        let entry = archive.by_name("lib/linked.jar").unwrap();
        let mode = entry.unix_mode().unwrap();
        // S_IFLNK would mark a stored symlink.
        assert_ne!(mode & 0o170000, 0o120000);
    }

    #[test]
    fn test_build_jar_descends_into_directory_symlink() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("app");
        let jar = temp.path().join("runner.jar");
        let shared = temp.path().join("shared");
        fs::create_dir_all(&shared).unwrap();
        fs::write(shared.join("a.jar"), b"a").unwrap();
        fs::create_dir_all(&src).unwrap();
        symlink(&shared, src.join("lib")).unwrap();

        build_jar(&src, &jar).unwrap();

        let entries = read_entries(&jar);
        let names: Vec<&str> = entries.iter().map(|(n, _, _)| n.as_str()).collect();
        assert_eq!(names, vec!["lib/", "lib/a.jar"]);
    }

    #[test]
    fn test_build_jar_dangling_symlink_fails() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("app");
        let jar = temp.path().join("runner.jar");
        fs::create_dir_all(&src).unwrap();
        symlink(temp.path().join("missing"), src.join("broken.jar")).unwrap();

        let err = build_jar(&src, &jar).unwrap_err();
        assert!(format!("{err:#}").contains("broken.jar"));
    }

    #[test]
    fn test_build_jar_is_deterministic() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("app");
        sample_app(&src);

        let first = temp.path().join("first.jar");
        build_jar(&src, &first).unwrap();

        // Same content, different filesystem metadata.
        let later = SystemTime::now() + Duration::from_secs(3600);
        let f = File::options()
            .write(true)
            .open(src.join("BOOT-INF/lib/dep.jar"))
            .unwrap();
        f.set_modified(later).unwrap();
        fs::set_permissions(
            src.join("META-INF/MANIFEST.MF"),
            fs::Permissions::from_mode(0o600),
        )
        .unwrap();

        let second = temp.path().join("second.jar");
        build_jar(&src, &second).unwrap();

        assert_eq!(fs::read(&first).unwrap(), fs::read(&second).unwrap());
    }

    #[test]
    fn test_build_jar_rejects_non_utf8_names() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let temp = TempDir::new().unwrap();
        let src = temp.path().join("app");
        let jar = temp.path().join("runner.jar");
        fs::create_dir_all(&src).unwrap();
        fs::write(src.join(OsStr::from_bytes(b"a\xff.class")), b"one").unwrap();
        fs::write(src.join(OsStr::from_bytes(b"a\xfe.class")), b"two").unwrap();

        let err = build_jar(&src, &jar).unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("not valid UTF-8"), "{msg}");
        assert!(msg.contains(".class"), "{msg}");
    }

    #[test]
    fn test_build_jar_missing_source() {
        let temp = TempDir::new().unwrap();
        let err = build_jar(&temp.path().join("nope"), &temp.path().join("out.jar")).unwrap_err();
        assert!(err.to_string().contains("Source directory not found"));
    }
}
