//! Training-run classpath derivation.
//!
//! Used when the caller does not supply a classpath explicitly.
//!
//! - Repackaged applications are extracted by the Spring Boot tools jarmode
//!   into `runner.jar` plus a `lib/` directory referenced from the jar's own
//!   `Class-Path`, so the classpath is just the jar.
//! - Exploded applications run from the directory itself: the root, the
//!   `Spring-Boot-Classes` directory, then every library jar in the order of
//!   the `Spring-Boot-Classpath-Index` (or, without an index, the sorted
//!   contents of `Spring-Boot-Lib`).

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::artifact::jar::RUNNER_JAR;
use crate::manifest::{Manifest, SPRING_BOOT_CLASSES, SPRING_BOOT_CLASSPATH_INDEX, SPRING_BOOT_LIB};

pub const CLASSPATH_SEPARATOR: &str = ":";

/// Derive the classpath for a training run of the application at `app_dir`.
pub fn resolve(app_dir: &Path, manifest: &Manifest, rezip: bool) -> Result<String> {
    if rezip {
        return Ok(RUNNER_JAR.to_string());
    }

    let mut entries: Vec<PathBuf> = vec![app_dir.to_path_buf()];

    if let Some(classes) = manifest.get(SPRING_BOOT_CLASSES) {
        entries.push(app_dir.join(classes.trim_end_matches('/')));
    }

    let index = manifest
        .get(SPRING_BOOT_CLASSPATH_INDEX)
        .map(|idx| app_dir.join(idx))
        .filter(|path| path.is_file());

    if let Some(index) = index {
        let text = fs::read_to_string(&index)
            .with_context(|| format!("reading classpath index '{}'", index.display()))?;
        entries.extend(parse_classpath_index(&text).map(|lib| app_dir.join(lib)));
    } else if let Some(lib) = manifest.get(SPRING_BOOT_LIB) {
        entries.extend(list_jars(&app_dir.join(lib))?);
    }

    Ok(entries
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(CLASSPATH_SEPARATOR))
}

/// Library paths listed in a `classpath.idx` file (`- "BOOT-INF/lib/x.jar"`).
pub fn parse_classpath_index(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .filter_map(|line| line.trim().strip_prefix('-'))
        .map(|entry| entry.trim().trim_matches('"'))
        .filter(|entry| !entry.is_empty())
}

fn list_jars(lib_dir: &Path) -> Result<Vec<PathBuf>> {
    if !lib_dir.is_dir() {
        return Ok(vec![]);
    }
    let mut jars = vec![];
    for entry in fs::read_dir(lib_dir)
        .with_context(|| format!("reading library directory '{}'", lib_dir.display()))?
    {
        let path = entry?.path();
        if path.extension().and_then(|s| s.to_str()) == Some("jar") {
            jars.push(path);
        }
    }
    jars.sort();
    Ok(jars)
}
