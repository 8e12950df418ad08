//! Jar manifest (`META-INF/MANIFEST.MF`) lookup.
//!
//! Only the main section is read. Attribute lines are `Name: value`; a line
//! starting with a single space continues the previous value.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Manifest location relative to an application root.
pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

/// Entry class of a Spring Boot application.
pub const START_CLASS: &str = "Start-Class";
pub const SPRING_BOOT_CLASSES: &str = "Spring-Boot-Classes";
pub const SPRING_BOOT_LIB: &str = "Spring-Boot-Lib";
pub const SPRING_BOOT_CLASSPATH_INDEX: &str = "Spring-Boot-Classpath-Index";

/// Main-section attributes of a jar manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    entries: BTreeMap<String, String>,
}

impl Manifest {
    /// Read the manifest of an exploded application.
    ///
    /// A missing manifest yields an empty one.
    pub fn read(app_dir: &Path) -> Result<Self> {
        let path = app_dir.join(MANIFEST_PATH);
        if !path.is_file() {
            return Ok(Self::default());
        }
        let text = fs::read_to_string(&path)
            .with_context(|| format!("reading manifest '{}'", path.display()))?;
        Ok(Self::parse(&text))
    }

    pub fn parse(text: &str) -> Self {
        let mut entries = BTreeMap::new();
        let mut current: Option<(String, String)> = None;

        for line in text.lines() {
            if let Some(rest) = line.strip_prefix(' ') {
                if let Some((_, value)) = current.as_mut() {
                    value.push_str(rest);
                }
                continue;
            }

            if let Some((key, value)) = current.take() {
                entries.insert(key, value);
            }

            // Blank line ends the main section.
            if line.trim().is_empty() {
                if entries.is_empty() {
                    continue;
                }
                break;
            }

            if let Some((key, value)) = line.split_once(':') {
                let value = value.strip_prefix(' ').unwrap_or(value);
                current = Some((key.trim().to_string(), value.to_string()));
            }
        }

        if let Some((key, value)) = current {
            entries.insert(key, value);
        }

        Self { entries }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// `Start-Class` value, or `""` when absent.
    pub fn start_class(&self) -> &str {
        self.get(START_CLASS).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
