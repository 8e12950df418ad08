//! Build/launch layer model.
//!
//! A layer lives at `<layers>/<name>/` and is described by
//! `<layers>/<name>.toml`:
//!
//! ```toml
//! [types]
//! build = true
//! launch = true
//! cache = false
//!
//! [metadata]
//! cache-key = "..."
//! ```
//!
//! Launch environment defaults are stored one file per variable as
//! `<layers>/<name>/env.launch/<NAME>.default`, so they can still be
//! overridden at launch time.

pub mod contributor;

pub use contributor::{LayerCache, LayerContributor};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};

use crate::artifact::filesystem::tmp_name;

/// Directory inside a layer holding launch environment files.
pub const LAUNCH_ENV_DIR: &str = "env.launch";
const DEFAULT_SUFFIX: &str = "default";

/// Which lifecycle phases may see the layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayerTypes {
    #[serde(default)]
    pub build: bool,
    #[serde(default)]
    pub launch: bool,
    #[serde(default)]
    pub cache: bool,
}

/// Environment variable defaults contributed by a layer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    defaults: BTreeMap<String, String>,
}

impl Environment {
    /// Record `name=value` as a default.
    pub fn set_default(&mut self, name: impl Into<String>, value: impl Display) {
        self.defaults.insert(name.into(), value.to_string());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.defaults.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.defaults.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.defaults.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    fn clear(&mut self) {
        self.defaults.clear();
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LayerDescriptor {
    #[serde(default)]
    types: LayerTypes,
    #[serde(default)]
    metadata: BTreeMap<String, String>,
}

/// A layer directory plus the state that is persisted alongside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layer {
    pub name: String,
    pub path: PathBuf,
    pub types: LayerTypes,
    pub launch_env: Environment,
    pub metadata: BTreeMap<String, String>,
}

impl Layer {
    /// A layer named `name` under `layers_dir` with no persisted state.
    pub fn new(layers_dir: &Path, name: &str) -> Self {
        Self {
            name: name.to_string(),
            path: layers_dir.join(name),
            types: LayerTypes::default(),
            launch_env: Environment::default(),
            metadata: BTreeMap::new(),
        }
    }

    /// Load a layer, picking up any descriptor and launch environment left
    /// by a previous contribution.
    pub fn load(layers_dir: &Path, name: &str) -> Result<Self> {
        let mut layer = Self::new(layers_dir, name);

        let descriptor_path = layer.descriptor_path();
        if descriptor_path.is_file() {
            let text = fs::read_to_string(&descriptor_path).with_context(|| {
                format!("reading layer descriptor '{}'", descriptor_path.display())
            })?;
            let descriptor: LayerDescriptor = toml::from_str(&text).with_context(|| {
                format!("parsing layer descriptor '{}'", descriptor_path.display())
            })?;
            layer.types = descriptor.types;
            layer.metadata = descriptor.metadata;
        }

        let env_dir = layer.launch_env_dir();
        if env_dir.is_dir() {
            for entry in fs::read_dir(&env_dir)
                .with_context(|| format!("reading '{}'", env_dir.display()))?
            {
                let path = entry?.path();
                let Some(file_name) = path.file_name().and_then(|s| s.to_str()) else {
                    continue;
                };
                let Some(var) = file_name.strip_suffix(&format!(".{DEFAULT_SUFFIX}")) else {
                    continue;
                };
                let value = fs::read_to_string(&path)
                    .with_context(|| format!("reading '{}'", path.display()))?;
                layer.launch_env.set_default(var, value);
            }
        }

        Ok(layer)
    }

    /// `<layers>/<name>.toml`.
    pub fn descriptor_path(&self) -> PathBuf {
        self.path.with_file_name(format!("{}.toml", self.name))
    }

    pub fn launch_env_dir(&self) -> PathBuf {
        self.path.join(LAUNCH_ENV_DIR)
    }

    /// Empty the layer directory and forget persisted state.
    ///
    /// The descriptor goes too, so a contribution that fails after this point
    /// leaves no cache key behind for the emptied directory.
    pub fn reset(&mut self) -> Result<()> {
        let descriptor = self.descriptor_path();
        if descriptor.exists() {
            fs::remove_file(&descriptor)
                .with_context(|| format!("removing '{}'", descriptor.display()))?;
        }
        if self.path.exists() {
            fs::remove_dir_all(&self.path)
                .with_context(|| format!("removing layer '{}'", self.path.display()))?;
        }
        fs::create_dir_all(&self.path)
            .with_context(|| format!("creating layer '{}'", self.path.display()))?;
        self.launch_env.clear();
        self.metadata.clear();
        Ok(())
    }

    /// Persist the launch environment and descriptor.
    pub fn write(&self) -> Result<()> {
        fs::create_dir_all(&self.path)
            .with_context(|| format!("creating layer '{}'", self.path.display()))?;

        let env_dir = self.launch_env_dir();
        if env_dir.exists() {
            fs::remove_dir_all(&env_dir)
                .with_context(|| format!("removing '{}'", env_dir.display()))?;
        }
        if !self.launch_env.is_empty() {
            fs::create_dir_all(&env_dir)
                .with_context(|| format!("creating '{}'", env_dir.display()))?;
            for (name, value) in self.launch_env.iter() {
                let path = env_dir.join(format!("{name}.{DEFAULT_SUFFIX}"));
                fs::write(&path, value)
                    .with_context(|| format!("writing '{}'", path.display()))?;
            }
        }

        let descriptor = LayerDescriptor {
            types: self.types,
            metadata: self.metadata.clone(),
        };
        let text = toml::to_string(&descriptor).context("serializing layer descriptor")?;
        let path = self.descriptor_path();
        let tmp = path.with_file_name(tmp_name(&format!(".{}.toml", self.name)));
        fs::write(&tmp, text).with_context(|| format!("writing '{}'", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("writing '{}'", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_and_load_roundtrip() {
        let temp = TempDir::new().unwrap();
        let mut layer = Layer::new(temp.path(), "Performance");
        layer.types = LayerTypes {
            build: true,
            launch: true,
            cache: false,
        };
        layer.launch_env.set_default("BPL_SPRING_AOT_ENABLED", false);
        layer.launch_env.set_default("BPL_JVM_CDS_ENABLED", true);
        layer
            .metadata
            .insert("cache-key".to_string(), "abc".to_string());

        layer.write().unwrap();

        assert_eq!(
            fs::read_to_string(temp.path().join("Performance/env.launch/BPL_JVM_CDS_ENABLED.default"))
                .unwrap(),
            "true"
        );
        let descriptor = fs::read_to_string(temp.path().join("Performance.toml")).unwrap();
        assert!(descriptor.contains("[types]"));
        assert!(descriptor.contains("[metadata]"));

        let loaded = Layer::load(temp.path(), "Performance").unwrap();
        assert_eq!(loaded, layer);
    }

    #[test]
    fn test_load_missing_layer_is_empty() {
        let temp = TempDir::new().unwrap();
        let layer = Layer::load(temp.path(), "Performance").unwrap();
        assert_eq!(layer.path, temp.path().join("Performance"));
        assert!(layer.metadata.is_empty());
        assert!(layer.launch_env.is_empty());
    }

    #[test]
    fn test_reset_clears_contents_and_state() {
        let temp = TempDir::new().unwrap();
        let mut layer = Layer::new(temp.path(), "Performance");
        fs::create_dir_all(&layer.path).unwrap();
        fs::write(layer.path.join("runner.jar"), "old").unwrap();
        layer.launch_env.set_default("X", 1);
        layer.metadata.insert("k".into(), "v".into());

        layer.write().unwrap();

        layer.reset().unwrap();

        assert!(!layer.descriptor_path().exists());
        assert!(layer.path.is_dir());
        assert!(!layer.path.join("runner.jar").exists());
        assert!(layer.launch_env.is_empty());
        assert!(layer.metadata.is_empty());
    }

    #[test]
    fn test_write_drops_removed_env_defaults() {
        let temp = TempDir::new().unwrap();
        let mut layer = Layer::new(temp.path(), "Performance");
        layer.launch_env.set_default("BPL_JVM_CDS_ENABLED", true);
        layer.write().unwrap();

        layer.launch_env = Environment::default();
        layer.write().unwrap();

        assert!(!layer.launch_env_dir().exists());
    }
}
