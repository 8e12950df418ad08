//! Recompute-or-reuse strategy for layer contributions.
//!
//! [`LayerCache`] is the seam: the performance layer only hands it a producer
//! callback. [`LayerContributor`] is the default implementation. It compares
//! a sha256 cache key over the expected metadata with the key stored in the
//! layer descriptor, and runs the producer only when they differ.

use anyhow::{anyhow, Context, Result};
use fs2::FileExt;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::path::PathBuf;
use tracing::info;

use super::{Layer, LayerTypes};

/// Metadata field holding the cache key of the last contribution.
pub const CACHE_KEY_FIELD: &str = "cache-key";

/// Producer invoked when a layer must be (re)built.
pub type Produce<'a> = dyn FnMut(Layer) -> Result<Layer> + 'a;

/// Decides whether a layer needs recomputation and, if so, runs `produce`.
pub trait LayerCache {
    fn contribute(&self, layer: Layer, produce: &mut Produce<'_>) -> Result<Layer>;
}

/// Metadata-comparing [`LayerCache`].
#[derive(Debug, Clone)]
pub struct LayerContributor {
    name: String,
    expected: BTreeMap<String, String>,
    types: LayerTypes,
}

impl LayerContributor {
    pub fn new(name: impl Into<String>, expected: BTreeMap<String, String>, types: LayerTypes) -> Self {
        Self {
            name: name.into(),
            expected,
            types,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// sha256 over the canonical JSON encoding of the expected metadata.
    pub fn cache_key(&self) -> Result<String> {
        let bytes = serde_json::to_vec(&self.expected).context("encoding layer metadata")?;
        Ok(format!("{:x}", Sha256::digest(&bytes)))
    }
}

impl LayerCache for LayerContributor {
    fn contribute(&self, mut layer: Layer, produce: &mut Produce<'_>) -> Result<Layer> {
        let _lock = LayerLock::acquire(&layer)?;
        let key = self.cache_key()?;

        if layer.path.is_dir() && layer.metadata.get(CACHE_KEY_FIELD) == Some(&key) {
            info!(layer = %self.name, cache_key = %key, "Reusing cached layer");
            layer.types = self.types;
            layer.write()?;
            return Ok(layer);
        }

        info!(layer = %self.name, cache_key = %key, "Contributing to layer");
        layer.reset()?;

        let mut layer = produce(layer)?;

        layer.metadata = self.expected.clone();
        layer.metadata.insert(CACHE_KEY_FIELD.to_string(), key);
        layer.types = self.types;
        layer.write()?;
        Ok(layer)
    }
}

/// RAII guard: exclusive lock on `<layers>/<name>.lock`, removed on drop.
#[derive(Debug)]
struct LayerLock {
    _file: File,
    path: PathBuf,
}

impl LayerLock {
    fn acquire(layer: &Layer) -> Result<Self> {
        let path = layer.path.with_file_name(format!("{}.lock", layer.name));
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("Failed to create lock file: {}", path.display()))?;

        if file.try_lock_exclusive().is_err() {
            drop(file);
            return Err(anyhow!(
                "Layer is being contributed by another process: {}",
                path.display()
            ));
        }

        Ok(Self { _file: file, path })
    }
}

impl Drop for LayerLock {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
