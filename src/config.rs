//! Training configuration and environment resolution.

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;

/// Whether to perform a training run and contribute a CDS archive.
pub const BP_JVM_CDS_ENABLED: &str = "BP_JVM_CDS_ENABLED";
/// Whether the application was built with Spring AOT processing.
pub const BP_SPRING_AOT_ENABLED: &str = "BP_SPRING_AOT_ENABLED";
/// Whether the exploded application must be rebuilt into a jar before extraction.
pub const BP_JVM_CDS_REZIP: &str = "BP_JVM_CDS_REZIP";
/// Explicit training-run classpath.
pub const BP_JVM_CDS_CLASSPATH: &str = "BP_JVM_CDS_CLASSPATH";

/// Tool options used only for the training run; wins over [`JAVA_TOOL_OPTIONS`].
pub const CDS_TRAINING_JAVA_TOOL_OPTIONS: &str = "CDS_TRAINING_JAVA_TOOL_OPTIONS";
pub const JAVA_TOOL_OPTIONS: &str = "JAVA_TOOL_OPTIONS";

/// Decision inputs for one layer contribution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrainingConfig {
    /// Pass `-Dspring.aot.enabled=true` to the training run.
    pub aot_enabled: bool,
    /// Perform the training run at all.
    pub training_run: bool,
    /// Rebuild the application directory into a jar before extracting it.
    pub rezip: bool,
    /// Classpath handed to the JVM with `-cp`.
    pub classpath: String,
}

impl TrainingConfig {
    /// Build a configuration from `BP_*` variables.
    ///
    /// Unset booleans default to `false`; an unset classpath is empty and is
    /// expected to be derived by the caller.
    pub fn from_env<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            aot_enabled: env_bool(&lookup, BP_SPRING_AOT_ENABLED)?,
            training_run: env_bool(&lookup, BP_JVM_CDS_ENABLED)?,
            rezip: env_bool(&lookup, BP_JVM_CDS_REZIP)?,
            classpath: lookup(BP_JVM_CDS_CLASSPATH).unwrap_or_default(),
        })
    }

    /// Fields that invalidate a cached layer when they change.
    pub fn metadata(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("aot-enabled".to_string(), self.aot_enabled.to_string()),
            ("training-run".to_string(), self.training_run.to_string()),
            ("rezip".to_string(), self.rezip.to_string()),
            ("classpath".to_string(), self.classpath.clone()),
        ])
    }
}

/// Parse a boolean the way buildpack environment flags are written.
pub fn parse_bool(value: &str) -> Result<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Ok(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Ok(false),
        other => bail!("invalid boolean '{}'", other),
    }
}

fn env_bool<F>(lookup: &F, key: &str) -> Result<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => parse_bool(value.trim()).with_context(|| format!("parsing ${key}")),
        None => Ok(false),
    }
}

/// Resolve the `JAVA_TOOL_OPTIONS` value for the training run.
///
/// `CDS_TRAINING_JAVA_TOOL_OPTIONS` is consulted first, then
/// `JAVA_TOOL_OPTIONS`. A variable that is set (even to an empty string)
/// stops the search. Returns `None` when the result is empty.
pub fn resolve_tool_options<F>(lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(CDS_TRAINING_JAVA_TOOL_OPTIONS)
        .or_else(|| lookup(JAVA_TOOL_OPTIONS))
        .filter(|value| !value.is_empty())
}
