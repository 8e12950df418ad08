//! Spring Boot performance layer: CDS training run orchestration.
//!
//! One contribution walks these steps in order, failing fast:
//!
//! ```text
//! entry ── training not requested ──▶ Skipped (AOT launch flag only)
//!   │
//!   ├─ rezip? ── build runner.jar in a temp dir, copy it into the layer,
//!   │            move the application's contents into the temp dir
//!   ├─ extract    java -Djarmode=tools -jar <input> extract --destination <app>
//!   ├─ normalize  reset every path under <app> to 1980-01-01 00:00:01
//!   ├─ train      java [-Dspring.aot.enabled=true] -Dspring.context.exit=onRefresh
//!   │                  -XX:ArchiveClassesAtExit=application.jsa -cp <cp> <Start-Class>
//!   └─▶ Succeeded (AOT + CDS launch flags, <app>/application.jsa)
//! ```
//!
//! When repackaging, the application directory itself stays in place (it is
//! often a mount point or owned by a different user than its parent). Its
//! contents are kept in the staging directory until extraction succeeds and
//! are put back if it fails.

use anyhow::{Context, Result};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::artifact::filesystem::{copy_file_atomic, move_contents, restore_contents, tmp_name};
use crate::artifact::jar::{build_jar, RUNNER_JAR};
use crate::config::{resolve_tool_options, TrainingConfig, JAVA_TOOL_OPTIONS};
use crate::error::PerformanceError;
use crate::layer::{Layer, LayerCache, LayerTypes};
use crate::manifest::Manifest;
use crate::process::{CommandExecutor, Execution, Executor};
use crate::timestamps::{normalize_tree, parse_timestamp, FIXED_TIMESTAMP};

/// Name of the contributed layer.
pub const LAYER_NAME: &str = "Performance";

/// Launch flag telling the runtime the application was AOT-processed.
pub const AOT_ENABLED_ENV: &str = "BPL_SPRING_AOT_ENABLED";
/// Launch flag telling the runtime a CDS archive is available.
pub const CDS_ENABLED_ENV: &str = "BPL_JVM_CDS_ENABLED";

/// CDS archive written by the training run, relative to the application.
pub const CDS_ARCHIVE_NAME: &str = "application.jsa";

/// Staging subdirectory holding the application's original contents.
pub const APP_BACKUP_DIR: &str = "app-backup";

/// Training-run flag for AOT-processed applications.
pub const AOT_FLAG: &str = "-Dspring.aot.enabled=true";
/// Stops the application once its context has refreshed.
pub const CONTEXT_EXIT_FLAG: &str = "-Dspring.context.exit=onRefresh";

/// How a contribution ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrainingOutcome {
    /// Training was not requested; only the AOT launch flag was set.
    Skipped,
    /// The CDS archive was produced.
    Succeeded,
}

/// JVM arguments for the training run.
pub fn training_args(aot_enabled: bool, classpath: &str, start_class: &str) -> Vec<String> {
    let mut args = Vec::with_capacity(6);
    if aot_enabled {
        args.push(AOT_FLAG.to_string());
    }
    args.push(CONTEXT_EXIT_FLAG.to_string());
    args.push(format!("-XX:ArchiveClassesAtExit={CDS_ARCHIVE_NAME}"));
    args.push("-cp".to_string());
    args.push(classpath.to_string());
    args.push(start_class.to_string());
    args
}

/// Spring Boot tools-jarmode extraction of `input` into `destination`.
pub fn extract_execution(java: &str, input: &Path, destination: &Path) -> Execution {
    Execution::new(java)
        .args(["-Djarmode=tools", "-jar"])
        .arg(input.display().to_string())
        .args(["extract", "--destination"])
        .arg(destination.display().to_string())
        .current_dir(input.parent().unwrap_or_else(|| Path::new(".")))
}

/// Contributes the performance layer for one application.
pub struct SpringPerformance<E = CommandExecutor> {
    app_path: PathBuf,
    manifest: Manifest,
    config: TrainingConfig,
    executor: E,
    java: String,
    temp_root: PathBuf,
    env_lookup: Box<dyn Fn(&str) -> Option<String>>,
}

impl<E: Executor> SpringPerformance<E> {
    pub fn new(app_path: PathBuf, manifest: Manifest, config: TrainingConfig, executor: E) -> Self {
        Self {
            app_path,
            manifest,
            config,
            executor,
            java: "java".to_string(),
            temp_root: std::env::temp_dir(),
            env_lookup: Box::new(|key| std::env::var(key).ok()),
        }
    }

    /// JVM launcher used for extraction and training (default `java`).
    pub fn with_java(mut self, java: impl Into<String>) -> Self {
        self.java = java.into();
        self
    }

    /// Parent of the time-stamped staging directory used when repackaging.
    pub fn with_temp_root(mut self, temp_root: PathBuf) -> Self {
        self.temp_root = temp_root;
        self
    }

    /// Source of `CDS_TRAINING_JAVA_TOOL_OPTIONS` / `JAVA_TOOL_OPTIONS`.
    pub fn with_env_lookup<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String> + 'static,
    {
        self.env_lookup = Box::new(lookup);
        self
    }

    pub fn name(&self) -> &str {
        LAYER_NAME
    }

    pub fn layer_types() -> LayerTypes {
        LayerTypes {
            build: true,
            launch: true,
            cache: false,
        }
    }

    pub fn app_path(&self) -> &Path {
        &self.app_path
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    /// Run the orchestration inside `cache`, which decides whether the layer
    /// needs recomputing at all.
    pub fn contribute(&self, layer: Layer, cache: &dyn LayerCache) -> Result<Layer> {
        cache
            .contribute(layer, &mut |mut layer: Layer| -> Result<Layer> {
                let outcome = self.run(&mut layer)?;
                info!(layer = %layer.name, ?outcome, "performance layer contributed");
                Ok(layer)
            })
            .context("unable to contribute spring-cds layer")
    }

    /// Run every step against `layer` without consulting a cache.
    pub fn run(&self, layer: &mut Layer) -> Result<TrainingOutcome, PerformanceError> {
        layer
            .launch_env
            .set_default(AOT_ENABLED_ENV, self.config.aot_enabled);

        if !self.config.training_run {
            debug!("training run not requested");
            return Ok(TrainingOutcome::Skipped);
        }

        if self.config.rezip {
            let staged = self.repackage(layer)?;
            if let Err(err) = self.extract(&staged.jar) {
                staged.rollback(&self.app_path);
                return Err(err);
            }
            staged.finish();
        } else {
            self.extract(&self.app_path)?;
        }

        self.normalize_timestamps()?;
        self.train()?;

        layer.launch_env.set_default(CDS_ENABLED_ENV, true);
        info!(
            archive = %self.app_path.join(CDS_ARCHIVE_NAME).display(),
            "CDS archive created"
        );
        Ok(TrainingOutcome::Succeeded)
    }

    fn repackage(&self, layer: &Layer) -> Result<Repackaged, PerformanceError> {
        info!(app = %self.app_path.display(), "Recreating application jar");

        let temp_dir = self.temp_root.join(tmp_name("spring-cds"));
        let jar_dir = temp_dir.join("jar-dest");
        fs::create_dir_all(&jar_dir).map_err(|source| PerformanceError::CreateDir {
            path: jar_dir.clone(),
            source,
        })?;
        let jar = jar_dir.join(RUNNER_JAR);
        let backup = temp_dir.join(APP_BACKUP_DIR);
        let staged = Repackaged {
            temp_dir,
            jar,
            backup,
        };

        if let Err(err) = self.build_and_preserve(layer, &staged.jar) {
            remove_best_effort(&staged.temp_dir);
            return Err(err);
        }

        if let Err(source) = move_contents(&self.app_path, &staged.backup) {
            staged.rollback(&self.app_path);
            return Err(PerformanceError::Backup {
                path: self.app_path.clone(),
                source: source.into(),
            });
        }

        Ok(staged)
    }

    fn build_and_preserve(&self, layer: &Layer, jar: &Path) -> Result<(), PerformanceError> {
        build_jar(&self.app_path, jar).map_err(|source| PerformanceError::Repackage {
            path: self.app_path.clone(),
            source: source.into(),
        })?;

        let preserved = layer.path.join(RUNNER_JAR);
        copy_file_atomic(jar, &preserved).map_err(|source| PerformanceError::CopyArchive {
            from: jar.to_path_buf(),
            to: preserved.clone(),
            source: source.into(),
        })?;
        Ok(())
    }

    fn extract(&self, input: &Path) -> Result<(), PerformanceError> {
        info!(input = %input.display(), "Extracting Jar");
        let execution = extract_execution(&self.java, input, &self.app_path);
        self.executor
            .execute(&execution)
            .map_err(|source| PerformanceError::Extract {
                path: input.to_path_buf(),
                source,
            })
    }

    fn normalize_timestamps(&self) -> Result<(), PerformanceError> {
        let timestamp =
            parse_timestamp(FIXED_TIMESTAMP).map_err(|source| PerformanceError::ParseTimestamp {
                value: FIXED_TIMESTAMP.to_string(),
                source,
            })?;
        let touched = normalize_tree(&self.app_path, timestamp)?;
        debug!(paths = touched, "reset file times");
        Ok(())
    }

    fn train(&self) -> Result<(), PerformanceError> {
        let args = training_args(
            self.config.aot_enabled,
            &self.config.classpath,
            self.manifest.start_class(),
        );
        let mut execution = Execution::new(&self.java)
            .args(args)
            .current_dir(&self.app_path);

        if let Some(opts) = resolve_tool_options(&*self.env_lookup) {
            info!("Training run will use this value as JAVA_TOOL_OPTIONS: {opts}");
            execution = execution.env(JAVA_TOOL_OPTIONS, opts);
        }

        info!(command = %execution, "Starting training run");
        self.executor
            .execute(&execution)
            .map_err(|source| PerformanceError::TrainingRun {
                command: execution.to_string(),
                source,
            })
    }
}

/// Staging state between repackaging and a finished extraction.
struct Repackaged {
    temp_dir: PathBuf,
    jar: PathBuf,
    backup: PathBuf,
}

impl Repackaged {
    /// Extraction succeeded: drop the backup along with the staging directory.
    fn finish(self) {
        remove_best_effort(&self.temp_dir);
    }

    /// Put the original application contents back. The staging directory is
    /// kept when that fails, since it still holds the only copy.
    fn rollback(self, app_path: &Path) {
        match restore_contents(&self.backup, app_path) {
            Ok(()) => {
                warn!(app = %app_path.display(), "restored application contents");
                remove_best_effort(&self.temp_dir);
            }
            Err(err) => warn!(
                app = %app_path.display(),
                backup = %self.backup.display(),
                error = %format!("{err:#}"),
                "could not restore application; original content left at backup"
            ),
        }
    }
}

fn remove_best_effort(path: &Path) {
    if let Err(err) = fs::remove_dir_all(path) {
        if err.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %err, "failed to remove directory");
        }
    }
}
