use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use spring_cds::artifact::jar::build_jar;
use spring_cds::performance::{CDS_ARCHIVE_NAME, CDS_ENABLED_ENV, LAYER_NAME};
use spring_cds::{
    classpath, fingerprint, preflight, CommandExecutor, Layer, LayerContributor, Manifest,
    SpringPerformance, TrainingConfig,
};

/// Metadata field holding the application content hash.
///
/// Taken before the contribution rewrites `--app`. A rezip run replaces the
/// exploded layout with the extracted one, so cache hits need a fresh
/// application tree per build, as a build workspace provides.
const APPLICATION_SHA256: &str = "application-sha256";

#[derive(Parser)]
#[command(name = "spring-cds", version, about = "Spring Boot CDS training layer")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the training workflow and contribute the performance layer.
    Contribute(ContributeArgs),
    /// Build a deterministic, uncompressed jar from a directory.
    Archive {
        source_dir: PathBuf,
        output: PathBuf,
    },
}

#[derive(Args)]
struct ContributeArgs {
    /// Exploded application directory.
    #[arg(long)]
    app: PathBuf,
    /// Directory holding the build layers.
    #[arg(long)]
    layers: PathBuf,
    #[arg(long, default_value = LAYER_NAME)]
    layer_name: String,
    /// Perform the training run (overrides BP_JVM_CDS_ENABLED).
    #[arg(long)]
    training: bool,
    /// Application was AOT-processed (overrides BP_SPRING_AOT_ENABLED).
    #[arg(long)]
    aot: bool,
    /// Rebuild the application into a jar before extraction (overrides BP_JVM_CDS_REZIP).
    #[arg(long)]
    rezip: bool,
    /// Training classpath (overrides BP_JVM_CDS_CLASSPATH).
    #[arg(long)]
    classpath: Option<String>,
    #[arg(long, default_value = "java")]
    java: String,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match Cli::parse().command {
        Command::Contribute(args) => contribute(args),
        Command::Archive { source_dir, output } => archive(&source_dir, &output),
    }
}

fn archive(source_dir: &Path, output: &Path) -> Result<()> {
    build_jar(source_dir, output).with_context(|| {
        format!(
            "building jar from '{}' to '{}'",
            source_dir.display(),
            output.display()
        )
    })?;
    println!("[archive] wrote {}", output.display());
    Ok(())
}

fn contribute(args: ContributeArgs) -> Result<()> {
    let config = training_config(&args)?;

    if config.training_run {
        preflight::check_java(&args.java)?;
    }

    let manifest = Manifest::read(&args.app)?;
    let config = if config.classpath.is_empty() {
        TrainingConfig {
            classpath: classpath::resolve(&args.app, &manifest, config.rezip)?,
            ..config
        }
    } else {
        config
    };

    let mut expected = config.metadata();
    expected.insert(
        APPLICATION_SHA256.to_string(),
        fingerprint::tree_sha256(&args.app, &[CDS_ARCHIVE_NAME])
            .with_context(|| format!("fingerprinting '{}'", args.app.display()))?,
    );
    let cache = LayerContributor::new(
        args.layer_name.clone(),
        expected,
        SpringPerformance::<CommandExecutor>::layer_types(),
    );

    let performance = SpringPerformance::new(args.app.clone(), manifest, config, CommandExecutor)
        .with_java(args.java.clone());

    let layer = Layer::load(&args.layers, &args.layer_name)?;
    let layer = performance.contribute(layer, &cache)?;

    let cds = layer.launch_env.get(CDS_ENABLED_ENV) == Some("true");
    println!(
        "[contribute] layer '{}' at {} (cds: {})",
        layer.name,
        layer.path.display(),
        if cds { "enabled" } else { "skipped" }
    );
    Ok(())
}

fn training_config(args: &ContributeArgs) -> Result<TrainingConfig> {
    let mut config = TrainingConfig::from_env(|key| std::env::var(key).ok())?;
    config.training_run |= args.training;
    config.aot_enabled |= args.aot;
    config.rezip |= args.rezip;
    if let Some(cp) = &args.classpath {
        config.classpath = cp.clone();
    }
    Ok(config)
}
