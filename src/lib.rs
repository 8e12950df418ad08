//! Class-data-sharing training layer for Spring Boot application images.
//!
//! Given an exploded Spring Boot application, this crate produces a JVM CDS
//! archive by running the application once in a training mode that exits
//! right after the context refresh. It is split into:
//!
//! - **Archive builder** - Deterministic, uncompressed jar from a directory
//! - **Training orchestration** - Extraction, timestamp normalization, training run
//! - **Layer model** - Launch environment defaults and a metadata-keyed cache
//! - **Preflight checks** - Host JVM validation before a contribution
//!
//! # Architecture
//!
//! ```text
//! spring-cds contribute
//!     │
//!     ├── config     TrainingConfig from BP_* variables and CLI flags
//!     ├── layer      LayerContributor (fs2 lock, sha256 cache key)
//!     │     │
//!     │     └── performance::SpringPerformance
//!     │           ├── artifact::jar      runner.jar (rezip only)
//!     │           ├── process            java -Djarmode=tools ... extract
//!     │           ├── timestamps + walk  1980-01-01 00:00:01 on every path
//!     │           └── process            java ... -XX:ArchiveClassesAtExit=application.jsa
//!     │
//!     └── Layer::write   env.launch/*.default + <name>.toml
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use spring_cds::{CommandExecutor, Layer, LayerContributor, Manifest, SpringPerformance, TrainingConfig};
//!
//! let config = TrainingConfig::from_env(|k| std::env::var(k).ok())?;
//! let manifest = Manifest::read(&app)?;
//! let perf = SpringPerformance::new(app, manifest, config.clone(), CommandExecutor);
//! let cache = LayerContributor::new("Performance", config.metadata(), SpringPerformance::<CommandExecutor>::layer_types());
//! let layer = perf.contribute(Layer::load(&layers, "Performance")?, &cache)?;
//! ```

pub mod artifact;
pub mod classpath;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod layer;
pub mod manifest;
pub mod performance;
pub mod preflight;
pub mod process;
pub mod timestamps;
pub mod walk;

pub use config::TrainingConfig;
pub use error::{PerformanceError, Step};
pub use layer::{Layer, LayerCache, LayerContributor, LayerTypes};
pub use manifest::Manifest;
pub use performance::{SpringPerformance, TrainingOutcome};
pub use process::{CommandExecutor, ExecError, Execution, Executor};
