//! Preflight checks for a contribution.
//!
//! Validates that the host has the JVM launcher before a training run is
//! attempted, so a missing JDK is reported up front instead of as a spawn
//! failure halfway through extraction.
//!
//! # Example
//!
//! ```rust,ignore
//! use spring_cds::preflight::{command_exists, check_required_tools};
//!
//! if !command_exists("java") {
//!     println!("no JVM on PATH");
//! }
//!
//! check_required_tools(&[("java", "a JDK 21+ distribution")])?;
//! ```

use anyhow::{bail, Result};

/// Check if a command can be located, either as a path or on `PATH`.
pub fn command_exists(cmd: &str) -> bool {
    which::which(cmd).is_ok()
}

/// Tools a training run needs.
///
/// Each tuple is (command_name, where_to_get_it).
pub const REQUIRED_TOOLS: &[(&str, &str)] = &[("java", "a JDK 21+ distribution")];

/// Check that specific tools are available.
///
/// Returns an error listing every missing tool.
pub fn check_required_tools(tools: &[(&str, &str)]) -> Result<()> {
    let missing: Vec<_> = tools
        .iter()
        .filter(|(tool, _)| !command_exists(tool))
        .collect();

    if !missing.is_empty() {
        let msg = missing
            .iter()
            .map(|(t, p)| format!("  {} (install: {})", t, p))
            .collect::<Vec<_>>()
            .join("\n");
        bail!("Missing required host tools:\n{}", msg);
    }

    Ok(())
}

/// Check the JVM launcher that will run extraction and training.
///
/// `java` may be a bare command name or a path to a launcher.
pub fn check_java(java: &str) -> Result<()> {
    check_required_tools(&[(java, REQUIRED_TOOLS[0].1)])
}
