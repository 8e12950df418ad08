//! Application artifact handling for the performance layer.
//!
//! - [`jar`] - Deterministic, uncompressed jar creation from an exploded
//!   application directory
//! - [`filesystem`] - Staging directories, layer copies and the
//!   move-aside/restore pair used while an application is re-extracted

pub mod filesystem;
pub mod jar;
