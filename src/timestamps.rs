//! Fixed-timestamp normalization for extracted application trees.
//!
//! The layer is content-addressed downstream, so every path under the
//! application directory gets the same access and modification time after
//! extraction.

use std::io;
use std::path::Path;
use std::time::SystemTime;

use filetime::FileTime;
use time::macros::format_description;
use time::PrimitiveDateTime;

use crate::walk::{walk_and_apply, WalkError};

/// Timestamp applied to every extracted path, interpreted as UTC.
pub const FIXED_TIMESTAMP: &str = "1980-01-01 00:00:01";

/// Parse a `YYYY-MM-DD hh:mm:ss` UTC timestamp.
pub fn parse_timestamp(value: &str) -> Result<SystemTime, time::error::Parse> {
    let parsed = PrimitiveDateTime::parse(
        value,
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    )?;
    Ok(parsed.assume_utc().into())
}

/// Set both access and modification time of `path`, following symlinks.
///
/// Works by path, so the file is never opened: unreadable files and FIFOs
/// are handled like any other entry.
pub fn set_times(path: &Path, timestamp: SystemTime) -> io::Result<()> {
    let ft = FileTime::from_system_time(timestamp);
    filetime::set_file_times(path, ft, ft)
}

/// Reset the times of `root` and every path beneath it to `timestamp`.
///
/// Returns the number of paths touched.
pub fn normalize_tree(root: &Path, timestamp: SystemTime) -> Result<usize, WalkError<io::Error>> {
    walk_and_apply(root, |path| set_times(path, timestamp))
}
