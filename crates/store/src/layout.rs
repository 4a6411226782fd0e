//! On-disk naming: partitions, record ids, staging paths.
//!
//! `<root>/<YYYY-MM-DD>/<HHMMSSffffff>[-NNN].{png,json}`. Staged files are
//! hidden (`.<name>.tmp`) and never picked up by listing.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate};

/// `chrono` format of a partition directory name.
pub const PARTITION_FORMAT: &str = "%Y-%m-%d";

/// `chrono` format of the timestamp part of a record id.
pub const ID_FORMAT: &str = "%H%M%S%6f";

pub const IMAGE_EXTENSION: &str = "png";
pub const SIDECAR_EXTENSION: &str = "json";

const STAGING_SUFFIX: &str = ".tmp";

/// Partition directory name for a local instant.
pub fn partition_name(now: &DateTime<Local>) -> String {
    now.format(PARTITION_FORMAT).to_string()
}

/// Timestamp part of a record id for a local instant.
pub fn base_id(now: &DateTime<Local>) -> String {
    now.format(ID_FORMAT).to_string()
}

/// Record id for `base` with collision sequence `seq` (0 = no suffix).
///
/// Suffixed ids sort after their base, keeping lexicographic order
/// chronological.
pub fn record_id(base: &str, seq: u32) -> String {
    if seq == 0 {
        base.to_string()
    } else {
        format!("{base}-{seq:03}")
    }
}

/// Whether `name` is a well-formed partition (`YYYY-MM-DD`).
pub fn is_partition_name(name: &str) -> bool {
    name.len() == 10 && NaiveDate::parse_from_str(name, PARTITION_FORMAT).is_ok()
}

pub fn image_file_name(id: &str) -> String {
    format!("{id}.{IMAGE_EXTENSION}")
}

pub fn sidecar_file_name(id: &str) -> String {
    format!("{id}.{SIDECAR_EXTENSION}")
}

/// Hidden staging path next to `target`.
pub fn staging_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}{STAGING_SUFFIX}"))
}

/// Whether `path` is a published sidecar (not hidden, `.json`).
pub fn is_sidecar(path: &Path) -> bool {
    let hidden = path
        .file_name()
        .map(|n| n.to_string_lossy().starts_with('.'))
        .unwrap_or(true);
    !hidden && path.extension().is_some_and(|ext| ext == SIDECAR_EXTENSION)
}
