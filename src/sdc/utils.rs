//! Utility functions for SDC entries

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use filetime::FileTime;

use super::types::{Entry, EntryInfo, EntrySpan};
use crate::error::{SdcError, SdcResult};

/// Seconds between 1601-01-01 (FILETIME epoch) and 1970-01-01
const FILETIME_UNIX_OFFSET_SECS: i64 = 11_644_473_600;
const FILETIME_TICKS_PER_SEC: u64 = 10_000_000;

/// Convert Windows FILETIME ticks to Unix seconds and nanoseconds.
/// Zero means "not recorded".
pub fn filetime_to_unix(ticks: u64) -> Option<(i64, u32)> {
    if ticks == 0 {
        return None;
    }
    let secs = (ticks / FILETIME_TICKS_PER_SEC) as i64 - FILETIME_UNIX_OFFSET_SECS;
    let nanos = ((ticks % FILETIME_TICKS_PER_SEC) * 100) as u32;
    Some((secs, nanos))
}

/// FILETIME ticks as an RFC 3339 UTC string
pub fn format_filetime(ticks: u64) -> Option<String> {
    let (secs, nanos) = filetime_to_unix(ticks)?;
    DateTime::<Utc>::from_timestamp(secs, nanos).map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
}

/// Apply an entry's access and modification times to an extracted file
pub fn apply_entry_times(path: &Path, entry: &Entry) -> SdcResult<()> {
    let access = filetime_to_unix(entry.access_time);
    let modified = filetime_to_unix(entry.modification_time);
    if access.is_none() && modified.is_none() {
        return Ok(());
    }

    let to_filetime = |(secs, nanos): (i64, u32)| FileTime::from_unix_time(secs, nanos);
    let mtime = modified.or(access).map(to_filetime);
    let atime = access.map(to_filetime).or(mtime);
    if let (Some(atime), Some(mtime)) = (atime, mtime) {
        filetime::set_file_times(path, atime, mtime)
            .map_err(|e| SdcError::io(format!("setting file times on '{}'", path.display()), e))?;
    }
    Ok(())
}

/// Default key file location: `<container>.key`
pub fn default_key_path(container: &Path) -> PathBuf {
    let mut name = container.as_os_str().to_owned();
    name.push(".key");
    PathBuf::from(name)
}

/// Directory the container lives in (output root by default)
pub fn container_dir(container: &Path) -> PathBuf {
    match container.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Public listing view of an entry
pub fn entry_info(entry: &Entry, span: &EntrySpan, name: String) -> EntryInfo {
    EntryInfo {
        index: span.index,
        name,
        offset: span.start,
        compressed_span: span.length,
        read_chunk_len: span.read_chunk_len,
        uncompressed_size: entry.uncompressed_size,
        created: format_filetime(entry.creation_time),
        accessed: format_filetime(entry.access_time),
        modified: format_filetime(entry.modification_time),
    }
}
