//! Foreign path reconstruction
//!
//! Entry names use backslash separators and Windows code page bytes. They
//! are translated to host paths component by component, so a hostile name
//! can never leave the output root. Component bytes are carried over as is
//! on unix and decoded as Windows-1252 elsewhere; either way two distinct
//! names never collapse into one host path.

use std::borrow::Cow;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};

use encoding_rs::WINDOWS_1252;
use tracing::{trace, warn};

use crate::common::path_security::{contains_traversal_pattern, is_safe_component, is_safe_path};
use crate::error::{SdcError, SdcResult};

/// Leaf used when nothing usable is left of an entry name
pub const FALLBACK_LEAF: &str = "unnamed";

/// A foreign path split into host directory and leaf name
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatedPath {
    /// Relative directory, empty when the entry sits at the root
    pub dir: PathBuf,
    pub leaf: OsString,
}

impl TranslatedPath {
    /// Path relative to the output root
    pub fn relative(&self) -> PathBuf {
        self.dir.join(&self.leaf)
    }
}

/// Readable form of foreign name bytes: UTF-8 when valid, otherwise
/// Windows-1252 (which maps every byte)
pub fn decode_foreign(bytes: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(bytes) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => WINDOWS_1252.decode_without_bom_handling(bytes).0,
    }
}

#[cfg(unix)]
fn host_component(component: &[u8]) -> OsString {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;
    OsStr::from_bytes(component).to_os_string()
}

#[cfg(not(unix))]
fn host_component(component: &[u8]) -> OsString {
    let (text, _) = WINDOWS_1252.decode_without_bom_handling(component);
    OsString::from(text.into_owned())
}

/// Translate a foreign relative path. Never fails.
pub fn translate(foreign: &[u8]) -> TranslatedPath {
    if contains_traversal_pattern(&decode_foreign(foreign)) {
        warn!(
            name = %decode_foreign(foreign),
            "Entry name tries to leave the output directory, sanitizing"
        );
    }

    let mut components: Vec<OsString> = foreign
        .split(|&b| b == b'\\' || b == b'/')
        .filter(|component| is_safe_component(&decode_foreign(component)))
        .map(host_component)
        .collect();

    let leaf = components.pop().unwrap_or_else(|| OsString::from(FALLBACK_LEAF));
    let dir: PathBuf = components.iter().collect();
    TranslatedPath { dir, leaf }
}

/// Create the entry's directory under `root` and return its output path.
///
/// Existing directories are fine, so unpacking twice into the same place
/// works.
pub fn reconstruct(root: &Path, foreign: &[u8]) -> SdcResult<PathBuf> {
    let translated = translate(foreign);
    debug_assert!(is_safe_path(&translated.relative()));
    let dir = if translated.dir.as_os_str().is_empty() {
        root.to_path_buf()
    } else {
        root.join(&translated.dir)
    };

    trace!(dir = %dir.display(), "Creating directory structure");
    fs::create_dir_all(&dir).map_err(|source| SdcError::CreateDir {
        path: dir.clone(),
        source,
    })?;

    Ok(dir.join(translated.leaf))
}
