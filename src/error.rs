//! Error types for SDC unpacking
//!
//! Every fallible operation in the crate returns [`SdcError`]. Callers that
//! need to branch on the broad class of failure (the CLI maps these to exit
//! codes) use [`SdcError::kind`].

use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

/// Result type alias for SDC operations
pub type SdcResult<T> = Result<T, SdcError>;

/// Broad failure classes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Format,
    Decrypt,
    Integrity,
    Io,
    TruncatedStream,
}

/// Which keyed layer failed to decode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecryptStage {
    Header,
    NameTable,
}

impl fmt::Display for DecryptStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecryptStage::Header => write!(f, "SDC header"),
            DecryptStage::NameTable => write!(f, "file name table"),
        }
    }
}

/// Soft integrity failures, fatal unless the policy marks the check advisory
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "check", rename_all = "snake_case")]
pub enum IntegrityMismatch {
    /// Entry table does not fit in the declared header size
    Structure { required: u64, available: u64 },
    /// CRC32 of the data region differs from the key file
    Checksum { expected: u32, computed: u32 },
}

impl fmt::Display for IntegrityMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntegrityMismatch::Structure { required, available } => write!(
                f,
                "file given is not a valid SDC file or the decryption key is wrong \
                 (entry table needs {required} bytes, header holds {available})"
            ),
            IntegrityMismatch::Checksum { expected, computed } => write!(
                f,
                "CRC32 of the SDC file did not match the one supplied in the key file \
                 (0x{expected:08X} expected while have 0x{computed:08X})"
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum SdcError {
    #[error("Wrong format of a key file: {0}")]
    KeyFormat(String),

    /// The length prefix is below 0xFF, so it is really a signature byte
    #[error("Encountered unsupported format! Signature is probably 0x{0:02x}")]
    ForeignSignature(u32),

    #[error("Malformed SDC header: {0}")]
    HeaderFormat(String),

    #[error("Error when decrypting {stage} (errorcode: {code})")]
    Decrypt { stage: DecryptStage, code: i32 },

    #[error("Integrity check failed: {0}")]
    Integrity(IntegrityMismatch),

    #[error("I/O error while {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("Directory '{}' creation failed: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to open output file '{}': {source}", path.display())]
    CreateFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Unexpected end of file in entry {index} ('{name}'): {remaining} bytes still expected")]
    TruncatedStream {
        index: usize,
        name: String,
        remaining: u64,
    },

    #[error("Inflate failed for entry {index} ('{name}'): {message}")]
    Inflate {
        index: usize,
        name: String,
        message: String,
    },
}

impl SdcError {
    /// Wrap an I/O error with a short description of what was being done
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        SdcError::Io {
            context: context.into(),
            source,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SdcError::KeyFormat(_) | SdcError::ForeignSignature(_) | SdcError::HeaderFormat(_) => {
                ErrorKind::Format
            }
            SdcError::Decrypt { .. } => ErrorKind::Decrypt,
            SdcError::Integrity(_) => ErrorKind::Integrity,
            SdcError::Io { .. } | SdcError::CreateDir { .. } | SdcError::CreateFile { .. } => {
                ErrorKind::Io
            }
            SdcError::TruncatedStream { .. } | SdcError::Inflate { .. } => {
                ErrorKind::TruncatedStream
            }
        }
    }

    /// Underlying OS error code, if this failure came from the OS
    pub fn os_error(&self) -> Option<i32> {
        match self {
            SdcError::Io { source, .. }
            | SdcError::CreateDir { source, .. }
            | SdcError::CreateFile { source, .. } => source.raw_os_error(),
            _ => None,
        }
    }

    /// True for failures scoped to a single entry (may be skipped by policy)
    pub fn is_entry_scoped(&self) -> bool {
        matches!(
            self,
            SdcError::CreateDir { .. }
                | SdcError::CreateFile { .. }
                | SdcError::TruncatedStream { .. }
                | SdcError::Inflate { .. }
        )
    }
}

impl From<IntegrityMismatch> for SdcError {
    fn from(mismatch: IntegrityMismatch) -> Self {
        SdcError::Integrity(mismatch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds() {
        assert_eq!(SdcError::ForeignSignature(0x0a).kind(), ErrorKind::Format);
        assert_eq!(
            SdcError::Decrypt { stage: DecryptStage::Header, code: -2 }.kind(),
            ErrorKind::Decrypt
        );
        assert_eq!(
            SdcError::from(IntegrityMismatch::Checksum { expected: 1, computed: 2 }).kind(),
            ErrorKind::Integrity
        );
        let truncated = SdcError::TruncatedStream { index: 1, name: "a".into(), remaining: 3 };
        assert_eq!(truncated.kind(), ErrorKind::TruncatedStream);
        assert!(truncated.is_entry_scoped());
    }

    #[test]
    fn test_messages() {
        let err = SdcError::ForeignSignature(0x1f);
        assert_eq!(err.to_string(), "Encountered unsupported format! Signature is probably 0x1f");

        let err = SdcError::from(IntegrityMismatch::Checksum { expected: 0xAB, computed: 0xCD });
        assert!(err.to_string().contains("0x000000AB expected while have 0x000000CD"));
    }

    #[test]
    fn test_os_error() {
        let err = SdcError::io("reading", io::Error::from_raw_os_error(2));
        assert_eq!(err.os_error(), Some(2));
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(!err.is_entry_scoped());
    }
}
