//! Type definitions for the SDC container format

use std::fmt;

use serde::Serialize;

use super::paths::decode_foreign;

// =============================================================================
// Key Material
// =============================================================================

/// Secrets from the companion `.key` file
#[derive(Clone, PartialEq, Eq)]
pub struct KeyMaterial {
    /// CRC32 of everything after the header
    pub expected_checksum: u32,
    /// Key for the header and file name layers
    pub file_name_key: [u8; FILE_NAME_KEY_LEN],
    /// Content layer mask; only the low byte is used
    pub content_xor_mask: u32,
}

impl KeyMaterial {
    /// The byte every decompressed content byte is XORed with
    pub fn content_xor_byte(&self) -> u8 {
        (self.content_xor_mask % 0x100) as u8
    }
}

// Never print the key itself
impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("expected_checksum", &format_args!("0x{:08X}", self.expected_checksum))
            .field("file_name_key", &"<redacted>")
            .field("content_xor_mask", &self.content_xor_mask)
            .finish()
    }
}

// =============================================================================
// Header
// =============================================================================

/// Header layout variant, selects the width of size-bearing entry fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Signature {
    /// 32-bit sizes, raw deflate payloads
    Standard,
    /// 64-bit sizes ("4GB" variant), zlib-wrapped payloads
    Large,
}

impl Signature {
    /// Anything that is not the large signature is read as standard
    pub fn from_raw(raw: u32) -> Self {
        if raw == SIG_LARGE {
            Signature::Large
        } else {
            Signature::Standard
        }
    }

    /// Size of one entry record in the decoded header
    pub fn entry_len(&self) -> usize {
        match self {
            Signature::Standard => STANDARD_ENTRY_LEN,
            Signature::Large => LARGE_ENTRY_LEN,
        }
    }

    /// Whether entry payloads carry a zlib wrapper (otherwise raw deflate)
    pub fn zlib_wrapped(&self) -> bool {
        matches!(self, Signature::Large)
    }
}

/// One archived file's metadata record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name_offset: u32,
    /// Stored compressed size field, see [`Entry::read_chunk_len`] and
    /// [`Entry::compressed_span`]
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    /// Windows FILETIME ticks (100ns since 1601-01-01)
    pub creation_time: u64,
    pub access_time: u64,
    pub modification_time: u64,
}

impl Entry {
    /// Per-read input chunk length used while streaming this entry.
    ///
    /// Low 14 bits of the stored field. A zero value would never make
    /// progress, so it is read as the full 14-bit span.
    pub fn read_chunk_len(&self) -> usize {
        match (self.compressed_size & CHUNK_LEN_MASK) as usize {
            0 => CHUNK_LEN_MASK as usize + 1,
            len => len,
        }
    }

    /// Bytes this entry occupies in the data region (cursor advance)
    pub fn compressed_span(&self) -> u64 {
        self.compressed_size
    }
}

/// Entry path exactly as stored in the name table: foreign separators,
/// code page bytes, no terminator. Never decoded lossily.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryName(Vec<u8>);

impl EntryName {
    /// Take the bytes up to the first NUL
    pub fn from_table(bytes: &[u8]) -> Self {
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Self(bytes[..end].to_vec())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for EntryName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&decode_foreign(&self.0))
    }
}

/// Where an entry's payload lives in the container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EntrySpan {
    pub index: usize,
    /// Absolute offset of the first compressed byte
    pub start: u64,
    /// Full compressed span, the distance to the next entry
    pub length: u64,
    pub read_chunk_len: usize,
    pub uncompressed_size: u64,
}

// =============================================================================
// Public Views (serializable)
// =============================================================================

/// Entry as listed by `inspect` and reported by `unpack`
#[derive(Debug, Clone, Serialize)]
pub struct EntryInfo {
    pub index: usize,
    pub name: String,
    pub offset: u64,
    pub compressed_span: u64,
    pub read_chunk_len: usize,
    pub uncompressed_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accessed: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
}

/// Result of the CRC32 check over the data region
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChecksumReport {
    pub expected: u32,
    pub computed: u32,
    pub matches: bool,
}

/// Result of the entry-table-fits-in-header check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StructureReport {
    pub required: u64,
    pub available: u64,
    pub fits: bool,
}

/// Container information without extraction
#[derive(Debug, Clone, Serialize)]
pub struct ContainerInfo {
    pub path: String,
    pub header_size: u32,
    pub raw_signature: u32,
    pub signature: Signature,
    pub entry_count: u32,
    pub data_offset: u64,
    pub structure: StructureReport,
    pub checksum: ChecksumReport,
    pub entries: Vec<EntryInfo>,
}

/// What happened to one entry during unpacking
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntryStatus {
    Extracted { bytes: u64 },
    Skipped { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct EntryReport {
    pub index: usize,
    pub name: String,
    pub path: String,
    #[serde(flatten)]
    pub status: EntryStatus,
}

/// Structured result of an unpack run
#[derive(Debug, Clone, Serialize)]
pub struct UnpackReport {
    pub container: String,
    pub output_root: String,
    pub header_size: u32,
    pub signature: Signature,
    pub structure: StructureReport,
    pub checksum: ChecksumReport,
    pub entries: Vec<EntryReport>,
}

impl UnpackReport {
    pub fn extracted_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.status, EntryStatus::Extracted { .. }))
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.entries.len() - self.extracted_count()
    }
}

/// Advisory per-entry progress, `step` runs from 0 to [`PROGRESS_STEPS`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub entry_index: usize,
    pub entry_count: usize,
    pub step: u8,
}

// =============================================================================
// Constants
// =============================================================================

/// Length prefixes below this are really a foreign signature
pub const MIN_HEADER_SIZE: u32 = 0xFF;
/// Bytes before the header body
pub const LENGTH_PREFIX_LEN: u64 = 4;

pub const SIG_STANDARD: u32 = 0x0000_0002;
pub const SIG_LARGE: u32 = 0x0000_0004;

/// Signature (u32) + entry count (u32)
pub const FIXED_HEADER_LEN: usize = 8;
/// name_offset u32, sizes 2x u32, times 3x u64
pub const STANDARD_ENTRY_LEN: usize = 36;
/// name_offset u32, sizes 2x u64, times 3x u64
pub const LARGE_ENTRY_LEN: usize = 44;

pub const FILE_NAME_KEY_LEN: usize = 32;
pub const CHUNK_LEN_MASK: u64 = 0x3FFF;
pub const OUTPUT_BUFFER_SIZE: usize = 0x4000;
pub const CRC_BUFFER_SIZE: usize = 8 * 1024;
pub const PROGRESS_STEPS: u8 = 6;
