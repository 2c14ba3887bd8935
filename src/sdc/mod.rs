//! SDC (encrypted download container) unpacker
//!
//! An SDC file carries a set of compressed files behind two keyed layers,
//! with its secrets in a companion `.key` file.
//!
//! ## SDC Format Structure
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Header Size (u32 LE)                                         │
//! │  - values below 0xFF are an older, unsupported signature     │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Header Body (header_size bytes, header layer encrypted)      │
//! │  - Signature (u32): 4 = large, anything else = standard      │
//! │  - Entry Count (u32)                                         │
//! │  - Entries (36 bytes standard, 44 bytes large)               │
//! │  - Name Table Length (u32)                                   │
//! │  - Name Table (name layer encrypted, NUL-terminated names)   │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Data Region                                                  │
//! │  - entry payloads back to back (raw deflate / zlib)          │
//! │  - decompressed bytes XORed with the key file's mask         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The key file holds the data region's CRC32, the 32-byte name key and
//! the content mask.
//!
//! ## Usage
//!
//! ```rust,ignore
//! // List entries without writing anything
//! let info = sdc::inspect(Path::new("/dl/office.sdc"), None)?;
//!
//! // Unpack next to the container, keys from /dl/office.sdc.key
//! let report = sdc::unpack(Path::new("/dl/office.sdc"), &UnpackOptions::default())?;
//! ```

pub mod cipher;
pub mod engine;
pub mod header;
pub mod integrity;
mod keyfile;
mod operations;
pub mod paths;
mod policy;
mod types;
mod utils;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export public types
pub use policy::{Policy, Severity};
pub use types::{
    ChecksumReport, ContainerInfo, Entry, EntryInfo, EntryName, EntryReport, EntrySpan, EntryStatus,
    KeyMaterial, Progress, Signature, StructureReport, UnpackReport, PROGRESS_STEPS,
};

// Re-export public functions
pub use operations::{inspect, load_key, unpack, unpack_with_progress, UnpackOptions};
pub use utils::{default_key_path, filetime_to_unix, format_filetime};
