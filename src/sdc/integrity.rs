//! Data region checksum
//!
//! The key file carries the CRC32 of every byte after the header. The
//! region is streamed through a small fixed buffer; the container is never
//! held in memory.

use std::io::{Read, Seek, SeekFrom};

use crc32fast::Hasher as Crc32Hasher;
use tracing::{debug, instrument};

use super::types::{ChecksumReport, CRC_BUFFER_SIZE};
use crate::error::{SdcError, SdcResult};

/// CRC32 of everything from `data_offset` to end of stream
pub fn data_region_crc<R: Read + Seek>(reader: &mut R, data_offset: u64) -> SdcResult<u32> {
    reader
        .seek(SeekFrom::Start(data_offset))
        .map_err(|e| SdcError::io(format!("seeking to data region at {data_offset}"), e))?;

    let mut hasher = Crc32Hasher::new();
    let mut buffer = [0u8; CRC_BUFFER_SIZE];
    let mut total: u64 = 0;
    loop {
        let bytes_read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(SdcError::io("reading data region for CRC32", e)),
        };
        hasher.update(&buffer[..bytes_read]);
        total += bytes_read as u64;
    }

    let crc = hasher.finalize();
    debug!(bytes = total, crc = format!("0x{crc:08X}"), "Data region CRC32 computed");
    Ok(crc)
}

/// Compute the data region CRC32 and compare it with the key file's value
#[instrument(skip(reader))]
pub fn verify_checksum<R: Read + Seek>(
    reader: &mut R,
    data_offset: u64,
    expected: u32,
) -> SdcResult<ChecksumReport> {
    let computed = data_region_crc(reader, data_offset)?;
    Ok(ChecksumReport {
        expected,
        computed,
        matches: computed == expected,
    })
}
