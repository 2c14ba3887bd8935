//! Per-entry streaming extraction
//!
//! Each entry's payload is inflated in fixed-size reads. Deflate block
//! boundaries almost never line up with those reads, so whatever the
//! decompressor did not consume is moved to the front of the input buffer
//! and the next read appends after it:
//!
//! ```text
//!  input buffer (read_chunk_len bytes)
//!  ┌───────────────┬──────────────────────────┐
//!  │ carried bytes │ fresh bytes from reader  │
//!  └───────────────┴──────────────────────────┘
//!        │ inflate step
//!        ▼
//!  ┌──────────┬────────────────┐
//!  │ consumed │ not consumed   │ ──► copied to front, becomes "carried"
//!  └──────────┴────────────────┘
//! ```
//!
//! Decompressed bytes are XORed with the content mask and appended to the
//! output until the entry's uncompressed size has been produced.

use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use flate2::{Decompress, FlushDecompress, Status};
use tracing::{debug, trace};

use super::cipher::xor_content;
use super::paths;
use super::types::{EntryName, EntrySpan, Signature, OUTPUT_BUFFER_SIZE, PROGRESS_STEPS};
use crate::common::binary::read_fill;
use crate::error::{SdcError, SdcResult};

/// Why streaming an entry stopped early
#[derive(Debug)]
pub enum StreamFault {
    /// Container ran out (or the deflate stream ended) with output still owed
    Truncated { remaining: u64 },
    /// The deflate stream is corrupt
    Inflate(String),
    Read(io::Error),
    Write(io::Error),
}

/// Stream one entry's payload from `reader` (positioned at its first
/// compressed byte) into `writer`. Returns the number of bytes written.
///
/// `on_progress` receives the advisory 1..=6 progress steps as they are
/// crossed.
pub fn inflate_entry<R, W, P>(
    reader: &mut R,
    writer: &mut W,
    zlib_wrapped: bool,
    read_chunk_len: usize,
    uncompressed_size: u64,
    xor_mask: u8,
    mut on_progress: P,
) -> Result<u64, StreamFault>
where
    R: Read,
    W: Write,
    P: FnMut(u8),
{
    let mut decoder = Decompress::new(zlib_wrapped);
    let mut input = vec![0u8; read_chunk_len.max(1)];
    let mut output = vec![0u8; OUTPUT_BUFFER_SIZE];
    let mut carried = 0usize;
    let mut remaining = uncompressed_size;
    let mut progress = 0u8;

    while remaining > 0 {
        let fresh = read_fill(reader, &mut input[carried..]).map_err(StreamFault::Read)?;
        if fresh == 0 && carried == 0 {
            return Err(StreamFault::Truncated { remaining });
        }
        let available = carried + fresh;
        let want = remaining.min(OUTPUT_BUFFER_SIZE as u64) as usize;

        let before_in = decoder.total_in();
        let before_out = decoder.total_out();
        let status = decoder
            .decompress(&input[..available], &mut output[..want], FlushDecompress::None)
            .map_err(|e| StreamFault::Inflate(e.to_string()))?;
        let consumed = (decoder.total_in() - before_in) as usize;
        let produced = (decoder.total_out() - before_out) as usize;

        xor_content(xor_mask, &mut output[..produced]);
        writer.write_all(&output[..produced]).map_err(StreamFault::Write)?;
        remaining -= produced as u64;

        input.copy_within(consumed..available, 0);
        carried = available - consumed;
        trace!(fresh, consumed, produced, carried, remaining, "Inflate step");

        if remaining > 0 {
            if status == Status::StreamEnd {
                return Err(StreamFault::Truncated { remaining });
            }
            // Nothing new to read and the decoder is stuck on what it has
            if fresh == 0 && consumed == 0 && produced == 0 {
                return Err(StreamFault::Truncated { remaining });
            }
        }

        let done = uncompressed_size - remaining;
        let step = (done as u128 * PROGRESS_STEPS as u128 / uncompressed_size as u128) as u8;
        if step > progress {
            progress = step;
            on_progress(progress);
        }
    }

    Ok(uncompressed_size)
}

/// Extract one entry to `root`, creating its directories.
///
/// The output file, the container seek and every decode buffer are owned
/// by this call and released on every return path. Returns the output path
/// and the number of bytes written.
pub fn extract_entry<R, P>(
    reader: &mut R,
    root: &Path,
    name: &EntryName,
    span: &EntrySpan,
    signature: Signature,
    xor_mask: u8,
    on_progress: P,
) -> SdcResult<(PathBuf, u64)>
where
    R: Read + Seek,
    P: FnMut(u8),
{
    let path = paths::reconstruct(root, name.as_bytes())?;
    let file = File::create(&path).map_err(|source| SdcError::CreateFile {
        path: path.clone(),
        source,
    })?;
    let mut out = BufWriter::new(file);

    reader
        .seek(SeekFrom::Start(span.start))
        .map_err(|e| SdcError::io(format!("seeking to entry {} at {}", span.index, span.start), e))?;

    debug!(
        index = span.index,
        name = %name,
        start = span.start,
        span = span.length,
        read_chunk_len = span.read_chunk_len,
        uncompressed_size = span.uncompressed_size,
        "Unpacking entry"
    );

    let written = inflate_entry(
        reader,
        &mut out,
        signature.zlib_wrapped(),
        span.read_chunk_len,
        span.uncompressed_size,
        xor_mask,
        on_progress,
    )
    .map_err(|fault| match fault {
        StreamFault::Truncated { remaining } => SdcError::TruncatedStream {
            index: span.index,
            name: name.to_string(),
            remaining,
        },
        StreamFault::Inflate(message) => SdcError::Inflate {
            index: span.index,
            name: name.to_string(),
            message,
        },
        StreamFault::Read(e) => SdcError::io(format!("reading payload of entry {}", span.index), e),
        StreamFault::Write(e) => SdcError::io(format!("writing '{}'", path.display()), e),
    })?;

    out.flush()
        .map_err(|e| SdcError::io(format!("writing '{}'", path.display()), e))?;
    Ok((path, written))
}
