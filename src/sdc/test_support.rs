//! Synthetic SDC containers for tests

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use flate2::write::{DeflateEncoder, ZlibEncoder};
use flate2::Compression;

use super::cipher::{xor_content, KeyedCipher, Layer};
use super::types::*;
use crate::common::binary::u32_at;

/// 2020-01-01T00:00:00Z as FILETIME ticks
pub const TEST_FILETIME: u64 = 132_223_104_000_000_000;

pub fn test_key(xor: u32) -> KeyMaterial {
    KeyMaterial {
        expected_checksum: 0,
        file_name_key: std::array::from_fn(|i| (i as u8).wrapping_mul(7).wrapping_add(3)),
        content_xor_mask: xor,
    }
}

pub fn key_file_text(key: &KeyMaterial) -> String {
    format!(
        "# synthetic key\nchecksum = 0x{:08X}\nfilenamekey = {}\nxor = {}\n",
        key.expected_checksum,
        hex::encode(key.file_name_key),
        key.content_xor_mask
    )
}

/// Plain (decoded) header body, padded to at least the minimum header size
pub fn plain_header_body(raw_signature: u32, entries: &[Entry], names: &[u8]) -> Vec<u8> {
    let large = Signature::from_raw(raw_signature) == Signature::Large;
    let mut body = Vec::new();
    body.extend(raw_signature.to_le_bytes());
    body.extend((entries.len() as u32).to_le_bytes());
    for entry in entries {
        body.extend(entry.name_offset.to_le_bytes());
        if large {
            body.extend(entry.compressed_size.to_le_bytes());
            body.extend(entry.uncompressed_size.to_le_bytes());
        } else {
            body.extend((entry.compressed_size as u32).to_le_bytes());
            body.extend((entry.uncompressed_size as u32).to_le_bytes());
        }
        body.extend(entry.creation_time.to_le_bytes());
        body.extend(entry.access_time.to_le_bytes());
        body.extend(entry.modification_time.to_le_bytes());
    }
    body.extend((names.len() as u32).to_le_bytes());
    body.extend(names);
    if body.len() < MIN_HEADER_SIZE as usize {
        body.resize(MIN_HEADER_SIZE as usize, 0);
    }
    body
}

/// Apply the name table layer, then the header layer, to a plain body
pub fn encrypt_header_body(plain: &[u8], key: &KeyMaterial) -> Vec<u8> {
    let mut body = plain.to_vec();
    let signature = Signature::from_raw(u32_at(&body, 0).unwrap_or_default());
    let count = u32_at(&body, 4).unwrap_or_default() as usize;
    let table_at = FIXED_HEADER_LEN + count * signature.entry_len();
    if let Some(len) = u32_at(&body, table_at) {
        let start = table_at + 4;
        let end = (start + len as usize).min(body.len());
        KeyedCipher::new(&key.file_name_key, Layer::NameTable).apply(&mut body[start..end]);
    }
    KeyedCipher::new(&key.file_name_key, Layer::Header).apply(&mut body);
    body
}

/// Compress the way the container stores payloads for `signature`
pub fn compress(signature: Signature, data: &[u8]) -> Vec<u8> {
    match signature {
        Signature::Standard => {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(data).unwrap();
            encoder.finish().unwrap()
        }
        Signature::Large => {
            let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(data).unwrap();
            encoder.finish().unwrap()
        }
    }
}

/// Deterministic, moderately compressible text
pub fn sample_text(len: usize) -> Vec<u8> {
    let words: [&[u8]; 6] = [b"alpha ", b"bravo ", b"charlie ", b"delta\n", b"echo ", b"foxtrot "];
    let mut out = Vec::with_capacity(len);
    let mut state = 0x2545_F491_u32;
    while out.len() < len {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        out.extend_from_slice(words[(state % 6) as usize]);
        out.push((state >> 24) as u8);
    }
    out.truncate(len);
    out
}

pub struct TestFile {
    /// Raw name table bytes, without the terminator
    pub name: Vec<u8>,
    pub content: Vec<u8>,
    /// Stored compressed size field; defaults to the payload length
    pub compressed_size: Option<u64>,
}

impl TestFile {
    pub fn new(name: &str, content: &[u8]) -> Self {
        Self::with_raw_name(name.as_bytes(), content)
    }

    pub fn with_raw_name(name: &[u8], content: &[u8]) -> Self {
        Self {
            name: name.to_vec(),
            content: content.to_vec(),
            compressed_size: None,
        }
    }
}

pub struct BuiltContainer {
    pub bytes: Vec<u8>,
    pub key: KeyMaterial,
    pub header_size: u32,
    pub payloads: Vec<Vec<u8>>,
}

impl BuiltContainer {
    pub fn data_offset(&self) -> usize {
        4 + self.header_size as usize
    }
}

pub fn build_container(raw_signature: u32, files: &[TestFile], xor: u32) -> BuiltContainer {
    let signature = Signature::from_raw(raw_signature);
    let mut key = test_key(xor);

    let mut names = Vec::new();
    let mut entries = Vec::new();
    let mut payloads = Vec::new();
    for file in files {
        let mut masked = file.content.clone();
        xor_content(key.content_xor_byte(), &mut masked);
        let payload = compress(signature, &masked);

        entries.push(Entry {
            name_offset: names.len() as u32,
            compressed_size: file.compressed_size.unwrap_or(payload.len() as u64),
            uncompressed_size: file.content.len() as u64,
            creation_time: TEST_FILETIME,
            access_time: TEST_FILETIME,
            modification_time: TEST_FILETIME,
        });
        names.extend(&file.name);
        names.push(0);
        payloads.push(payload);
    }

    let plain = plain_header_body(raw_signature, &entries, &names);
    let header_size = plain.len() as u32;

    let mut bytes = header_size.to_le_bytes().to_vec();
    bytes.extend(encrypt_header_body(&plain, &key));
    let data_start = bytes.len();
    for payload in &payloads {
        bytes.extend(payload);
    }
    key.expected_checksum = crc32fast::hash(&bytes[data_start..]);

    BuiltContainer {
        bytes,
        key,
        header_size,
        payloads,
    }
}

/// Write `<dir>/<file_name>` and its `.key` companion
pub fn write_container(dir: &Path, file_name: &str, built: &BuiltContainer) -> PathBuf {
    let path = dir.join(file_name);
    fs::write(&path, &built.bytes).unwrap();
    fs::write(dir.join(format!("{file_name}.key")), key_file_text(&built.key)).unwrap();
    path
}
