//! Container header and file name table decoding
//!
//! The decoded header body is held as one owned buffer. The fixed header,
//! the entry array and the name table are views into it addressed by
//! offset and length:
//!
//! ```text
//! 0x00  u32 signature
//! 0x04  u32 entry_count
//! 0x08  entry[entry_count]          (36 or 44 bytes each)
//! ....  u32 name_table_len
//! ....  name table (second keyed layer)
//! ....  padding up to header_size
//! ```

use std::io::{Read, Write};
use std::ops::Range;

use tracing::{debug, trace, warn};

use super::cipher::{required_output_len, KeyedCipher, Layer, DECRYPT_ERR_OUT_OF_BOUNDS};
use super::types::*;
use crate::common::binary::{read_u32_le, u32_at, u64_at};
use crate::error::{DecryptStage, SdcError, SdcResult};

/// Decoded container header
#[derive(Debug, Clone)]
pub struct ContainerHeader {
    /// Declared length of the header body (the length prefix)
    pub header_size: u32,
    pub raw_signature: u32,
    pub signature: Signature,
    /// Declared entry count; `entries` may be shorter if the table overflows
    pub entry_count: u32,
    pub entries: Vec<Entry>,
    body: Vec<u8>,
    names: Option<Range<usize>>,
}

impl ContainerHeader {
    /// Read the length prefix and header body from the start of a container,
    /// then decode the header layer.
    pub fn read<R: Read>(reader: &mut R, key: &KeyMaterial) -> SdcResult<Self> {
        let header_size =
            read_u32_le(reader).map_err(|e| SdcError::io("reading SDC header size", e))?;
        if header_size < MIN_HEADER_SIZE {
            return Err(SdcError::ForeignSignature(header_size));
        }

        // Grow with the data actually present; the prefix is untrusted
        let mut body = Vec::with_capacity(MIN_HEADER_SIZE as usize);
        let context = || format!("reading {header_size}-byte SDC header");
        reader
            .by_ref()
            .take(header_size as u64)
            .read_to_end(&mut body)
            .map_err(|e| SdcError::io(context(), e))?;
        if body.len() < header_size as usize {
            return Err(SdcError::io(
                context(),
                std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("container ends after {} header bytes", body.len()),
                ),
            ));
        }

        Self::decode(header_size, body, key)
    }

    /// Decode an encrypted header body in place and parse it
    pub fn decode(header_size: u32, mut body: Vec<u8>, key: &KeyMaterial) -> SdcResult<Self> {
        KeyedCipher::new(&key.file_name_key, Layer::Header).apply(&mut body);
        Self::parse(header_size, body)
    }

    /// Parse an already decoded header body
    fn parse(header_size: u32, body: Vec<u8>) -> SdcResult<Self> {
        let (raw_signature, entry_count) = match (u32_at(&body, 0), u32_at(&body, 4)) {
            (Some(sig), Some(count)) => (sig, count),
            _ => {
                return Err(SdcError::HeaderFormat(format!(
                    "header body of {} bytes has no room for the fixed header",
                    body.len()
                )))
            }
        };
        let signature = Signature::from_raw(raw_signature);
        let stride = signature.entry_len();

        // Only parse records that lie inside the body; the structure check
        // reports the rest
        let room = (body.len() - FIXED_HEADER_LEN) / stride;
        let parsed = room.min(entry_count as usize);
        if parsed < entry_count as usize {
            warn!(entry_count, parsed, "Entry table overflows the header body");
        }

        let mut entries = Vec::with_capacity(parsed);
        for index in 0..parsed {
            let record = &body[FIXED_HEADER_LEN + index * stride..][..stride];
            entries.push(parse_entry(record, signature));
        }

        debug!(
            header_size,
            signature = ?signature,
            raw_signature = format!("0x{raw_signature:08X}"),
            entry_count,
            "SDC header decoded"
        );

        Ok(Self {
            header_size,
            raw_signature,
            signature,
            entry_count,
            entries,
            body,
            names: None,
        })
    }

    /// Offset of the first entry's payload in the container
    pub fn data_offset(&self) -> u64 {
        LENGTH_PREFIX_LEN + self.header_size as u64
    }

    /// Check that the declared entry table fits in the declared header size
    pub fn structure(&self) -> StructureReport {
        let required = self.entry_table_end() as u64;
        let available = self.header_size as u64;
        StructureReport {
            required,
            available,
            fits: required <= available,
        }
    }

    fn entry_table_end(&self) -> usize {
        FIXED_HEADER_LEN.saturating_add((self.entry_count as usize).saturating_mul(self.signature.entry_len()))
    }

    /// Decrypt the name table that follows the entry array, in place
    pub fn decrypt_names(&mut self, key: &KeyMaterial) -> SdcResult<()> {
        if self.names.is_some() {
            return Ok(());
        }
        let out_of_bounds = SdcError::Decrypt {
            stage: DecryptStage::NameTable,
            code: DECRYPT_ERR_OUT_OF_BOUNDS,
        };

        let table_at = self.entry_table_end();
        let len = match u32_at(&self.body, table_at) {
            Some(len) => len as usize,
            None => return Err(out_of_bounds),
        };
        let start = table_at + 4;
        let end = match start.checked_add(len) {
            Some(end) if end <= self.body.len() => end,
            _ => return Err(out_of_bounds),
        };

        let mut plain = vec![0u8; required_output_len(len)];
        let cipher = KeyedCipher::new(&key.file_name_key, Layer::NameTable);
        let written = cipher
            .decrypt_into(&self.body[start..end], &mut plain)
            .map_err(|code| SdcError::Decrypt {
                stage: DecryptStage::NameTable,
                code,
            })?;

        self.body[start..start + written].copy_from_slice(&plain[..written]);
        self.names = Some(start..start + written);
        trace!(offset = start, len = written, "Name table decrypted");
        Ok(())
    }

    /// Decrypted name table bytes, once [`decrypt_names`](Self::decrypt_names) ran
    pub fn name_table(&self) -> Option<&[u8]> {
        self.names.clone().map(|range| &self.body[range])
    }

    /// Foreign path of entry `index`, read from the decrypted name table
    pub fn entry_name(&self, index: usize) -> SdcResult<EntryName> {
        let table = self
            .name_table()
            .ok_or_else(|| SdcError::HeaderFormat("name table has not been decrypted".into()))?;
        let entry = self
            .entries
            .get(index)
            .ok_or_else(|| SdcError::HeaderFormat(format!("no entry with index {index}")))?;
        let offset = entry.name_offset as usize;
        if offset >= table.len() {
            return Err(SdcError::HeaderFormat(format!(
                "name offset {offset} of entry {index} is outside the {}-byte name table",
                table.len()
            )));
        }
        Ok(EntryName::from_table(&table[offset..]))
    }

    /// Precompute every entry's payload location.
    ///
    /// Payloads are packed back to back from [`data_offset`](Self::data_offset),
    /// each one advancing by the entry's full compressed span.
    pub fn entry_spans(&self) -> SdcResult<Vec<EntrySpan>> {
        let mut cursor = self.data_offset();
        let mut spans = Vec::with_capacity(self.entries.len());
        for (index, entry) in self.entries.iter().enumerate() {
            spans.push(EntrySpan {
                index,
                start: cursor,
                length: entry.compressed_span(),
                read_chunk_len: entry.read_chunk_len(),
                uncompressed_size: entry.uncompressed_size,
            });
            cursor = cursor.checked_add(entry.compressed_span()).ok_or_else(|| {
                SdcError::HeaderFormat(format!("entry {index} compressed size overflows"))
            })?;
        }
        Ok(spans)
    }

    /// Write the decoded header with the same length-prefix framing as the input
    pub fn write_decoded<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.header_size.to_le_bytes())?;
        writer.write_all(&self.body)?;
        writer.flush()
    }
}

/// Interpret one entry record per the signature-selected layout
fn parse_entry(record: &[u8], signature: Signature) -> Entry {
    // `record` is exactly `signature.entry_len()` bytes, every read is in range
    let u32_field = |offset| u32_at(record, offset).unwrap_or_default();
    let u64_field = |offset| u64_at(record, offset).unwrap_or_default();

    match signature {
        Signature::Standard => Entry {
            name_offset: u32_field(0x00),
            compressed_size: u32_field(0x04) as u64,
            uncompressed_size: u32_field(0x08) as u64,
            creation_time: u64_field(0x0c),
            access_time: u64_field(0x14),
            modification_time: u64_field(0x1c),
        },
        Signature::Large => Entry {
            name_offset: u32_field(0x00),
            compressed_size: u64_field(0x04),
            uncompressed_size: u64_field(0x0c),
            creation_time: u64_field(0x14),
            access_time: u64_field(0x1c),
            modification_time: u64_field(0x24),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::sdc::test_support::*;
    use std::io::Cursor;

    fn sample_entries() -> Vec<Entry> {
        vec![
            Entry {
                name_offset: 0,
                compressed_size: 0x4123,
                uncompressed_size: 70_000,
                creation_time: 132_000_000_000_000_000,
                access_time: 132_000_000_100_000_000,
                modification_time: 132_000_000_200_000_000,
            },
            Entry {
                name_offset: 18,
                compressed_size: 12,
                uncompressed_size: 0,
                creation_time: 1,
                access_time: 2,
                modification_time: 3,
            },
        ]
    }

    fn names() -> Vec<u8> {
        b"SETUP\\DISK1\\A.CAB\0README.TXT\0".to_vec()
    }

    #[test]
    fn test_decode_inverts_encode() {
        let key = test_key(0);
        for raw_signature in [SIG_STANDARD, SIG_LARGE] {
            let plain = plain_header_body(raw_signature, &sample_entries(), &names());
            let encrypted = encrypt_header_body(&plain, &key);
            assert_ne!(encrypted, plain);

            let mut header =
                ContainerHeader::decode(plain.len() as u32, encrypted, &key).unwrap();
            assert_eq!(header.raw_signature, raw_signature);
            assert_eq!(header.entries, sample_entries());
            assert!(header.structure().fits);

            header.decrypt_names(&key).unwrap();
            let mut decoded = Vec::new();
            header.write_decoded(&mut decoded).unwrap();
            assert_eq!(&decoded[4..], &plain[..]);
            assert_eq!(header.name_table(), Some(&names()[..]));
            assert_eq!(header.entry_name(0).unwrap().as_bytes(), b"SETUP\\DISK1\\A.CAB");
            assert_eq!(header.entry_name(1).unwrap().to_string(), "README.TXT");
        }
    }

    #[test]
    fn test_large_entries_keep_64bit_sizes() {
        let key = test_key(0);
        let mut entries = sample_entries();
        entries[0].uncompressed_size = 5 * 1024 * 1024 * 1024;
        let plain = plain_header_body(SIG_LARGE, &entries, &names());
        let header =
            ContainerHeader::decode(plain.len() as u32, encrypt_header_body(&plain, &key), &key)
                .unwrap();
        assert_eq!(header.signature, Signature::Large);
        assert_eq!(header.entries[0].uncompressed_size, 5 * 1024 * 1024 * 1024);
    }

    #[test]
    fn test_foreign_signature_rejected_before_decode() {
        let key = test_key(0);
        for size in [0x00u32, 0x0A, 0xFE] {
            let mut bytes = size.to_le_bytes().to_vec();
            bytes.extend(vec![0u8; 0x200]);
            let err = ContainerHeader::read(&mut Cursor::new(bytes), &key).unwrap_err();
            assert!(matches!(err, SdcError::ForeignSignature(s) if s == size));
            assert_eq!(err.kind(), ErrorKind::Format);
        }
    }

    #[test]
    fn test_minimum_header_size_proceeds() {
        let key = test_key(0);
        let plain = plain_header_body(SIG_STANDARD, &[], b"");
        assert_eq!(plain.len(), 0xFF);
        let mut bytes = 0xFFu32.to_le_bytes().to_vec();
        bytes.extend(encrypt_header_body(&plain, &key));

        let header = ContainerHeader::read(&mut Cursor::new(bytes), &key).unwrap();
        assert_eq!(header.header_size, 0xFF);
        assert_eq!(header.entry_count, 0);
        assert_eq!(header.data_offset(), 0x103);
    }

    #[test]
    fn test_short_header_body() {
        let key = test_key(0);
        let mut bytes = 0x400u32.to_le_bytes().to_vec();
        bytes.extend(vec![0u8; 0x100]);
        let err = ContainerHeader::read(&mut Cursor::new(bytes), &key).unwrap_err();
        match err {
            SdcError::Io { source, .. } => {
                assert_eq!(source.kind(), std::io::ErrorKind::UnexpectedEof)
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_huge_header_size_fails_without_allocating() {
        let key = test_key(0);
        let mut bytes = 0xFFFF_FFF0u32.to_le_bytes().to_vec();
        bytes.extend(vec![0u8; 0x200]);
        let err = ContainerHeader::read(&mut Cursor::new(bytes), &key).unwrap_err();
        match err {
            SdcError::Io { source, .. } => {
                assert_eq!(source.kind(), std::io::ErrorKind::UnexpectedEof)
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_code_page_names_are_kept_raw() {
        let key = test_key(0);
        let mut entries = sample_entries();
        entries[1].name_offset = 9;
        let names = b"caf\xE9.txt\0caf\xE8.txt\0".to_vec();
        let plain = plain_header_body(SIG_STANDARD, &entries, &names);
        let mut header =
            ContainerHeader::decode(plain.len() as u32, encrypt_header_body(&plain, &key), &key)
                .unwrap();
        header.decrypt_names(&key).unwrap();
        assert_eq!(header.entry_name(0).unwrap().as_bytes(), b"caf\xE9.txt");
        assert_eq!(header.entry_name(1).unwrap().as_bytes(), b"caf\xE8.txt");
    }

    #[test]
    fn test_structure_check_with_wrong_key() {
        let key = test_key(0);
        let plain = plain_header_body(SIG_STANDARD, &sample_entries(), &names());
        let encrypted = encrypt_header_body(&plain, &key);

        let mut wrong = test_key(0);
        wrong.file_name_key[0] ^= 0xFF;
        // Garbage entry counts are near certain to overflow the header
        let header = ContainerHeader::decode(plain.len() as u32, encrypted, &wrong).unwrap();
        let structure = header.structure();
        if !structure.fits {
            assert!(header.entries.len() < header.entry_count as usize);
        }
        assert_ne!(header.entries, sample_entries());
    }

    #[test]
    fn test_overflowing_table_is_reported() {
        let mut plain = plain_header_body(SIG_STANDARD, &sample_entries(), &names());
        plain[4..8].copy_from_slice(&1000u32.to_le_bytes());
        let header = ContainerHeader::parse(plain.len() as u32, plain).unwrap();
        let structure = header.structure();
        assert!(!structure.fits);
        assert_eq!(structure.required, 8 + 1000 * 36);
        assert!(header.entries.len() < 1000);
    }

    #[test]
    fn test_name_table_out_of_bounds() {
        let key = test_key(0);
        let mut plain = plain_header_body(SIG_STANDARD, &sample_entries(), &names());
        let table_at = FIXED_HEADER_LEN + 2 * STANDARD_ENTRY_LEN;
        plain[table_at..table_at + 4].copy_from_slice(&0xFFFF_u32.to_le_bytes());
        let mut header =
            ContainerHeader::decode(plain.len() as u32, encrypt_header_body(&plain, &key), &key)
                .unwrap();
        let err = header.decrypt_names(&key).unwrap_err();
        assert!(matches!(
            err,
            SdcError::Decrypt { stage: DecryptStage::NameTable, code: DECRYPT_ERR_OUT_OF_BOUNDS }
        ));
    }

    #[test]
    fn test_entry_spans_are_contiguous() {
        let key = test_key(0);
        let plain = plain_header_body(SIG_STANDARD, &sample_entries(), &names());
        let header =
            ContainerHeader::decode(plain.len() as u32, encrypt_header_body(&plain, &key), &key)
                .unwrap();
        let spans = header.entry_spans().unwrap();
        assert_eq!(spans[0].start, 4 + plain.len() as u64);
        assert_eq!(spans[0].read_chunk_len, 0x123);
        assert_eq!(spans[0].length, 0x4123);
        assert_eq!(spans[1].start, spans[0].start + 0x4123);
        assert_eq!(spans[1].read_chunk_len, 12);
    }

    #[test]
    fn test_write_decoded_framing() {
        let key = test_key(0);
        let plain = plain_header_body(SIG_STANDARD, &sample_entries(), &names());
        let mut header =
            ContainerHeader::decode(plain.len() as u32, encrypt_header_body(&plain, &key), &key)
                .unwrap();
        header.decrypt_names(&key).unwrap();

        let mut sink = Vec::new();
        header.write_decoded(&mut sink).unwrap();
        assert_eq!(&sink[..4], &(plain.len() as u32).to_le_bytes());
        assert_eq!(&sink[4..], &plain[..]);
    }

    #[test]
    fn test_entry_name_requires_decrypted_table() {
        let key = test_key(0);
        let plain = plain_header_body(SIG_STANDARD, &sample_entries(), &names());
        let header =
            ContainerHeader::decode(plain.len() as u32, encrypt_header_body(&plain, &key), &key)
                .unwrap();
        assert!(header.entry_name(0).is_err());
    }
}
