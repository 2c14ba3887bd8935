//! Key file parsing
//!
//! The companion `<container>.key` file is line-oriented text:
//!
//! ```text
//! # comment
//! checksum    = 1A2B3C4D
//! filenamekey = 000102...1F   (64 hex digits)
//! xor         = 0x5A
//! ```
//!
//! All three fields are required exactly once. Nothing is returned until
//! every field has been validated.

use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, trace};

use super::types::{KeyMaterial, FILE_NAME_KEY_LEN};
use crate::error::{SdcError, SdcResult};

/// `name = value` or `name: value`, compiled once on first use
fn field_regex() -> &'static Regex {
    static FIELD_REGEX: OnceLock<Regex> = OnceLock::new();
    FIELD_REGEX.get_or_init(|| {
        Regex::new(r"^\s*([A-Za-z_]+)\s*[=:]\s*(\S+)\s*$").expect("Invalid key field regex")
    })
}

impl KeyMaterial {
    /// Parse key file text into key material
    pub fn parse(text: &str) -> SdcResult<Self> {
        let mut checksum = None;
        let mut name_key = None;
        let mut xor = None;

        for (line_no, line) in text.lines().enumerate() {
            let line_no = line_no + 1;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }

            let caps = field_regex().captures(trimmed).ok_or_else(|| {
                SdcError::KeyFormat(format!("line {line_no}: expected 'name = value'"))
            })?;
            let name = caps[1].to_ascii_lowercase();
            let value = &caps[2];
            trace!(line_no, field = %name, "Key file field");

            match name.as_str() {
                "checksum" => set_once(&mut checksum, parse_hex_u32(value, "checksum")?, &name)?,
                "filenamekey" => set_once(&mut name_key, parse_name_key(value)?, &name)?,
                "xor" => set_once(&mut xor, parse_u32(value, "xor")?, &name)?,
                _ => {
                    return Err(SdcError::KeyFormat(format!(
                        "line {line_no}: unknown field '{name}'"
                    )))
                }
            }
        }

        let key = KeyMaterial {
            expected_checksum: checksum
                .ok_or_else(|| SdcError::KeyFormat("missing 'checksum' field".into()))?,
            file_name_key: name_key
                .ok_or_else(|| SdcError::KeyFormat("missing 'filenamekey' field".into()))?,
            content_xor_mask: xor
                .ok_or_else(|| SdcError::KeyFormat("missing 'xor' field".into()))?,
        };
        debug!(checksum = format!("0x{:08X}", key.expected_checksum), "Key file parsed");
        Ok(key)
    }
}

fn set_once<T>(slot: &mut Option<T>, value: T, name: &str) -> SdcResult<()> {
    if slot.is_some() {
        return Err(SdcError::KeyFormat(format!("duplicate '{name}' field")));
    }
    *slot = Some(value);
    Ok(())
}

fn strip_hex_prefix(value: &str) -> Option<&str> {
    value.strip_prefix("0x").or_else(|| value.strip_prefix("0X"))
}

fn parse_hex_u32(value: &str, field: &str) -> SdcResult<u32> {
    let digits = strip_hex_prefix(value).unwrap_or(value);
    if digits.is_empty() || digits.len() > 8 {
        return Err(SdcError::KeyFormat(format!("'{field}' must be at most 8 hex digits")));
    }
    u32::from_str_radix(digits, 16)
        .map_err(|e| SdcError::KeyFormat(format!("'{field}' is not hexadecimal: {e}")))
}

/// `0x`-prefixed hex or plain decimal
fn parse_u32(value: &str, field: &str) -> SdcResult<u32> {
    match strip_hex_prefix(value) {
        Some(_) => parse_hex_u32(value, field),
        None => value
            .parse::<u32>()
            .map_err(|e| SdcError::KeyFormat(format!("'{field}' is not a number: {e}"))),
    }
}

fn parse_name_key(value: &str) -> SdcResult<[u8; FILE_NAME_KEY_LEN]> {
    let bytes = hex::decode(value)
        .map_err(|e| SdcError::KeyFormat(format!("'filenamekey' is not hexadecimal: {e}")))?;
    bytes.try_into().map_err(|bytes: Vec<u8>| {
        SdcError::KeyFormat(format!(
            "'filenamekey' must be {FILE_NAME_KEY_LEN} bytes, got {}",
            bytes.len()
        ))
    })
}
