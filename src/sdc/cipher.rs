//! Keyed decode layers
//!
//! The header body and the file name table are each protected by an
//! AES-256 counter-mode keystream keyed with the key file's 32-byte
//! name key. Every layer has its own counter prefix, so the layers are
//! independent even though they share a key. Counter mode is its own
//! inverse: the same call encodes and decodes.
//!
//! File content is protected separately by a single-byte XOR applied
//! after decompression (see [`xor_content`]).

use aes::cipher::{BlockEncrypt, KeyInit};
use aes::{Aes256Enc, Block as AesBlock};

use super::types::FILE_NAME_KEY_LEN;

/// Cipher block granularity in bytes
pub const CIPHER_BLOCK_LEN: usize = 16;

/// Output buffer smaller than [`required_output_len`]
pub const DECRYPT_ERR_OUTPUT_TOO_SMALL: i32 = -2;
/// Ciphertext length field points outside the header body
pub const DECRYPT_ERR_OUT_OF_BOUNDS: i32 = -3;

/// Which keyed layer a cipher instance serves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Header,
    NameTable,
}

impl Layer {
    fn counter_prefix(&self) -> [u8; 8] {
        match self {
            Layer::Header => *b"SDC-HDR\0",
            Layer::NameTable => *b"SDC-FNT\0",
        }
    }
}

/// Keyed, involutive transform for one layer
pub struct KeyedCipher {
    cipher: Aes256Enc,
    prefix: [u8; 8],
}

impl KeyedCipher {
    pub fn new(key: &[u8; FILE_NAME_KEY_LEN], layer: Layer) -> Self {
        Self {
            cipher: Aes256Enc::new(key.into()),
            prefix: layer.counter_prefix(),
        }
    }

    /// XOR the layer keystream over `data` in place
    pub fn apply(&self, data: &mut [u8]) {
        for (counter, chunk) in data.chunks_mut(CIPHER_BLOCK_LEN).enumerate() {
            let mut block = AesBlock::default();
            block[..8].copy_from_slice(&self.prefix);
            block[8..].copy_from_slice(&(counter as u64).to_be_bytes());
            self.cipher.encrypt_block(&mut block);
            for (byte, key) in chunk.iter_mut().zip(block.iter()) {
                *byte ^= key;
            }
        }
    }

    /// Decrypt `ciphertext` into `out`, returning the plaintext length.
    ///
    /// `out` must hold at least [`required_output_len`] bytes; the byte after
    /// the plaintext is set to zero so the result is always terminated.
    pub fn decrypt_into(&self, ciphertext: &[u8], out: &mut [u8]) -> Result<usize, i32> {
        if out.len() < required_output_len(ciphertext.len()) {
            return Err(DECRYPT_ERR_OUTPUT_TOO_SMALL);
        }
        let plain = &mut out[..ciphertext.len()];
        plain.copy_from_slice(ciphertext);
        self.apply(plain);
        out[ciphertext.len()] = 0;
        Ok(ciphertext.len())
    }
}

/// Ciphertext length rounded up to the cipher block granularity
pub fn data_output_size(len: usize) -> usize {
    len.div_ceil(CIPHER_BLOCK_LEN) * CIPHER_BLOCK_LEN
}

/// Output buffer needed to decrypt `len` ciphertext bytes (plus terminator)
pub fn required_output_len(len: usize) -> usize {
    data_output_size(len) + 1
}

/// Content layer: XOR every byte with `mask`. Self-inverse.
#[inline]
pub fn xor_content(mask: u8, data: &mut [u8]) {
    if mask == 0 {
        return;
    }
    for byte in data.iter_mut() {
        *byte ^= mask;
    }
}
