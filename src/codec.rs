//! Guess payload encoding with optional AES-CFB encryption
//!
//! The guess list is stored as a JSON array. When an encryption key is
//! configured the JSON bytes are encrypted with AES in full-block CFB mode.
//!
//! WARNING: the IV is a fixed, publicly known constant. Identical plaintext
//! prefixes therefore produce identical ciphertext prefixes. This is kept only
//! so payloads written by earlier deployments still decrypt; switching to a
//! random per-record IV would make every existing record unreadable.

use crate::error::CodecError;
use crate::types::Guess;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{AsyncStreamCipher, KeyIvInit};
use aes::{Aes128, Aes192, Aes256};

/// Initialization vector shared by every stored payload
const FIXED_IV: [u8; 16] = [
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f,
];

/// AES key; the variant is chosen by key length
#[derive(Clone)]
enum CipherKey {
    Aes128([u8; 16]),
    Aes192([u8; 24]),
    Aes256([u8; 32]),
}

/// Symmetric cipher applied to stored guess payloads
#[derive(Clone)]
pub struct GuessCipher {
    key: CipherKey,
}

impl std::fmt::Debug for GuessCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bits = match self.key {
            CipherKey::Aes128(_) => 128,
            CipherKey::Aes192(_) => 192,
            CipherKey::Aes256(_) => 256,
        };
        write!(f, "GuessCipher(AES-{}-CFB)", bits)
    }
}

impl GuessCipher {
    /// Build a cipher from the configured key. The raw key bytes are used
    /// directly, so the key must be exactly 16, 24 or 32 bytes long.
    pub fn new(key: &str) -> Result<Self, CodecError> {
        let bytes = key.as_bytes();
        let key = match bytes.len() {
            16 => CipherKey::Aes128(copy_key(bytes)),
            24 => CipherKey::Aes192(copy_key(bytes)),
            32 => CipherKey::Aes256(copy_key(bytes)),
            other => return Err(CodecError::InvalidKeyLength(other)),
        };
        Ok(Self { key })
    }

    pub fn encrypt(&self, buf: &mut [u8]) {
        let iv = GenericArray::from_slice(&FIXED_IV);
        match &self.key {
            CipherKey::Aes128(k) => cfb_mode::Encryptor::<Aes128>::new(GenericArray::from_slice(k), iv).encrypt(buf),
            CipherKey::Aes192(k) => cfb_mode::Encryptor::<Aes192>::new(GenericArray::from_slice(k), iv).encrypt(buf),
            CipherKey::Aes256(k) => cfb_mode::Encryptor::<Aes256>::new(GenericArray::from_slice(k), iv).encrypt(buf),
        }
    }

    pub fn decrypt(&self, buf: &mut [u8]) {
        let iv = GenericArray::from_slice(&FIXED_IV);
        match &self.key {
            CipherKey::Aes128(k) => cfb_mode::Decryptor::<Aes128>::new(GenericArray::from_slice(k), iv).decrypt(buf),
            CipherKey::Aes192(k) => cfb_mode::Decryptor::<Aes192>::new(GenericArray::from_slice(k), iv).decrypt(buf),
            CipherKey::Aes256(k) => cfb_mode::Decryptor::<Aes256>::new(GenericArray::from_slice(k), iv).decrypt(buf),
        }
    }
}

fn copy_key<const N: usize>(bytes: &[u8]) -> [u8; N] {
    let mut key = [0u8; N];
    key.copy_from_slice(bytes);
    key
}

/// Serialize a guess list, encrypting it when a cipher is configured
pub fn encode_guesses(guesses: &[Guess], cipher: Option<&GuessCipher>) -> Result<Vec<u8>, CodecError> {
    let mut payload = serde_json::to_vec(guesses)?;
    if let Some(cipher) = cipher {
        cipher.encrypt(&mut payload);
    }
    Ok(payload)
}

/// Reverse of [`encode_guesses`]. An empty payload decodes as no guesses.
pub fn decode_guesses(payload: &[u8], cipher: Option<&GuessCipher>) -> Result<Vec<Guess>, CodecError> {
    if payload.is_empty() {
        return Ok(Vec::new());
    }
    let mut plaintext = payload.to_vec();
    if let Some(cipher) = cipher {
        cipher.decrypt(&mut plaintext);
    }
    // Older records may hold a JSON null instead of an empty array
    let guesses: Option<Vec<Guess>> = serde_json::from_slice(&plaintext)?;
    Ok(guesses.unwrap_or_default())
}
