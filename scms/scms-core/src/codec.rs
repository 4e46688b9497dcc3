//! Confidentiality codec for document bodies.
//!
//! The key is derived once with scrypt and kept in memory. Ciphertext layout
//! is `IV (16 bytes) || AES-256-CFB(plaintext)`.
//!
//! CFB carries no authentication tag: a tampered body decrypts to garbage
//! rather than failing. Only a blob shorter than one block is rejected.

use crate::error::{Error, Result};
use aes::Aes256;
use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};
use rand::RngCore;
use std::fmt;
use zeroize::Zeroizing;

type Aes256CfbEnc = cfb_mode::Encryptor<Aes256>;
type Aes256CfbDec = cfb_mode::Decryptor<Aes256>;

pub const BLOCK_SIZE: usize = 16;
pub const KEY_LEN: usize = 32;

/// scrypt cost: N = 2^14 = 16384, r = 8, p = 1.
const SCRYPT_LOG_N: u8 = 14;
const SCRYPT_R: u32 = 8;
const SCRYPT_P: u32 = 1;

pub const DEFAULT_PASSPHRASE: &str = "Take these documents, both the sealed and unsealed copies of the deed of purchase, and put them in a clay jar so they will last a long time.";
pub const DEFAULT_SALT: &str = "verse";

/// Shown to tech principals instead of the decrypted body.
pub const TECH_PLACEHOLDER: &str =
    "<p>This is a sample text that tech users can see.</p><p>Shalom.</p>";

/// Source of initialization vectors.
pub trait RandomSource: Send + Sync {
    fn fill(&self, dest: &mut [u8]) -> Result<()>;
}

/// Operating system CSPRNG.
#[derive(Clone, Copy, Debug, Default)]
pub struct OsRandom;

impl RandomSource for OsRandom {
    fn fill(&self, dest: &mut [u8]) -> Result<()> {
        rand::rngs::OsRng
            .try_fill_bytes(dest)
            .map_err(|e| Error::Random(e.to_string()))
    }
}

/// Run scrypt with the store's fixed cost parameters.
pub fn derive_key(password: &[u8], salt: &[u8]) -> Result<Zeroizing<[u8; KEY_LEN]>> {
    let params = scrypt::Params::new(SCRYPT_LOG_N, SCRYPT_R, SCRYPT_P, KEY_LEN)
        .map_err(|e| Error::KeyDerivation(e.to_string()))?;
    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    scrypt::scrypt(password, salt, &params, &mut key[..])
        .map_err(|e| Error::KeyDerivation(e.to_string()))?;
    Ok(key)
}

pub struct Codec {
    key: Zeroizing<[u8; KEY_LEN]>,
    random: Box<dyn RandomSource>,
}

impl Codec {
    /// Derive the process key. Takes a noticeable fraction of a second; call once at startup.
    pub fn derive(passphrase: &str, salt: &str) -> Result<Self> {
        let key = derive_key(passphrase.as_bytes(), salt.as_bytes())?;
        Ok(Self::from_key(key))
    }

    pub fn from_key(key: Zeroizing<[u8; KEY_LEN]>) -> Self {
        Self {
            key,
            random: Box::new(OsRandom),
        }
    }

    pub fn with_random(mut self, random: impl RandomSource + 'static) -> Self {
        self.random = Box::new(random);
        self
    }

    /// Encrypt under a fresh IV.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut out = vec![0u8; BLOCK_SIZE + plaintext.len()];
        let (iv, body) = out.split_at_mut(BLOCK_SIZE);
        self.random.fill(iv)?;
        body.copy_from_slice(plaintext);
        Aes256CfbEnc::new_from_slices(&self.key[..], iv)
            .map_err(|e| Error::KeyDerivation(e.to_string()))?
            .encrypt(body);
        Ok(out)
    }

    pub fn decrypt(&self, blob: &[u8]) -> Result<Vec<u8>> {
        if blob.len() < BLOCK_SIZE {
            return Err(Error::CiphertextTooShort { len: blob.len() });
        }
        let (iv, body) = blob.split_at(BLOCK_SIZE);
        let mut plaintext = body.to_vec();
        Aes256CfbDec::new_from_slices(&self.key[..], iv)
            .map_err(|e| Error::KeyDerivation(e.to_string()))?
            .decrypt(&mut plaintext);
        Ok(plaintext)
    }

    /// Decrypt and interpret the body as text.
    pub fn decrypt_text(&self, blob: &[u8]) -> Result<String> {
        let plaintext = self.decrypt(blob)?;
        Ok(String::from_utf8_lossy(&plaintext).into_owned())
    }
}

impl fmt::Debug for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec").field("key", &"<redacted>").finish()
    }
}
