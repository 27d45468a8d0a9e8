//! Symmetric encryption for private nodes, entry indices and share payloads.
//!
//! Every private node has its own [`Secret`]. Ciphertexts carry the BLAKE3
//! hash of the plaintext inside the AEAD envelope so a decrypt also proves
//! content integrity.

use std::fmt;
use std::ops::Deref;
use std::str::FromStr;

use chacha20poly1305::Key;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use serde::{Deserialize, Serialize};

/// Size of ChaCha20-Poly1305 nonce in bytes
pub const NONCE_SIZE: usize = 12;
/// Size of ChaCha20-Poly1305 key in bytes (256 bits)
pub const SECRET_SIZE: usize = 32;
/// Size of BLAKE3 hash in bytes (256 bits)
pub const BLAKE3_HASH_SIZE: usize = 32;

#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    #[error("secret error: {0}")]
    Default(#[from] anyhow::Error),
}

/// Algorithm tag carried next to exported keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SymmAlg {
    #[default]
    #[serde(rename = "CHACHA20-POLY1305")]
    ChaCha20Poly1305,
}

impl fmt::Display for SymmAlg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SymmAlg::ChaCha20Poly1305 => write!(f, "CHACHA20-POLY1305"),
        }
    }
}

/// A 256-bit ChaCha20-Poly1305 key.
///
/// Ciphertext layout: `nonce (12) || AEAD(blake3(plaintext) || plaintext)`.
#[derive(PartialEq, Eq, Clone, Serialize, Deserialize)]
pub struct Secret([u8; SECRET_SIZE]);

impl Default for Secret {
    fn default() -> Self {
        Secret([0; SECRET_SIZE])
    }
}

impl Deref for Secret {
    type Target = [u8; SECRET_SIZE];
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<[u8; SECRET_SIZE]> for Secret {
    fn from(bytes: [u8; SECRET_SIZE]) -> Self {
        Secret(bytes)
    }
}

// keys never end up in logs
impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(..)")
    }
}

impl FromStr for Secret {
    type Err = SecretError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Secret::from_hex(s)
    }
}

impl Secret {
    pub fn generate() -> Self {
        let mut buff = [0; SECRET_SIZE];
        getrandom::getrandom(&mut buff).expect("failed to generate random bytes");
        Self(buff)
    }

    /// Derive a key from arbitrary material under a domain separation context
    pub fn derive(context: &str, material: &[u8]) -> Self {
        Self(blake3::derive_key(context, material))
    }

    pub fn from_slice(data: &[u8]) -> Result<Self, SecretError> {
        let buff: [u8; SECRET_SIZE] = data.try_into().map_err(|_| {
            anyhow::anyhow!(
                "invalid secret size, expected {}, got {}",
                SECRET_SIZE,
                data.len()
            )
        })?;
        Ok(buff.into())
    }

    pub fn from_hex(hex: &str) -> Result<Self, SecretError> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let mut buff = [0; SECRET_SIZE];
        hex::decode_to_slice(hex, &mut buff)
            .map_err(|_| anyhow::anyhow!("secret hex decode error"))?;
        Ok(buff.into())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn bytes(&self) -> &[u8] {
        self.0.as_ref()
    }

    pub fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, SecretError> {
        let mut nonce = [0u8; NONCE_SIZE];
        getrandom::getrandom(&mut nonce)
            .map_err(|e| anyhow::anyhow!("failed to generate nonce: {}", e))?;

        let ciphertext = self.encrypt_with_nonce(&nonce, data)?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, SecretError> {
        if data.len() < NONCE_SIZE {
            return Err(anyhow::anyhow!("data too short for nonce").into());
        }
        let (nonce, ciphertext) = data.split_at(NONCE_SIZE);
        self.decrypt_with_nonce(nonce, ciphertext)
    }

    /// Encrypt with a caller supplied nonce; the nonce is not prepended.
    ///
    /// Used where the nonce travels separately, as with the `iv` of
    /// classified info handed over by a pairing device.
    pub fn encrypt_with_nonce(&self, nonce: &[u8], data: &[u8]) -> Result<Vec<u8>, SecretError> {
        if nonce.len() != NONCE_SIZE {
            return Err(anyhow::anyhow!("invalid nonce size {}", nonce.len()).into());
        }
        let plaintext_hash = blake3::hash(data);
        let mut data_with_hash = Vec::with_capacity(BLAKE3_HASH_SIZE + data.len());
        data_with_hash.extend_from_slice(plaintext_hash.as_bytes());
        data_with_hash.extend_from_slice(data);

        let cipher = ChaCha20Poly1305::new(Key::from_slice(self.bytes()));
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(nonce), data_with_hash.as_ref())
            .map_err(|_| anyhow::anyhow!("encrypt error"))?;
        Ok(ciphertext)
    }

    pub fn decrypt_with_nonce(&self, nonce: &[u8], data: &[u8]) -> Result<Vec<u8>, SecretError> {
        if nonce.len() != NONCE_SIZE {
            return Err(anyhow::anyhow!("invalid nonce size {}", nonce.len()).into());
        }
        let cipher = ChaCha20Poly1305::new(Key::from_slice(self.bytes()));
        let decrypted = cipher
            .decrypt(Nonce::from_slice(nonce), data)
            .map_err(|_| anyhow::anyhow!("decrypt error"))?;

        if decrypted.len() < BLAKE3_HASH_SIZE {
            return Err(anyhow::anyhow!("decrypted data too short for hash header").into());
        }
        let (stored_hash, plaintext) = decrypted.split_at(BLAKE3_HASH_SIZE);
        if stored_hash != blake3::hash(plaintext).as_bytes() {
            return Err(anyhow::anyhow!("hash verification failed - data corrupted").into());
        }

        Ok(plaintext.to_vec())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_secret_encrypt_decrypt() {
        let secret = Secret::generate();
        let data = b"a private directory header";

        let encrypted = secret.encrypt(data).unwrap();
        assert_ne!(&encrypted[NONCE_SIZE..], data.as_slice());
        let decrypted = secret.decrypt(&encrypted).unwrap();
        assert_eq!(data.as_slice(), decrypted.as_slice());
    }

    #[test]
    fn test_wrong_key_fails() {
        let encrypted = Secret::generate().encrypt(b"payload").unwrap();
        assert!(Secret::generate().decrypt(&encrypted).is_err());
    }

    #[test]
    fn test_detached_nonce() {
        let secret = Secret::generate();
        let iv = [7u8; NONCE_SIZE];
        let ciphertext = secret.encrypt_with_nonce(&iv, b"{\"ucans\":[]}").unwrap();
        let plaintext = secret.decrypt_with_nonce(&iv, &ciphertext).unwrap();
        assert_eq!(plaintext, b"{\"ucans\":[]}");
        assert!(secret.decrypt_with_nonce(&[0u8; 4], &ciphertext).is_err());
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let secret = Secret::generate();
        let mut encrypted = secret.encrypt(b"test data for integrity check").unwrap();
        encrypted[NONCE_SIZE + 10] ^= 0xFF;
        assert!(secret.decrypt(&encrypted).is_err());
    }

    #[test]
    fn test_hex_and_size_validation() {
        let secret = Secret::generate();
        assert_eq!(secret.to_hex().parse::<Secret>().unwrap(), secret);
        assert!(Secret::from_slice(&[1u8; 16]).is_err());
        assert!(Secret::from_slice(&[1u8; SECRET_SIZE]).is_ok());
        assert!(Secret::from_hex("zz").is_err());
    }

    #[test]
    fn test_derive_is_deterministic() {
        let a = Secret::derive("veil test", b"material");
        let b = Secret::derive("veil test", b"material");
        let c = Secret::derive("veil other", b"material");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
