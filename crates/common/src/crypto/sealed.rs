//! Sealed boxes: encrypt an arbitrary payload to a recipient's exchange key.
//!
//! `seal` agrees on a shared secret between a fresh ephemeral key and the
//! recipient, derives a [`Secret`] from it and encrypts the payload.
//! Layout: `ephemeral_pubkey (32) || Secret::encrypt(payload)`.

use super::keys::{KeyError, PublicKey, SecretKey, PUBLIC_KEY_SIZE};
use super::secret::{Secret, SecretError};

const SEAL_CONTEXT: &str = "veil 2024-01 sealed payload v1";

#[derive(Debug, thiserror::Error)]
pub enum SealError {
    #[error("sealed payload too short: {0} bytes")]
    TooShort(usize),
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    #[error("secret error: {0}")]
    Secret(#[from] SecretError),
}

fn payload_key(shared: &[u8; 32], ephemeral: &PublicKey, recipient: &PublicKey) -> Secret {
    let mut material = Vec::with_capacity(3 * PUBLIC_KEY_SIZE);
    material.extend_from_slice(shared);
    material.extend_from_slice(&ephemeral.to_bytes());
    material.extend_from_slice(&recipient.to_bytes());
    Secret::derive(SEAL_CONTEXT, &material)
}

pub fn seal(data: &[u8], recipient: &PublicKey) -> Result<Vec<u8>, SealError> {
    let ephemeral = SecretKey::generate();
    let ephemeral_public = ephemeral.public();
    let shared = ephemeral.to_x25519().diffie_hellman(&recipient.to_x25519()?);

    let key = payload_key(shared.as_bytes(), &ephemeral_public, recipient);
    let ciphertext = key.encrypt(data)?;

    let mut out = Vec::with_capacity(PUBLIC_KEY_SIZE + ciphertext.len());
    out.extend_from_slice(&ephemeral_public.to_bytes());
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

pub fn open(data: &[u8], recipient: &SecretKey) -> Result<Vec<u8>, SealError> {
    if data.len() <= PUBLIC_KEY_SIZE {
        return Err(SealError::TooShort(data.len()));
    }
    let (ephemeral, ciphertext) = data.split_at(PUBLIC_KEY_SIZE);
    let ephemeral = PublicKey::try_from(ephemeral)?;
    let shared = recipient.to_x25519().diffie_hellman(&ephemeral.to_x25519()?);

    let key = payload_key(shared.as_bytes(), &ephemeral, &recipient.public());
    Ok(key.decrypt(ciphertext)?)
}
