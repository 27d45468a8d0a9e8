//! Wrapping a [`Secret`] for a single recipient with ECDH + AES Key Wrap.
//!
//! A pairing device uses this to hand over the session key that protects
//! classified info: the sender generates an ephemeral keypair, agrees on a
//! shared secret with the recipient's X25519 form, and AES-KW wraps the
//! session key with it.

use std::fmt;
use std::str::FromStr;

use aes_kw::KekAes256 as Kek;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::keys::{KeyError, PublicKey, SecretKey, PUBLIC_KEY_SIZE};
use super::secret::{Secret, SECRET_SIZE};

/// AES-KW integrity check block
pub const KW_NONCE_SIZE: usize = 8;
/// ephemeral_pubkey (32) || wrapped_secret (40)
pub const SECRET_SHARE_SIZE: usize = PUBLIC_KEY_SIZE + SECRET_SIZE + KW_NONCE_SIZE;

#[derive(Debug, thiserror::Error)]
pub enum SecretShareError {
    #[error("share error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("key error: {0}")]
    Key(#[from] KeyError),
}

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SecretShare([u8; SECRET_SHARE_SIZE]);

impl fmt::Debug for SecretShare {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretShare({})", self.to_hex())
    }
}

// hex keeps the share readable inside JSON transports
impl Serialize for SecretShare {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for SecretShare {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let hex = String::deserialize(deserializer)?;
        SecretShare::from_hex(&hex).map_err(serde::de::Error::custom)
    }
}

impl FromStr for SecretShare {
    type Err = SecretShareError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SecretShare::from_hex(s)
    }
}

impl SecretShare {
    pub fn from_hex(hex: &str) -> Result<Self, SecretShareError> {
        let hex = hex.strip_prefix("0x").unwrap_or(hex);
        let mut buff = [0; SECRET_SHARE_SIZE];
        hex::decode_to_slice(hex, &mut buff)
            .map_err(|_| anyhow::anyhow!("share hex decode error"))?;
        Ok(SecretShare(buff))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn new(secret: &Secret, recipient: &PublicKey) -> Result<Self, SecretShareError> {
        let ephemeral = SecretKey::generate();
        let shared = ephemeral
            .to_x25519()
            .diffie_hellman(&recipient.to_x25519()?);

        let wrapped = Kek::from(*shared.as_bytes())
            .wrap_vec(secret.bytes())
            .map_err(|_| anyhow::anyhow!("AES-KW wrap error"))?;
        if wrapped.len() != SECRET_SIZE + KW_NONCE_SIZE {
            return Err(anyhow::anyhow!("unexpected wrapped key size {}", wrapped.len()).into());
        }

        let mut share = [0; SECRET_SHARE_SIZE];
        share[..PUBLIC_KEY_SIZE].copy_from_slice(&ephemeral.public().to_bytes());
        share[PUBLIC_KEY_SIZE..].copy_from_slice(&wrapped);
        Ok(SecretShare(share))
    }

    pub fn recover(&self, recipient: &SecretKey) -> Result<Secret, SecretShareError> {
        let ephemeral = PublicKey::try_from(&self.0[..PUBLIC_KEY_SIZE])?;
        let shared = recipient.to_x25519().diffie_hellman(&ephemeral.to_x25519()?);

        let unwrapped = Kek::from(*shared.as_bytes())
            .unwrap_vec(&self.0[PUBLIC_KEY_SIZE..])
            .map_err(|_| anyhow::anyhow!("AES-KW unwrap error"))?;

        Secret::from_slice(&unwrapped)
            .map_err(|e| anyhow::anyhow!("unwrapped secret invalid: {}", e).into())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_share_recover() {
        let secret = Secret::generate();
        let bob = SecretKey::generate();
        let share = SecretShare::new(&secret, &bob.public()).unwrap();
        assert_eq!(share.recover(&bob).unwrap(), secret);

        let mallory = SecretKey::generate();
        assert!(share.recover(&mallory).is_err());
    }

    #[test]
    fn test_share_json_is_hex() {
        let bob = SecretKey::generate();
        let share = SecretShare::new(&Secret::generate(), &bob.public()).unwrap();
        let json = serde_json::to_string(&share).unwrap();
        assert_eq!(json, format!("\"{}\"", share.to_hex()));
        let back: SecretShare = serde_json::from_str(&json).unwrap();
        assert_eq!(back, share);
    }

    #[test]
    fn test_share_rejects_bad_length() {
        assert!(SecretShare::from_hex("00ff").is_err());
    }
}
