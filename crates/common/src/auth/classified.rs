//! Credentials handed from an authenticated device to a new one.
//!
//! The producer wraps a fresh session key for the consumer's device key,
//! encrypts the secrets with it under a separately transported nonce and
//! ships the three strings over whatever channel connects the devices.

use std::collections::BTreeMap;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::crypto::{PublicKey, Secret, SecretKey, SecretShare, NONCE_SIZE};

use super::lobby::LinkingError;

/// Raw transport the consumer polls for classified info
#[async_trait]
pub trait SecretExchangeChannel: Send + Sync {
    async fn receive(&self) -> Result<serde_json::Value, LinkingError>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FsSecret {
    /// Hex encoded read key
    pub key: String,
    /// Hex encoded bare name filter
    pub bare_name_filter: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedSecrets {
    /// Keyed by posix path
    pub fs: BTreeMap<String, FsSecret>,
    #[serde(default)]
    pub ucans: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedInfo {
    pub session_key: SecretShare,
    /// Base64 ciphertext of the JSON encoded [`ClassifiedSecrets`]
    pub secrets: String,
    /// Hex encoded nonce
    pub iv: String,
}

impl ClassifiedInfo {
    pub fn parse(value: &serde_json::Value) -> Result<Self, LinkingError> {
        serde_json::from_value(value.clone())
            .map_err(|_| LinkingError::InvalidClassifiedInfo(value.to_string()))
    }

    /// Producer side: encrypt `secrets` for `device`
    pub fn seal(secrets: &ClassifiedSecrets, device: &PublicKey) -> Result<Self, LinkingError> {
        let session_key = Secret::generate();
        let mut iv = [0u8; NONCE_SIZE];
        getrandom::getrandom(&mut iv)
            .map_err(|e| anyhow::anyhow!("failed to generate iv: {}", e))?;

        let plaintext = serde_json::to_vec(secrets)
            .map_err(|e| anyhow::anyhow!("failed to serialize secrets: {}", e))?;
        let ciphertext = session_key.encrypt_with_nonce(&iv, &plaintext)?;

        Ok(Self {
            session_key: SecretShare::new(&session_key, device)?,
            secrets: STANDARD.encode(ciphertext),
            iv: hex::encode(iv),
        })
    }

    /// Consumer side: unwrap the session key and decrypt the secrets
    pub fn open(&self, device: &SecretKey) -> Result<ClassifiedSecrets, LinkingError> {
        let session_key = self.session_key.recover(device)?;
        let iv = hex::decode(&self.iv).map_err(|e| anyhow::anyhow!("invalid iv: {}", e))?;
        let ciphertext = STANDARD
            .decode(&self.secrets)
            .map_err(|e| anyhow::anyhow!("invalid secrets encoding: {}", e))?;
        let plaintext = session_key.decrypt_with_nonce(&iv, &ciphertext)?;
        serde_json::from_slice(&plaintext)
            .map_err(|e| anyhow::anyhow!("invalid secrets payload: {}", e).into())
    }
}
