use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::crypto::{SecretError, SecretKey, SecretShareError};
use crate::retry::{retry, RetryError, RetryOptions};
use crate::root::{DidResolver, ResolverError};
use crate::store::{KeyValueStore, KeyValueStoreError};
use crate::ucan::{self, BuildParams, Potency, TokenError};

use super::classified::{ClassifiedInfo, SecretExchangeChannel};
use super::identifiers;

pub const READ_KEY_STORAGE_KEY: &str = "readKey";
pub const UCAN_STORAGE_KEY: &str = "ucan";
pub const UCANS_STORAGE_KEY: &str = "ucans";
pub const USERNAME_STORAGE_KEY: &str = "username";

/// Lifetime of a device delegation: a thousand 360 day years
pub const DELEGATION_LIFETIME_SECS: i64 = 60 * 60 * 24 * 30 * 12 * 1000;

pub const CLASSIFIED_INFO_TRIES: u32 = 10;
pub const CLASSIFIED_INFO_TIMEOUT: Duration = Duration::from_secs(10);
pub const CLASSIFIED_INFO_TIMEOUT_MESSAGE: &str =
    "Trying to retrieve UCAN(s) and readKey(s) from the auth lobby timed out after 10 seconds.";

#[derive(Debug, thiserror::Error)]
pub enum LinkingError {
    #[error("linking error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("Consumer received invalid link device response from producer: Expected read key and ucan, but got {0}")]
    InvalidResponse(String),
    #[error("Consumer received invalid link device response from producer. Given ucan is invalid: {0}")]
    InvalidUcan(String),
    #[error("invalid classified info: {0}")]
    InvalidClassifiedInfo(String),
    #[error("no read key stored on this device")]
    MissingReadKey,
    #[error("{0}")]
    Timeout(String),
    #[error("storage error: {0}")]
    Storage(#[from] KeyValueStoreError),
    #[error("token error: {0}")]
    Token(#[from] TokenError),
    #[error("resolver error: {0}")]
    Resolver(#[from] ResolverError),
    #[error("secret error: {0}")]
    Secret(#[from] SecretError),
    #[error("secret share error: {0}")]
    SecretShare(#[from] SecretShareError),
}

/// What a producer hands a consumer to link it to the account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkingData {
    pub read_key: String,
    pub ucan: String,
}

/// Device side of account linking.
///
/// Holds this device's signing identity, its persisted credential storage
/// and a way to look up the root DID an account publishes.
#[derive(Debug, Clone)]
pub struct Lobby {
    storage: Arc<dyn KeyValueStore>,
    identity: SecretKey,
    dids: Arc<dyn DidResolver>,
}

impl Lobby {
    pub fn new(
        storage: Arc<dyn KeyValueStore>,
        identity: SecretKey,
        dids: Arc<dyn DidResolver>,
    ) -> Self {
        Self {
            storage,
            identity,
            dids,
        }
    }

    pub fn did(&self) -> String {
        self.identity.did()
    }

    pub fn storage(&self) -> &Arc<dyn KeyValueStore> {
        &self.storage
    }

    /// Consumer: adopt the credentials a producer sent. Nothing is written
    /// unless the token validates, and both entries are written together.
    pub async fn link_device(&self, data: &serde_json::Value) -> Result<(), LinkingError> {
        let linking: LinkingData = serde_json::from_value(data.clone())
            .map_err(|_| LinkingError::InvalidResponse(data.to_string()))?;

        let valid = match ucan::decode(&linking.ucan) {
            Ok(token) => ucan::is_valid(&token),
            Err(e) => {
                tracing::warn!("failed to decode linking token: {}", e);
                false
            }
        };
        if !valid {
            return Err(LinkingError::InvalidUcan(linking.ucan));
        }

        self.storage
            .set_items(vec![
                (READ_KEY_STORAGE_KEY.to_string(), linking.read_key),
                (UCAN_STORAGE_KEY.to_string(), linking.ucan),
            ])
            .await?;
        tracing::info!("linked device {} to account", self.did());
        Ok(())
    }

    /// Producer: delegate full authority to `audience`, chained onto the
    /// token this device holds (if any), and pair it with the read key
    pub async fn delegate_account(
        &self,
        username: &str,
        audience: &str,
    ) -> Result<LinkingData, LinkingError> {
        let proof = self.storage.get_item(UCAN_STORAGE_KEY).await?;
        let read_key = self
            .storage
            .get_item(READ_KEY_STORAGE_KEY)
            .await?
            .ok_or(LinkingError::MissingReadKey)?;

        let token = ucan::build(BuildParams {
            issuer: &self.identity,
            audience: audience.to_string(),
            potency: Some(Potency::SuperUser),
            lifetime_in_seconds: DELEGATION_LIFETIME_SECS,
            proof,
        })?;
        tracing::info!("delegated account {} to {}", username, audience);

        Ok(LinkingData {
            read_key,
            ucan: token.encode(),
        })
    }

    /// Whether this device's credentials act for `username`. Any missing
    /// piece or lookup failure is a plain `false`.
    pub async fn check_capability(&self, username: &str) -> bool {
        match self.try_check_capability(username).await {
            Ok(capable) => capable,
            Err(e) => {
                tracing::warn!("capability check for {} failed: {}", username, e);
                false
            }
        }
    }

    async fn try_check_capability(&self, username: &str) -> Result<bool, LinkingError> {
        if self.storage.get_item(READ_KEY_STORAGE_KEY).await?.is_none() {
            return Ok(false);
        }
        let Some(published) = self.dids.root_did(username).await? else {
            return Ok(false);
        };

        match self.storage.get_item(UCAN_STORAGE_KEY).await? {
            Some(encoded) => {
                let token = ucan::decode(&encoded)?;
                Ok(ucan::root_issuer(&encoded)? == published
                    && token.potency() == Some(Potency::SuperUser))
            }
            None => Ok(self.did() == published),
        }
    }

    /// Store per-path read keys and name filters, then the tokens
    pub async fn import_classified_info(&self, info: &ClassifiedInfo) -> Result<(), LinkingError> {
        let secrets = info.open(&self.identity)?;

        let mut items = Vec::with_capacity(secrets.fs.len() * 2 + 1);
        for (path, secret) in &secrets.fs {
            items.push((identifiers::read_key(path), secret.key.clone()));
            items.push((
                identifiers::bare_name_filter(path),
                secret.bare_name_filter.clone(),
            ));
        }
        let ucans = serde_json::to_string(&secrets.ucans)
            .map_err(|e| anyhow::anyhow!("failed to serialize ucans: {}", e))?;
        items.push((UCANS_STORAGE_KEY.to_string(), ucans));

        self.storage.set_items(items).await?;
        tracing::info!(
            "imported {} path secret(s) and {} ucan(s)",
            secrets.fs.len(),
            secrets.ucans.len()
        );
        Ok(())
    }

    /// Poll `channel` for classified info and import it, giving up after
    /// ten tries or ten seconds, then remember `username`
    pub async fn retrieve_classified_info(
        &self,
        channel: &dyn SecretExchangeChannel,
        username: &str,
    ) -> Result<(), LinkingError> {
        let options = RetryOptions {
            tries: CLASSIFIED_INFO_TRIES,
            timeout: CLASSIFIED_INFO_TIMEOUT,
            timeout_message: CLASSIFIED_INFO_TIMEOUT_MESSAGE.to_string(),
        };

        retry(
            move || async move {
                let value = channel.receive().await?;
                let info = ClassifiedInfo::parse(&value)?;
                self.import_classified_info(&info).await
            },
            &options,
        )
        .await
        .map_err(|e| match e {
            RetryError::Timeout(message) => LinkingError::Timeout(message),
            RetryError::Exhausted(e) => e,
            RetryError::NoAttempts => anyhow::anyhow!("no attempts made").into(),
        })?;

        self.storage.set_item(USERNAME_STORAGE_KEY, username.to_string()).await?;
        Ok(())
    }

    pub async fn read_key_for(&self, path: &str) -> Result<Option<String>, LinkingError> {
        Ok(self.storage.get_item(&identifiers::read_key(path)).await?)
    }

    pub async fn bare_name_filter_for(&self, path: &str) -> Result<Option<String>, LinkingError> {
        Ok(self
            .storage
            .get_item(&identifiers::bare_name_filter(path))
            .await?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::root::MemoryResolver;
    use crate::store::MemoryKeyValueStore;

    fn lobby(identity: SecretKey, resolver: &MemoryResolver) -> Lobby {
        Lobby::new(
            Arc::new(MemoryKeyValueStore::new()),
            identity,
            Arc::new(resolver.clone()),
        )
    }

    #[tokio::test]
    async fn test_link_device_rejects_wrong_shape() {
        let lobby = lobby(SecretKey::generate(), &MemoryResolver::new());
        let err = lobby
            .link_device(&serde_json::json!({ "readKey": "k" }))
            .await
            .unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Consumer received invalid link device response from producer: Expected read key and ucan, but got"));
    }

    #[tokio::test]
    async fn test_check_capability_without_token_uses_device_did() {
        let identity = SecretKey::generate();
        let resolver = MemoryResolver::new();
        let lobby = lobby(identity.clone(), &resolver);

        // no read key yet
        resolver.set_root_did("alice", &identity.did()).unwrap();
        assert!(!lobby.check_capability("alice").await);

        lobby
            .storage()
            .set_item(READ_KEY_STORAGE_KEY, "key".to_string())
            .await
            .unwrap();
        assert!(lobby.check_capability("alice").await);
        assert!(!lobby.check_capability("bob").await);
    }

    #[tokio::test]
    async fn test_check_capability_with_token_requires_super_user() {
        let root = SecretKey::generate();
        let device = SecretKey::generate();
        let resolver = MemoryResolver::new();
        resolver.set_root_did("alice", &root.did()).unwrap();
        let lobby = lobby(device.clone(), &resolver);

        for (potency, expected) in [(Potency::Overwrite, false), (Potency::SuperUser, true)] {
            let token = ucan::build(BuildParams {
                issuer: &root,
                audience: device.did(),
                potency: Some(potency),
                lifetime_in_seconds: 60,
                proof: None,
            })
            .unwrap();
            lobby
                .storage()
                .set_items(vec![
                    (READ_KEY_STORAGE_KEY.to_string(), "key".to_string()),
                    (UCAN_STORAGE_KEY.to_string(), token.encode()),
                ])
                .await
                .unwrap();
            assert_eq!(lobby.check_capability("alice").await, expected);
        }
    }

    #[tokio::test]
    async fn test_delegate_requires_read_key() {
        let lobby = lobby(SecretKey::generate(), &MemoryResolver::new());
        assert!(matches!(
            lobby.delegate_account("alice", "did:key:z6MkConsumer").await,
            Err(LinkingError::MissingReadKey)
        ));
    }
}
