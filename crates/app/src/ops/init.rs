use std::sync::Arc;

use clap::Args;
use common::auth::lobby::USERNAME_STORAGE_KEY;
use common::fs::{FsError, PrivateFs};
use common::store::{KeyValueStore, KeyValueStoreError};

use crate::state::{AppConfig, AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Account name this device creates and acts for. Leave unset on a
    /// device that will be linked to an existing account.
    #[arg(long)]
    pub username: Option<String>,

    /// Default log level written to the config (overridden by RUST_LOG)
    #[arg(long, default_value = "warn")]
    pub log_level: String,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] StateError),
    #[error("init failed: {0}")]
    Fs(#[from] FsError),
    #[error("init failed: {0}")]
    Storage(#[from] KeyValueStoreError),
}

#[async_trait::async_trait]
impl crate::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let config = AppConfig {
            log_level: self.log_level.clone(),
            username: self.username.clone(),
            ..Default::default()
        };
        let mut state = AppState::init(ctx.config_path.clone(), Some(config))?;
        let did = state.load_key()?.did();

        let Some(username) = &self.username else {
            return Ok(format!(
                "Initialized veil directory at: {}\n\
                 - DID: {}\n\
                 Run 'veil delegate --audience {}' on a linked device, then 'veil link'",
                state.veil_dir.display(),
                did,
                did
            ));
        };

        // the first device is the account root and its own exchange key
        state
            .config
            .identities
            .insert(username.clone(), did.clone());

        let blobs = state.blobs().await?;
        let fs = PrivateFs::init(&blobs, Arc::new(state.config.resolver()?)).await?;
        fs.publish_exchange_did(&did).await;
        let root = state.save_fs(&fs).await?;
        state.close_fs(blobs).await?;

        state
            .storage()
            .await?
            .set_item(USERNAME_STORAGE_KEY, username.clone())
            .await?;

        let output = format!(
            "Initialized veil directory at: {}\n\
             - Username: {}\n\
             - DID: {}\n\
             - Key: {}\n\
             - Blobs: {}\n\
             - Storage: {}\n\
             - Config: {}\n\
             - Root: {}",
            state.veil_dir.display(),
            username,
            did,
            state.key_path.display(),
            state.blobs_path.display(),
            state.storage_path.display(),
            state.config_path.display(),
            root
        );

        Ok(output)
    }
}
