use std::path::PathBuf;

use clap::Args;
use common::auth::lobby::USERNAME_STORAGE_KEY;
use common::auth::{LinkingData, LinkingError};
use common::store::{KeyValueStore, KeyValueStoreError};
use common::ucan::{self, TokenError};

use crate::state::StateError;

/// Consumer side of device linking: accept a producer's grant
#[derive(Args, Debug, Clone)]
pub struct Link {
    /// Account the grant is for
    #[arg(long)]
    pub username: String,

    /// Linking data as printed by `veil delegate`
    #[arg(conflicts_with = "file")]
    pub data: Option<String>,

    /// Read the linking data from a file instead
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Link to the account's published root tree
    #[arg(long)]
    pub data_root: Option<common::linked_data::Link>,
}

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("link failed: {0}")]
    State(#[from] StateError),
    #[error("link failed: {0}")]
    Linking(#[from] LinkingError),
    #[error("link failed: {0}")]
    Token(#[from] TokenError),
    #[error("link failed: {0}")]
    Storage(#[from] KeyValueStoreError),
    #[error("invalid linking data: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to read {0}: {1}")]
    Source(PathBuf, std::io::Error),
    #[error("either linking data or --file is required")]
    NoData,
}

#[async_trait::async_trait]
impl crate::op::Op for Link {
    type Error = LinkError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let raw = match (&self.data, &self.file) {
            (Some(data), _) => data.clone(),
            (None, Some(file)) => {
                std::fs::read_to_string(file).map_err(|e| LinkError::Source(file.clone(), e))?
            }
            (None, None) => return Err(LinkError::NoData),
        };
        let value: serde_json::Value = serde_json::from_str(&raw)?;

        let mut state = ctx.state()?;

        let lobby = state.lobby().await?;
        lobby.link_device(&value).await?;

        // the chain's root issuer is the account root
        let data: LinkingData = serde_json::from_value(value)?;
        let root_did = ucan::root_issuer(&data.ucan)?;

        state.config.username = Some(self.username.clone());
        state
            .config
            .identities
            .insert(self.username.clone(), root_did.clone());
        if let Some(root) = &self.data_root {
            state
                .config
                .data_roots
                .insert(self.username.clone(), root.to_string());
        }
        state.save_config()?;
        lobby
            .storage()
            .set_item(USERNAME_STORAGE_KEY, self.username.clone())
            .await?;

        Ok(format!(
            "Linked device {} to {} (root {})",
            lobby.did(),
            self.username,
            root_did
        ))
    }
}
