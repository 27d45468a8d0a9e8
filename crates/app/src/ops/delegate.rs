use clap::Args;
use common::auth::LinkingError;

use crate::state::StateError;

/// Producer side of device linking: grant another device full authority
/// over this account and print what it needs to `veil link`
#[derive(Args, Debug, Clone)]
pub struct Delegate {
    /// DID of the device being linked
    #[arg(long)]
    pub audience: String,
}

#[derive(Debug, thiserror::Error)]
pub enum DelegateError {
    #[error("delegate failed: {0}")]
    State(#[from] StateError),
    #[error("delegate failed: {0}")]
    Linking(#[from] LinkingError),
    #[error("delegate failed: {0}")]
    Json(#[from] serde_json::Error),
}

#[async_trait::async_trait]
impl crate::op::Op for Delegate {
    type Error = DelegateError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let username = state.username()?;
        let data = state
            .lobby()
            .await?
            .delegate_account(username, &self.audience)
            .await?;
        Ok(serde_json::to_string_pretty(&data)?)
    }
}
