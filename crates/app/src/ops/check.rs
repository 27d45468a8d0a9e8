use clap::Args;

use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct Check {
    /// Account to check (defaults to the configured username)
    #[arg(long)]
    pub username: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("check failed: {0}")]
    State(#[from] StateError),
}

#[async_trait::async_trait]
impl crate::op::Op for Check {
    type Error = CheckError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let username = match &self.username {
            Some(username) => username.clone(),
            None => state.username()?.to_string(),
        };

        let lobby = state.lobby().await?;
        let capable = lobby.check_capability(&username).await;
        Ok(format!(
            "{} {} act for {}",
            lobby.did(),
            if capable { "can" } else { "cannot" },
            username
        ))
    }
}
