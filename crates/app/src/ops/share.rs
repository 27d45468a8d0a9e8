use clap::Args;
use common::fs::FsError;
use common::share::{ShareOptions, ShareWith, SharedBy};

use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct Share {
    /// Paths to share in one go
    #[arg(required = true)]
    pub paths: Vec<String>,

    /// Recipient: an exchange DID, or a username whose published exchange
    /// DIDs all receive the share
    #[arg(long)]
    pub with: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ShareError {
    #[error("share failed: {0}")]
    State(#[from] StateError),
    #[error("share failed: {0}")]
    Fs(#[from] FsError),
}

#[async_trait::async_trait]
impl crate::op::Op for Share {
    type Error = ShareError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut state = ctx.state()?;
        let username = state.username()?.to_string();
        let root_did = match state.config.identities.get(&username) {
            Some(did) => did.clone(),
            None => state.load_key()?.did(),
        };

        let (fs, blobs) = state.open_fs().await?;
        let paths: Vec<&str> = self.paths.iter().map(String::as_str).collect();
        let details = fs
            .share(
                &paths,
                ShareOptions {
                    share_with: ShareWith::parse(&self.with),
                    shared_by: SharedBy { root_did, username },
                },
            )
            .await;
        let details = match details {
            Ok(details) => details,
            Err(e) => {
                state.close_fs(blobs).await?;
                return Err(e.into());
            }
        };
        let root = state.save_fs(&fs).await?;
        state.close_fs(blobs).await?;

        Ok(format!(
            "Shared {} with {} as share {} (root {})",
            self.paths.join(", "),
            self.with,
            details.share_id,
            root
        ))
    }
}
