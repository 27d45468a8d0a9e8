use clap::Args;
use common::fs::FsError;
use common::private::PrivateLink;

use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct Ls {
    /// Directory to list
    #[arg(default_value = "/")]
    pub path: String,
}

#[derive(Debug, thiserror::Error)]
pub enum LsError {
    #[error("ls failed: {0}")]
    State(#[from] StateError),
    #[error("ls failed: {0}")]
    Fs(#[from] FsError),
}

#[async_trait::async_trait]
impl crate::op::Op for Ls {
    type Error = LsError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let (fs, blobs) = state.open_fs().await?;
        let entries = fs.ls(&self.path).await;
        state.close_fs(blobs).await?;
        let entries = entries?;
        if entries.is_empty() {
            return Ok(format!("{} is empty", self.path));
        }

        let lines: Vec<String> = entries
            .into_iter()
            .map(|(name, link)| match link {
                PrivateLink::Child(child) if !child.is_file => format!("{}/", name),
                PrivateLink::Child(_) => name,
                PrivateLink::SoftLink(soft) => format!("{} -> {}", name, soft.username),
            })
            .collect();
        Ok(lines.join("\n"))
    }
}
