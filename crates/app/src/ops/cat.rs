use clap::Args;
use common::fs::FsError;

use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct Cat {
    /// Path of the file to print
    pub path: String,
}

#[derive(Debug, thiserror::Error)]
pub enum CatError {
    #[error("cat failed: {0}")]
    State(#[from] StateError),
    #[error("cat failed: {0}")]
    Fs(#[from] FsError),
}

#[async_trait::async_trait]
impl crate::op::Op for Cat {
    type Error = CatError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let state = ctx.state()?;
        let (fs, blobs) = state.open_fs().await?;
        let content = fs.read(&self.path).await;
        state.close_fs(blobs).await?;
        Ok(String::from_utf8_lossy(&content?).into_owned())
    }
}
