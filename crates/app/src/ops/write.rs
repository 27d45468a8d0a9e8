use std::path::PathBuf;

use clap::Args;
use common::fs::FsError;

use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct Write {
    /// Path inside the private filesystem
    pub path: String,

    /// Inline content to write
    #[arg(long, conflicts_with = "file")]
    pub content: Option<String>,

    /// Local file whose bytes are written
    #[arg(long)]
    pub file: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("write failed: {0}")]
    State(#[from] StateError),
    #[error("write failed: {0}")]
    Fs(#[from] FsError),
    #[error("failed to read {0}: {1}")]
    Source(PathBuf, std::io::Error),
    #[error("either --content or --file is required")]
    NoContent,
}

#[async_trait::async_trait]
impl crate::op::Op for Write {
    type Error = WriteError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let content = match (&self.content, &self.file) {
            (Some(content), _) => content.as_bytes().to_vec(),
            (None, Some(file)) => {
                std::fs::read(file).map_err(|e| WriteError::Source(file.clone(), e))?
            }
            (None, None) => return Err(WriteError::NoContent),
        };

        let mut state = ctx.state()?;
        let (fs, blobs) = state.open_fs().await?;
        fs.write(&self.path, &content).await?;
        let root = state.save_fs(&fs).await?;
        state.close_fs(blobs).await?;

        Ok(format!(
            "Wrote {} bytes to {} (root {})",
            content.len(),
            self.path,
            root
        ))
    }
}
