use clap::Args;
use common::crypto::SecretKey;
use common::fs::PrivateFs;
use common::linked_data::Link;
use common::private::{PrivateNode, PrivateNodeError};
use common::share::ShareError;
use common::store::BlobsStore;

use crate::state::StateError;

#[derive(Args, Debug, Clone)]
pub struct Receive {
    /// Username of the sender
    #[arg(long)]
    pub from: String,

    /// Share counter the sender reported
    #[arg(long)]
    pub counter: u64,

    /// Sender's root DID, remembered for later receives
    #[arg(long)]
    pub root_did: Option<String>,

    /// Link to the sender's published root tree, remembered for later receives
    #[arg(long)]
    pub data_root: Option<Link>,
}

#[derive(Debug, thiserror::Error)]
pub enum ReceiveError {
    #[error("receive failed: {0}")]
    State(#[from] StateError),
    #[error("receive failed: {0}")]
    Share(#[from] ShareError),
    #[error("receive failed: {0}")]
    Node(#[from] PrivateNodeError),
    #[error("unknown sender {0}: pass --root-did")]
    UnknownSender(String),
}

#[async_trait::async_trait]
impl crate::op::Op for Receive {
    type Error = ReceiveError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut state = ctx.state()?;
        if let Some(did) = &self.root_did {
            state.config.identities.insert(self.from.clone(), did.clone());
        }
        if let Some(link) = &self.data_root {
            state
                .config
                .data_roots
                .insert(self.from.clone(), link.to_string());
        }
        if self.root_did.is_some() || self.data_root.is_some() {
            state.save_config()?;
        }

        let sender_root_did = state
            .config
            .identities
            .get(&self.from)
            .cloned()
            .ok_or_else(|| ReceiveError::UnknownSender(self.from.clone()))?;

        let exchange_key = state.load_key()?;
        let (fs, blobs) = state.open_fs().await?;
        let listed = describe(&fs, &blobs, self, &sender_root_did, &exchange_key).await;
        state.close_fs(blobs).await?;
        let lines = listed?;

        Ok(lines.join("\n"))
    }
}

async fn describe(
    fs: &PrivateFs,
    blobs: &BlobsStore,
    op: &Receive,
    sender_root_did: &str,
    exchange_key: &SecretKey,
) -> Result<Vec<String>, ReceiveError> {
    let received = fs
        .sharing()
        .receive_share(&op.from, sender_root_did, op.counter, exchange_key)
        .await?;

    let mut lines = vec![format!("Received share {} from {}:", op.counter, op.from)];
    for (name, node) in received {
        match node {
            PrivateNode::File(file) => {
                let size = file.read(blobs).await?.len();
                lines.push(format!("  {} ({} bytes)", name, size));
            }
            PrivateNode::Directory(dir) => {
                lines.push(format!("  {}/ ({} entries)", name, dir.ls().len()));
            }
        }
    }
    Ok(lines)
}
