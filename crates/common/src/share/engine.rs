use std::sync::Arc;

use futures::future::try_join_all;
use serde::{Deserialize, Serialize};

use crate::crypto::{sealed, KeyError, PublicKey, SealError, SecretError, SecretKey, SymmAlg};
use crate::linked_data::{BlockEncoded, CodecError, Link};
use crate::private::{PrivateIndex, PrivateNode, PrivateNodeError};
use crate::root::{exchange_dids, DataRootResolver, ResolverError, RootTree, RootTreeError, ShareRecord};
use crate::root::BareTree;
use crate::store::{BlobsStore, BlobsStoreError};

use super::entry_index::{self, EntryIndex};
use super::key::ShareKey;
use super::payload::SharePayload;

#[derive(Debug, thiserror::Error)]
pub enum ShareError {
    #[error("share error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("This person doesn't have a filesystem yet.")]
    NoFilesystem,
    #[error("This person's filesystem doesn't have a pretty tree.")]
    NoPrettyTree,
    #[error("no share named {0} in the sender's root")]
    ShareNotFound(ShareKey),
    #[error("cannot share '{0}': it has never been written")]
    UnpersistedItem(String),
    #[error("blobs store error: {0}")]
    Blobs(#[from] BlobsStoreError),
    #[error("private node error: {0}")]
    Node(#[from] PrivateNodeError),
    #[error("root tree error: {0}")]
    Root(#[from] RootTreeError),
    #[error("resolver error: {0}")]
    Resolver(#[from] ResolverError),
    #[error("key error: {0}")]
    Key(#[from] KeyError),
    #[error("seal error: {0}")]
    Seal(#[from] SealError),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("secret error: {0}")]
    Secret(#[from] SecretError),
}

/// Who a share goes to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShareWith {
    /// Explicit exchange DIDs
    Dids(Vec<String>),
    /// Every exchange DID the user publishes
    Username(String),
}

impl ShareWith {
    /// A lone `did:` string is one recipient, anything else a username
    pub fn parse(target: &str) -> Self {
        if target.starts_with("did:") {
            ShareWith::Dids(vec![target.to_string()])
        } else {
            ShareWith::Username(target.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SharedBy {
    pub root_did: String,
    pub username: String,
}

#[derive(Debug, Clone)]
pub struct ShareOptions {
    pub share_with: ShareWith,
    pub shared_by: SharedBy,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareDetails {
    pub share_id: String,
    pub shared_by: SharedBy,
}

#[derive(Debug, Clone)]
pub struct SharingEngine {
    blobs: BlobsStore,
    resolver: Arc<dyn DataRootResolver>,
}

impl SharingEngine {
    pub fn new(blobs: BlobsStore, resolver: Arc<dyn DataRootResolver>) -> Self {
        Self { blobs, resolver }
    }

    /// Share `items` with the recipients in `options`.
    ///
    /// Builds one entry index of soft-links, anchors it in the owner's
    /// private index, seals a pointer to it for every recipient and appends
    /// one share record per recipient to `root`. The share counter is read
    /// but not advanced; the caller owns that.
    ///
    /// `root` is only touched once every record is stored, so an error
    /// leaves it as it was.
    pub async fn share_private_node(
        &self,
        root: &mut RootTree,
        items: &[(String, PrivateNode)],
        options: ShareOptions,
    ) -> Result<ShareDetails, ShareError> {
        let ShareOptions {
            share_with,
            shared_by,
        } = options;

        let recipients = match share_with {
            ShareWith::Dids(dids) => dids,
            ShareWith::Username(username) => self.list_exchange_dids(&username).await?,
        };

        let counter = root.shared_counter();
        let share_keys = recipients
            .into_iter()
            .map(|did| {
                let exchange_key = PublicKey::from_did(&did)?;
                let key = ShareKey::create(counter, &did, &shared_by.root_did);
                Ok((exchange_key, key))
            })
            .collect::<Result<Vec<(PublicKey, ShareKey)>, ShareError>>()?;

        let mut entry_index = EntryIndex::new();
        for (name, item) in items {
            if item.revision() == 0 {
                return Err(ShareError::UnpersistedItem(name.clone()));
            }
            entry_index.insert_soft_link(name, item, &shared_by.username);
        }

        let stored = entry_index.store(&self.blobs).await?;
        let payload =
            SharePayload::new(stored.link, entry_index.key(), SymmAlg::default()).encode()?;

        let records = try_join_all(share_keys.iter().map(|(exchange_key, share_key)| {
            let payload = &payload;
            async move {
                let sealed = sealed::seal(payload, exchange_key)?;
                let put = self.blobs.put(sealed).await?;
                Ok::<_, ShareError>(ShareRecord {
                    name: share_key.clone(),
                    link: put.link,
                    size: put.size,
                })
            }
        }))
        .await?;

        // anchored under the first recipient's share key only
        if let Some((_, first)) = share_keys.first() {
            let name = entry_index::namefilter(entry_index.bare_name_filter(), first);
            root.index.add(name, stored.link);
        }

        tracing::info!(
            "shared {} item(s) with {} recipient(s) under counter {}",
            items.len(),
            records.len(),
            counter
        );
        root.add_shares(records);

        Ok(ShareDetails {
            share_id: counter.to_string(),
            shared_by,
        })
    }

    /// Exchange DIDs `username` publishes under `.well-known/exchange`
    pub async fn list_exchange_dids(&self, username: &str) -> Result<Vec<String>, ShareError> {
        let root = self
            .resolver
            .lookup(username)
            .await?
            .ok_or(ShareError::NoFilesystem)?;
        let header = RootTree::load_header(&root, &self.blobs).await?;
        let pretty = header.pretty.ok_or(ShareError::NoPrettyTree)?;
        let tree = BareTree::load(pretty, self.blobs.clone()).await?;
        Ok(exchange_dids(Some(&tree)))
    }

    /// Open a sealed share and resolve its soft-links in the owner's index
    pub async fn accept_share(
        &self,
        record: &Link,
        exchange_key: &SecretKey,
        owner_index: &PrivateIndex,
    ) -> Result<Vec<(String, PrivateNode)>, ShareError> {
        let sealed = self.blobs.get(record).await?;
        let payload = SharePayload::decode(&sealed::open(&sealed, exchange_key)?)?;
        let entry_index =
            EntryIndex::load(&payload.entry_index_cid, &payload.key()?, &self.blobs).await?;

        let resolved = try_join_all(entry_index.soft_links().into_iter().map(|link| async move {
            let node =
                PrivateNode::load(&link.key, &link.bare_name_filter, 1, owner_index, &self.blobs)
                    .await?;
            Ok::<_, ShareError>((link.name, node))
        }))
        .await?;
        Ok(resolved)
    }

    /// Recipient side end to end: find the sender's root, recompute the
    /// share key for `counter` and accept the matching share
    pub async fn receive_share(
        &self,
        sender_username: &str,
        sender_root_did: &str,
        counter: u64,
        exchange_key: &SecretKey,
    ) -> Result<Vec<(String, PrivateNode)>, ShareError> {
        let root_link = self
            .resolver
            .lookup(sender_username)
            .await?
            .ok_or(ShareError::NoFilesystem)?;
        let root = RootTree::load(&root_link, &self.blobs).await?;

        let share_key = ShareKey::create(counter, &exchange_key.did(), sender_root_did);
        let record = root
            .find_share(&share_key)
            .ok_or_else(|| ShareError::ShareNotFound(share_key.clone()))?;
        self.accept_share(&record.link, exchange_key, &root.index).await
    }
}
