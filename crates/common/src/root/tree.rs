use serde::{Deserialize, Serialize};

use crate::linked_data::{BlockEncoded, DagCborCodec, Link};
use crate::private::{PrivateIndex, PrivateIndexError};
use crate::share::ShareKey;
use crate::store::{BlobsStore, BlobsStoreError};
use crate::version::{Version, LATEST};

use super::bare::{BareNode, BareTree};

/// Public path under which exchange DIDs are published
pub const EXCHANGE_PATH: [&str; 2] = [".well-known", "exchange"];

#[derive(Debug, thiserror::Error)]
pub enum RootTreeError {
    #[error("root tree error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("blobs store error: {0}")]
    Blobs(#[from] BlobsStoreError),
    #[error("private index error: {0}")]
    Index(#[from] PrivateIndexError),
    #[error("unsupported root version {0}")]
    UnsupportedVersion(Version),
}

/// A published share: one per recipient per sharing operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareRecord {
    pub name: ShareKey,
    pub link: Link,
    pub size: u64,
}

/// Stored form of a root tree
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootHeader {
    pub private: Link,
    pub pretty: Option<Link>,
    pub shared_counter: Option<u64>,
    pub shares: Vec<ShareRecord>,
    pub version: Version,
}

impl BlockEncoded<DagCborCodec> for RootHeader {}

/// Per-identity aggregate: the private index, the public tree, the share
/// counter and the append-only list of published shares.
#[derive(Debug, Clone, Default)]
pub struct RootTree {
    pub index: PrivateIndex,
    pub pretty: Option<BareTree>,
    shared_counter: Option<u64>,
    shares: Vec<ShareRecord>,
}

impl RootTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counter for the next share; 1 until one has been recorded
    pub fn shared_counter(&self) -> u64 {
        self.shared_counter.unwrap_or(1)
    }

    /// Advance the counter past the value just used; it never moves back
    pub fn bump_shared_counter(&mut self) -> u64 {
        let next = self.shared_counter() + 1;
        self.shared_counter = Some(next);
        next
    }

    pub fn add_shares(&mut self, records: impl IntoIterator<Item = ShareRecord>) {
        self.shares.extend(records);
    }

    pub fn shares(&self) -> &[ShareRecord] {
        &self.shares
    }

    pub fn find_share(&self, name: &ShareKey) -> Option<&ShareRecord> {
        self.shares.iter().find(|record| &record.name == name)
    }

    /// List `did` under `.well-known/exchange` in the public tree
    pub fn publish_exchange_did(&mut self, did: &str) {
        let mut path = EXCHANGE_PATH.to_vec();
        path.push(did);
        self.pretty.get_or_insert_with(BareTree::new).mkdir(&path);
    }

    pub fn exchange_dids(&self) -> Vec<String> {
        exchange_dids(self.pretty.as_ref())
    }

    pub async fn persist(&self, blobs: &BlobsStore) -> Result<Link, RootTreeError> {
        let private = self.index.persist(blobs).await?;
        let pretty = match &self.pretty {
            Some(tree) => Some(tree.persist(blobs).await?),
            None => None,
        };
        let header = RootHeader {
            private,
            pretty,
            shared_counter: self.shared_counter,
            shares: self.shares.clone(),
            version: LATEST,
        };
        let link = blobs.put_cbor(&header).await?.link;
        tracing::debug!(
            "persisted root tree {} ({} index entries, {} shares)",
            link,
            self.index.len(),
            self.shares.len()
        );
        Ok(link)
    }

    pub async fn load_header(link: &Link, blobs: &BlobsStore) -> Result<RootHeader, RootTreeError> {
        let header: RootHeader = blobs.get_cbor(link).await?;
        if !header.version.is_supported() {
            return Err(RootTreeError::UnsupportedVersion(header.version));
        }
        Ok(header)
    }

    pub async fn load(link: &Link, blobs: &BlobsStore) -> Result<Self, RootTreeError> {
        let header = Self::load_header(link, blobs).await?;
        let index = PrivateIndex::load(&header.private, blobs).await?;
        let pretty = match header.pretty {
            Some(pretty) => Some(BareTree::load(pretty, blobs.clone()).await?),
            None => None,
        };
        Ok(Self {
            index,
            pretty,
            shared_counter: header.shared_counter,
            shares: header.shares,
        })
    }
}

/// Names listed under the exchange path of a public tree
pub fn exchange_dids(pretty: Option<&BareTree>) -> Vec<String> {
    match pretty.and_then(|tree| tree.get(&EXCHANGE_PATH)) {
        Some(BareNode::Tree(exchange)) => exchange.names(),
        _ => Vec::new(),
    }
}
