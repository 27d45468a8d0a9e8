use std::collections::BTreeMap;

use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use serde::{Deserialize, Serialize};

use crate::linked_data::{BlockEncoded, DagCborCodec, Link};
use crate::store::{BlobsStore, BlobsStoreError};

/// An entry of the public tree
#[derive(Debug, Clone, PartialEq)]
pub enum BareNode {
    Tree(BareTree),
    File(Link),
}

/// The public ("pretty") tree: plain named links, no encryption.
///
/// Other users read it to discover what an identity publishes, most
/// importantly the exchange keys under `.well-known/exchange`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BareTree {
    entries: BTreeMap<String, BareNode>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BareLink {
    link: Link,
    is_file: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct BareBlock {
    links: BTreeMap<String, BareLink>,
}

impl BlockEncoded<DagCborCodec> for BareBlock {}

impl BareTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the direct children
    pub fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn get(&self, path: &[&str]) -> Option<&BareNode> {
        let (first, rest) = path.split_first()?;
        let node = self.entries.get(*first)?;
        match (node, rest.is_empty()) {
            (_, true) => Some(node),
            (BareNode::Tree(tree), false) => tree.get(rest),
            (BareNode::File(_), false) => None,
        }
    }

    /// Create every tree along `path`, replacing files in the way
    pub fn mkdir(&mut self, path: &[&str]) -> &mut BareTree {
        let Some((first, rest)) = path.split_first() else {
            return self;
        };
        let entry = self
            .entries
            .entry(first.to_string())
            .or_insert_with(|| BareNode::Tree(BareTree::new()));
        if let BareNode::File(_) = entry {
            *entry = BareNode::Tree(BareTree::new());
        }
        match entry {
            BareNode::Tree(tree) => tree.mkdir(rest),
            BareNode::File(_) => unreachable!("replaced above"),
        }
    }

    pub fn add_file(&mut self, path: &[&str], link: Link) {
        if let Some((name, parents)) = path.split_last() {
            self.mkdir(parents)
                .entries
                .insert(name.to_string(), BareNode::File(link));
        }
    }

    pub fn persist<'a>(
        &'a self,
        blobs: &'a BlobsStore,
    ) -> BoxFuture<'a, Result<Link, BlobsStoreError>> {
        async move {
            let mut links = BTreeMap::new();
            for (name, node) in &self.entries {
                let link = match node {
                    BareNode::File(link) => BareLink {
                        link: *link,
                        is_file: true,
                    },
                    BareNode::Tree(tree) => BareLink {
                        link: tree.persist(blobs).await?,
                        is_file: false,
                    },
                };
                links.insert(name.clone(), link);
            }
            Ok(blobs.put_cbor(&BareBlock { links }).await?.link)
        }
        .boxed()
    }

    pub fn load(link: Link, blobs: BlobsStore) -> BoxFuture<'static, Result<Self, BlobsStoreError>> {
        async move {
            let block: BareBlock = blobs.get_cbor(&link).await?;
            let loads = block.links.into_iter().map(|(name, entry)| {
                let blobs = blobs.clone();
                async move {
                    let node = if entry.is_file {
                        BareNode::File(entry.link)
                    } else {
                        BareNode::Tree(BareTree::load(entry.link, blobs).await?)
                    };
                    Ok::<_, BlobsStoreError>((name, node))
                }
            });
            let entries = try_join_all(loads).await?.into_iter().collect();
            Ok(BareTree { entries })
        }
        .boxed()
    }
}
