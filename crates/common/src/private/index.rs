use std::collections::BTreeMap;

use futures::future::{try_join_all, BoxFuture};
use futures::FutureExt;
use serde::{Deserialize, Serialize};

use crate::linked_data::{BlockEncoded, CodecError, DagCborCodec, Link};
use crate::store::{BlobsStore, BlobsStoreError};

use super::namefilter::PrivateName;

/// Leaves a trie node holds before splitting on the next hex digit
pub const NODE_CAPACITY: usize = 16;
/// Private names are 64 hex digits
const MAX_DEPTH: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum PrivateIndexError {
    #[error("private index error: {0}")]
    Default(#[from] anyhow::Error),
    #[error("blobs store error: {0}")]
    Blobs(#[from] BlobsStoreError),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Maps private names to the content address of the revision they name.
///
/// The index is mechanism only: `merge` takes the conflict policy from the
/// caller. A node splits into hex-digit children once it holds more than
/// [`NODE_CAPACITY`] entries and collapses back when it drops to that many,
/// so a given set of entries always has the same shape and persists to the
/// same root link.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrivateIndex {
    root: TrieNode,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct TrieNode {
    leaves: BTreeMap<PrivateName, Link>,
    children: BTreeMap<char, TrieNode>,
}

/// Stored form of a trie node
#[derive(Debug, Serialize, Deserialize)]
struct TrieBlock {
    leaves: BTreeMap<String, Link>,
    children: BTreeMap<String, Link>,
}

impl BlockEncoded<DagCborCodec> for TrieBlock {}

fn digit(name: &PrivateName, depth: usize) -> char {
    name.as_str().chars().nth(depth).unwrap_or('0')
}

impl TrieNode {
    fn is_branch(&self) -> bool {
        !self.children.is_empty()
    }

    fn len(&self) -> usize {
        self.leaves.len() + self.children.values().map(TrieNode::len).sum::<usize>()
    }

    fn get(&self, name: &PrivateName, depth: usize) -> Option<Link> {
        if self.is_branch() {
            self.children.get(&digit(name, depth))?.get(name, depth + 1)
        } else {
            self.leaves.get(name).copied()
        }
    }

    fn insert(&mut self, name: PrivateName, link: Link, depth: usize) -> Option<Link> {
        let previous = if self.is_branch() {
            self.children
                .entry(digit(&name, depth))
                .or_default()
                .insert(name, link, depth + 1)
        } else {
            self.leaves.insert(name, link)
        };
        self.normalize(depth);
        previous
    }

    fn remove(&mut self, name: &PrivateName, depth: usize) -> Option<Link> {
        let removed = if self.is_branch() {
            let d = digit(name, depth);
            let child = self.children.get_mut(&d)?;
            let removed = child.remove(name, depth + 1);
            if child.len() == 0 {
                self.children.remove(&d);
            }
            removed
        } else {
            self.leaves.remove(name)
        };
        self.normalize(depth);
        removed
    }

    fn drain_into(&mut self, out: &mut BTreeMap<PrivateName, Link>) {
        out.append(&mut self.leaves);
        for (_, mut child) in std::mem::take(&mut self.children) {
            child.drain_into(out);
        }
    }

    fn normalize(&mut self, depth: usize) {
        if self.is_branch() {
            if self.len() <= NODE_CAPACITY {
                let mut all = BTreeMap::new();
                self.drain_into(&mut all);
                self.leaves = all;
            }
        } else if self.leaves.len() > NODE_CAPACITY && depth < MAX_DEPTH {
            for (name, link) in std::mem::take(&mut self.leaves) {
                self.children
                    .entry(digit(&name, depth))
                    .or_default()
                    .leaves
                    .insert(name, link);
            }
            for child in self.children.values_mut() {
                child.normalize(depth + 1);
            }
        }
    }

    fn for_each<'a>(&'a self, f: &mut impl FnMut(&'a PrivateName, &'a Link)) {
        for (name, link) in &self.leaves {
            f(name, link);
        }
        for child in self.children.values() {
            child.for_each(f);
        }
    }

    /// Encode this subtree, leaves first, pushing every block onto `blocks`
    fn encode(&self, blocks: &mut Vec<Vec<u8>>) -> Result<Link, CodecError> {
        let mut children = BTreeMap::new();
        for (d, child) in &self.children {
            children.insert(d.to_string(), child.encode(blocks)?);
        }
        let block = TrieBlock {
            leaves: self
                .leaves
                .iter()
                .map(|(name, link)| (name.to_string(), *link))
                .collect(),
            children,
        };
        let bytes = block.encode()?;
        let link = Link::for_cbor(&bytes);
        blocks.push(bytes);
        Ok(link)
    }

    fn load(link: Link, blobs: BlobsStore) -> BoxFuture<'static, Result<Self, PrivateIndexError>> {
        async move {
            let block: TrieBlock = blobs.get_cbor(&link).await?;
            let mut leaves = BTreeMap::new();
            for (name, link) in block.leaves {
                let name = PrivateName::parse(&name)
                    .ok_or_else(|| anyhow::anyhow!("invalid private name in index: {}", name))?;
                leaves.insert(name, link);
            }

            let loads = block.children.iter().map(|(d, child)| {
                let blobs = blobs.clone();
                let child = *child;
                async move {
                    let d = d
                        .chars()
                        .next()
                        .ok_or_else(|| anyhow::anyhow!("empty trie branch key"))?;
                    Ok::<_, PrivateIndexError>((d, TrieNode::load(child, blobs).await?))
                }
            });
            let children = try_join_all(loads).await?.into_iter().collect();

            Ok(TrieNode { leaves, children })
        }
        .boxed()
    }
}

impl PrivateIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.root.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Map `name` to `link`, returning what it mapped to before
    pub fn add(&mut self, name: PrivateName, link: Link) -> Option<Link> {
        self.root.insert(name, link, 0)
    }

    /// `None` means the node does not exist yet
    pub fn get(&self, name: &PrivateName) -> Option<Link> {
        self.root.get(name, 0)
    }

    pub fn remove(&mut self, name: &PrivateName) -> Option<Link> {
        self.root.remove(name, 0)
    }

    pub fn entries(&self) -> Vec<(PrivateName, Link)> {
        let mut out = Vec::with_capacity(self.len());
        self.root
            .for_each(&mut |name, link| out.push((name.clone(), *link)));
        out
    }

    /// Union `other` into this index.
    ///
    /// Keys present on one side only are copied; `resolve(name, ours, theirs)`
    /// picks the survivor where both sides hold different links.
    pub fn merge<F>(&mut self, other: &PrivateIndex, mut resolve: F)
    where
        F: FnMut(&PrivateName, Link, Link) -> Link,
    {
        for (name, theirs) in other.entries() {
            match self.get(&name) {
                None => {
                    self.add(name, theirs);
                }
                Some(ours) if ours == theirs => {}
                Some(ours) => {
                    let winner = resolve(&name, ours, theirs);
                    self.add(name, winner);
                }
            }
        }
    }

    pub async fn persist(&self, blobs: &BlobsStore) -> Result<Link, PrivateIndexError> {
        let mut blocks = Vec::new();
        let root = self.root.encode(&mut blocks)?;
        tracing::debug!("persisting private index: {} blocks, root {}", blocks.len(), root);
        try_join_all(blocks.into_iter().map(|block| blobs.put_cbor_bytes(block))).await?;
        Ok(root)
    }

    pub async fn load(link: &Link, blobs: &BlobsStore) -> Result<Self, PrivateIndexError> {
        let root = TrieNode::load(*link, blobs.clone()).await?;
        Ok(Self { root })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::Secret;
    use crate::private::namefilter::BareNameFilter;

    fn name(i: u32) -> PrivateName {
        BareNameFilter::empty().saturate(&i.to_be_bytes())
    }

    fn link(i: u32) -> Link {
        Link::for_raw(&i.to_be_bytes())
    }

    #[test]
    fn test_add_get_idempotent() {
        let mut index = PrivateIndex::new();
        assert_eq!(index.get(&name(1)), None);
        assert_eq!(index.add(name(1), link(1)), None);
        assert_eq!(index.add(name(1), link(1)), Some(link(1)));
        assert_eq!(index.get(&name(1)), Some(link(1)));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn test_split_and_collapse() {
        let mut index = PrivateIndex::new();
        for i in 0..200 {
            index.add(name(i), link(i));
        }
        assert_eq!(index.len(), 200);
        assert!(index.root.is_branch());
        for i in 0..200 {
            assert_eq!(index.get(&name(i)), Some(link(i)));
        }

        for i in 0..195 {
            assert_eq!(index.remove(&name(i)), Some(link(i)));
        }
        assert_eq!(index.remove(&name(0)), None);
        assert_eq!(index.len(), 5);
        assert!(!index.root.is_branch());
    }

    #[test]
    fn test_shape_is_order_independent() {
        let mut a = PrivateIndex::new();
        let mut b = PrivateIndex::new();
        for i in 0..64 {
            a.add(name(i), link(i));
            b.add(name(63 - i), link(63 - i));
        }
        assert_eq!(a, b);
    }

    #[test]
    fn test_merge_with_policy() {
        let shared = name(7);
        let mut ours = PrivateIndex::new();
        ours.add(name(1), link(1));
        ours.add(shared.clone(), link(70));

        let mut theirs = PrivateIndex::new();
        theirs.add(name(2), link(2));
        theirs.add(shared.clone(), link(71));

        let mut conflicts = Vec::new();
        ours.merge(&theirs, |n, mine, other| {
            conflicts.push(n.clone());
            std::cmp::max(mine, other)
        });

        assert_eq!(conflicts, vec![shared.clone()]);
        assert_eq!(ours.len(), 3);
        assert_eq!(ours.get(&name(2)), Some(link(2)));
        assert_eq!(ours.get(&shared), Some(std::cmp::max(link(70), link(71))));
    }

    #[tokio::test]
    async fn test_persist_and_load() {
        let blobs = BlobsStore::memory().await.unwrap();
        let mut index = PrivateIndex::new();
        for i in 0..50 {
            index.add(name(i), link(i));
        }
        let key = Secret::generate();
        let root_name = BareNameFilter::from_key(&key).saturate(b"0");
        index.add(root_name.clone(), link(999));

        let root = index.persist(&blobs).await.unwrap();
        let loaded = PrivateIndex::load(&root, &blobs).await.unwrap();
        assert_eq!(loaded, index);
        assert_eq!(loaded.get(&root_name), Some(link(999)));

        // same entries, same root
        assert_eq!(loaded.persist(&blobs).await.unwrap(), root);
    }
}
